use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::{CaseMatcher, Classification, MatchError};
use crate::api::RemoteCase;
use crate::handlers::CaseHandler;
use crate::model::Suite;

/// Matches cases by the automation ID stored in a custom case field.
pub struct AutomationIdMatcher {
    cases: Arc<dyn CaseHandler>,
    field: String,
}

impl AutomationIdMatcher {
    /// `field` is the system name of the automation ID field, resolved once per upload.
    pub fn new(cases: Arc<dyn CaseHandler>, field: impl Into<String>) -> Self {
        Self {
            cases,
            field: field.into(),
        }
    }
}

#[async_trait]
impl CaseMatcher for AutomationIdMatcher {
    async fn classify(
        &self,
        project_id: i64,
        suite_id: i64,
        suite: &mut Suite,
    ) -> Result<Classification, MatchError> {
        let remote = self.cases.cases(project_id, suite_id).await?;
        let by_automation_id: HashMap<String, &RemoteCase> = remote
            .iter()
            .filter_map(|case| {
                let id = normalize_automation_id(case.field_str(&self.field)?);
                (!id.is_empty()).then_some((id, case))
            })
            .collect();

        let mut classification = Classification::default();
        for (ordinal, case) in suite.cases_mut().into_iter().enumerate() {
            let matched = case
                .automation_id
                .as_deref()
                .and_then(|id| by_automation_id.get(id.trim()));
            match matched {
                Some(remote) => {
                    case.case_id = Some(remote.id);
                    case.section_id = remote.section_id;
                    classification.existing.push(ordinal);
                }
                None if case.case_id.is_some() => classification.existing.push(ordinal),
                None => classification.missing.push(ordinal),
            }
        }

        if classification.has_missing() {
            info!(
                missing = classification.missing.len(),
                "Found {} test cases not matching any remote case.",
                classification.missing.len()
            );
        }
        Ok(classification)
    }
}

/// Canonical form of a remote automation ID.
///
/// Rich-text editors store the value HTML-escaped and wrapped in a paragraph,
/// so entities are unescaped and one leading `<p>` and trailing `</p>` are
/// removed, case-insensitively.
pub fn normalize_automation_id(value: &str) -> String {
    let unescaped = unescape_html(value);
    let mut id = unescaped.trim();
    if id.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("<p>")) {
        id = &id[3..];
    }
    if let Some(cut) = id.len().checked_sub(4) {
        if id.get(cut..).is_some_and(|p| p.eq_ignore_ascii_case("</p>")) {
            id = &id[..cut];
        }
    }
    id.trim().to_string()
}

fn unescape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find(';').filter(|end| *end <= 10) {
            Some(end) => match decode_entity(&tail[1..end]) {
                Some(c) => {
                    out.push(c);
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            },
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}
