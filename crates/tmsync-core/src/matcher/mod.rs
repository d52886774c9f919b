//! Classification of local cases as existing or missing remotely.
//!
//! The strategy is chosen once per upload:
//! - [`MatcherKind::Auto`] looks cases up by their automation ID.
//! - [`MatcherKind::Name`] and [`MatcherKind::Property`] expect the case ID
//!   to be known from parsing and validate that it exists.

mod automation;
mod case_id;

pub use automation::{normalize_automation_id, AutomationIdMatcher};
pub use case_id::CaseIdMatcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::api::ApiError;
use crate::cache::EntityError;
use crate::config::{WorkerConfig, NONEXISTENT_IDS_DISPLAY_LIMIT};
use crate::handlers::CaseHandler;
use crate::model::Suite;

/// How local cases are matched to remote ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    /// By automation ID.
    #[default]
    Auto,
    /// By a case ID embedded in the test name, e.g. `[C123] Login`.
    Name,
    /// By a case ID carried in a test property.
    Property,
}

impl FromStr for MatcherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(MatcherKind::Auto),
            "name" => Ok(MatcherKind::Name),
            "property" => Ok(MatcherKind::Property),
            other => Err(format!("unknown case matcher '{other}' (expected auto, name or property)")),
        }
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatcherKind::Auto => "auto",
            MatcherKind::Name => "name",
            MatcherKind::Property => "property",
        })
    }
}

/// Errors from classifying cases.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Error while fetching cases: {0}")]
    Fetch(#[from] EntityError),

    #[error("Error while validating case IDs: {0}")]
    Api(#[from] ApiError),

    #[error(
        "Case IDs not in the project or suite were detected in the report file. \
         Nonexistent case IDs found in the report file: {}",
        display_ids(ids)
    )]
    NonexistentIds { ids: Vec<i64> },

    #[error("Automation ID matching needs the automation ID field of the project")]
    MissingAutomationField,
}

/// Render IDs as a list, truncated for display.
pub fn display_ids(ids: &[i64]) -> String {
    let shown: Vec<String> = ids
        .iter()
        .take(NONEXISTENT_IDS_DISPLAY_LIMIT)
        .map(i64::to_string)
        .collect();
    let more = if ids.len() > NONEXISTENT_IDS_DISPLAY_LIMIT { " ..." } else { "" };
    format!("[{}]{more}", shown.join(", "))
}

/// Ordinals (see [`Suite::cases`]) of existing and missing cases.
///
/// Every case appears in exactly one of the two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub existing: Vec<usize>,
    pub missing: Vec<usize>,
}

impl Classification {
    pub fn has_missing(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Strategy classifying every case of a suite.
#[async_trait]
pub trait CaseMatcher: Send + Sync {
    /// Classify the cases of `suite`, filling in the case and section IDs of
    /// the ones that exist remotely.
    async fn classify(
        &self,
        project_id: i64,
        suite_id: i64,
        suite: &mut Suite,
    ) -> Result<Classification, MatchError>;
}

/// Build the matcher for `kind`.
///
/// The automation ID strategy needs the project's automation ID field.
pub fn matcher_for(
    kind: MatcherKind,
    cases: Arc<dyn CaseHandler>,
    automation_field: Option<String>,
    workers: &WorkerConfig,
) -> Result<Box<dyn CaseMatcher>, MatchError> {
    match kind {
        MatcherKind::Auto => {
            let field = automation_field.ok_or(MatchError::MissingAutomationField)?;
            Ok(Box::new(AutomationIdMatcher::new(cases, field)))
        }
        MatcherKind::Name | MatcherKind::Property => Ok(Box::new(CaseIdMatcher::new(
            cases,
            workers.bulk_validation_threshold,
            workers.case_workers,
        ))),
    }
}
