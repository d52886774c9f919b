use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{error, info};

use super::{display_ids, CaseMatcher, Classification, MatchError};
use crate::api::RemoteCase;
use crate::handlers::CaseHandler;
use crate::model::Suite;

/// Validates case IDs that were parsed from names or properties.
///
/// Cases without an ID are missing. The IDs that are present must all exist
/// in the target suite, otherwise classification fails listing the unknown ones.
pub struct CaseIdMatcher {
    cases: Arc<dyn CaseHandler>,
    bulk_threshold: usize,
    concurrency: usize,
}

impl CaseIdMatcher {
    pub fn new(cases: Arc<dyn CaseHandler>, bulk_threshold: usize, concurrency: usize) -> Self {
        Self {
            cases,
            bulk_threshold,
            concurrency: concurrency.max(1),
        }
    }

    /// Remote records for `ids` by listing the whole suite.
    async fn bulk_lookup(
        &self,
        project_id: i64,
        suite_id: i64,
        ids: &BTreeSet<i64>,
    ) -> Result<HashMap<i64, RemoteCase>, MatchError> {
        let remote = self.cases.cases(project_id, suite_id).await?;
        Ok(remote
            .iter()
            .filter(|case| ids.contains(&case.id))
            .map(|case| (case.id, case.clone()))
            .collect())
    }

    /// Remote records for `ids` by asking for each one.
    async fn targeted_lookup(
        &self,
        suite_id: i64,
        ids: &BTreeSet<i64>,
    ) -> Result<HashMap<i64, RemoteCase>, MatchError> {
        let lookups: Vec<_> = stream::iter(ids.iter().copied())
            .map(|id| {
                let cases = Arc::clone(&self.cases);
                async move { (id, cases.get_case(id).await) }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut found = HashMap::new();
        for (id, lookup) in lookups {
            match lookup? {
                // A case from another suite does not count as existing here.
                Some(case) if case.suite_id.map_or(true, |s| s == suite_id) => {
                    found.insert(id, case);
                }
                _ => {}
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl CaseMatcher for CaseIdMatcher {
    async fn classify(
        &self,
        project_id: i64,
        suite_id: i64,
        suite: &mut Suite,
    ) -> Result<Classification, MatchError> {
        let cases = suite.cases_mut();
        let total = cases.len();

        let mut classification = Classification::default();
        let mut candidates = BTreeSet::new();
        for (ordinal, case) in cases.iter().enumerate() {
            match case.case_id {
                Some(id) => {
                    candidates.insert(id);
                    classification.existing.push(ordinal);
                }
                None => classification.missing.push(ordinal),
            }
        }

        if classification.has_missing() {
            info!(
                "Found {} test cases without case ID in the report file.",
                classification.missing.len()
            );
        }
        if candidates.is_empty() {
            return Ok(classification);
        }

        let found = if total >= self.bulk_threshold {
            info!("Large report detected ({total} cases). Fetching all cases for validation...");
            self.bulk_lookup(project_id, suite_id, &candidates).await?
        } else {
            info!("Validating {} case IDs...", candidates.len());
            self.targeted_lookup(suite_id, &candidates).await?
        };

        let nonexistent: Vec<i64> = candidates
            .iter()
            .copied()
            .filter(|id| !found.contains_key(id))
            .collect();
        if !nonexistent.is_empty() {
            error!("Nonexistent case IDs found in the report file: {}", display_ids(&nonexistent));
            return Err(MatchError::NonexistentIds { ids: nonexistent });
        }

        for case in cases {
            if let Some(remote) = case.case_id.and_then(|id| found.get(&id)) {
                case.section_id = remote.section_id;
            }
        }
        Ok(classification)
    }
}
