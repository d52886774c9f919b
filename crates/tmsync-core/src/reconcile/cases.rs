use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::{ReconcileError, Reconciler};
use crate::model::Suite;
use crate::rollback::RunState;
use crate::submit::{Phase, UnitFailure};

impl Reconciler<'_> {
    /// Create the cases at `missing` (ordinals of [`Suite::cases`]).
    ///
    /// Every created ID is recorded in `state`, including the ones created
    /// after another unit already failed, before an interrupt, or by a call
    /// that failed verification, so a rollback can remove them.
    pub async fn add_missing_cases(
        &self,
        project_name: &str,
        suite: &mut Suite,
        missing: &[usize],
        automation_field: Option<&str>,
        state: &mut RunState,
    ) -> Result<(), ReconcileError> {
        if missing.is_empty() {
            return Ok(());
        }
        self.confirm(
            &format!("Found test cases not matching any test case in project '{project_name}'. Would you like to add them?"),
            "test cases",
        )?;

        let mut units = Vec::with_capacity(missing.len());
        {
            let cases = suite.cases();
            for &ordinal in missing {
                let Some(case) = cases.get(ordinal) else { continue };
                let section_id = case
                    .section_id
                    .ok_or_else(|| ReconcileError::Unplaced(case.title.clone()))?;
                units.push((ordinal, section_id, case.to_body(automation_field)));
            }
        }

        info!("Adding {} missing test cases.", units.len());
        let progress = self.progress.start("Adding cases", units.len() as u64);
        let handler = Arc::clone(&self.handlers.cases);
        let outcome = self
            .engine
            .run(
                Phase::AddCase,
                units,
                self.case_workers,
                |_| 1,
                |(ordinal, section_id, body): (usize, i64, Value)| {
                    let handler = Arc::clone(&handler);
                    async move {
                        handler
                            .add_case(section_id, &body)
                            .await
                            .map(|id| (ordinal, id))
                            .map_err(|e| {
                                let partial = e.created_id().map(|id| (ordinal, id));
                                UnitFailure::new(e.to_string()).with_partial(partial)
                            })
                    }
                },
                progress.as_ref(),
            )
            .await;

        let error = outcome.error.clone();
        let interrupted = outcome.interruption(Phase::AddCase);
        let created = outcome.all_successes();
        let mut cases = suite.cases_mut();
        for (ordinal, id) in created {
            state.created_case_ids.push(id);
            if let Some(case) = cases.get_mut(ordinal) {
                case.case_id = Some(id);
            }
        }
        handler.invalidate().await;
        interrupted?;

        match error {
            Some(message) => Err(ReconcileError::Batch {
                phase: Phase::AddCase,
                message,
            }),
            None => Ok(()),
        }
    }

    /// Overwrite the remote cases at `existing` with the local data.
    pub async fn update_existing_cases(
        &self,
        suite: &Suite,
        existing: &[usize],
        automation_field: Option<&str>,
        state: &mut RunState,
    ) -> Result<(), ReconcileError> {
        let cases = suite.cases();
        let units: Vec<(i64, Value)> = existing
            .iter()
            .filter_map(|&ordinal| cases.get(ordinal))
            .filter_map(|case| case.case_id.map(|id| (id, case.to_body(automation_field))))
            .collect();
        if units.is_empty() {
            return Ok(());
        }

        info!("Updating {} existing test cases.", units.len());
        let progress = self.progress.start("Updating cases", units.len() as u64);
        let handler = Arc::clone(&self.handlers.cases);
        let outcome = self
            .engine
            .run(
                Phase::UpdateCase,
                units,
                self.case_workers,
                |_| 1,
                |(case_id, body): (i64, Value)| {
                    let handler = Arc::clone(&handler);
                    async move {
                        handler
                            .update_case(case_id, &body)
                            .await
                            .map(|()| case_id)
                            .map_err(|e| UnitFailure::new(e.to_string()))
                    }
                },
                progress.as_ref(),
            )
            .await;

        let error = outcome.error.clone();
        let interrupted = outcome.interruption(Phase::UpdateCase);
        state.updated_case_ids.extend(outcome.all_successes());
        handler.invalidate().await;
        interrupted?;

        match error {
            Some(message) => Err(ReconcileError::Batch {
                phase: Phase::UpdateCase,
                message,
            }),
            None => Ok(()),
        }
    }
}
