//! Compensating deletion of what an upload created.

use tracing::{error, info};

use crate::handlers::Handlers;
use crate::model::SuiteMode;

/// Everything created or adopted during one upload.
///
/// Written only by the coordinating task, after each awaited step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    /// The suite the upload targets.
    pub suite_id: Option<i64>,
    /// Set when the suite was created by this upload.
    pub created_suite_id: Option<i64>,
    /// Sections created by this upload, oldest first.
    pub created_section_ids: Vec<i64>,
    pub created_case_ids: Vec<i64>,
    pub updated_case_ids: Vec<i64>,
    pub run: Option<RunRef>,
}

/// The run results go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRef {
    pub id: i64,
    /// Whether this upload created the run; adopted runs are never deleted.
    pub created: bool,
}

impl RunState {
    pub fn record_suite(&mut self, suite_id: i64, created: bool) {
        self.suite_id = Some(suite_id);
        if created {
            self.created_suite_id = Some(suite_id);
        }
    }

    pub fn record_run(&mut self, id: i64, created: bool) {
        self.run = Some(RunRef { id, created });
    }

    pub fn run_id(&self) -> Option<i64> {
        self.run.map(|run| run.id)
    }

    pub fn created_anything(&self) -> bool {
        self.created_suite_id.is_some()
            || !self.created_section_ids.is_empty()
            || !self.created_case_ids.is_empty()
            || self.run.is_some_and(|run| run.created)
    }
}

/// Deletes created entities in dependency order: run, cases, sections, suite.
pub struct Rollback<'a> {
    handlers: &'a Handlers,
    suite_mode: SuiteMode,
}

impl<'a> Rollback<'a> {
    pub fn new(handlers: &'a Handlers, suite_mode: SuiteMode) -> Self {
        Self {
            handlers,
            suite_mode,
        }
    }

    /// Revert `state`, returning one line per entity type that had something to revert.
    ///
    /// Every step is attempted regardless of earlier failures.
    pub async fn rollback(&self, state: &RunState) -> Vec<String> {
        let mut log = Vec::new();

        if let Some(run) = state.run.filter(|run| run.created) {
            log.push(match self.handlers.runs.delete_run(run.id).await {
                Ok(()) => "Deleted created run".to_string(),
                Err(e) => format!("Error deleting created run (ID {}): {e}", run.id),
            });
        }

        if !state.created_case_ids.is_empty() {
            let result = match state.suite_id {
                Some(suite_id) => self
                    .handlers
                    .cases
                    .delete_cases(suite_id, &state.created_case_ids)
                    .await
                    .map_err(|e| e.to_string()),
                None => Err("suite is unknown".to_string()),
            };
            log.push(match result {
                Ok(()) => "Deleted created test cases".to_string(),
                Err(e) => format!("Error deleting created test cases: {e}"),
            });
        }

        if !state.created_section_ids.is_empty() {
            let mut failures = Vec::new();
            for section_id in state.created_section_ids.iter().rev() {
                if let Err(e) = self.handlers.sections.delete_section(*section_id).await {
                    failures.push(format!("{section_id}: {e}"));
                }
            }
            log.push(if failures.is_empty() {
                "Deleted created sections".to_string()
            } else {
                format!("Error deleting created sections: {}", failures.join("; "))
            });
        }

        if let Some(suite_id) = state.created_suite_id {
            if self.suite_mode != SuiteMode::SingleSuite {
                log.push(match self.handlers.suites.delete_suite(suite_id).await {
                    Ok(()) => "Deleted created suite".to_string(),
                    Err(e) => format!("Error deleting created suite (ID {suite_id}): {e}"),
                });
            }
        }

        for line in &log {
            if line.starts_with("Error") {
                error!("{line}");
            } else {
                info!("{line}");
            }
        }
        log
    }
}
