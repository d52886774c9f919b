//! Creation of missing suites, sections and cases.
//!
//! Every creation not pre-authorized is confirmed through the injected
//! [`Prompt`]; a refusal fails the upload. Created IDs are appended to the
//! [`RunState`](crate::rollback::RunState) by the coordinating task only.

mod cases;
mod sections;
mod suite;

pub use sections::{apply_section_plan, plan_sections, MissingSection, ParentRef, SectionPlan};
pub use suite::SuiteResolution;

use thiserror::Error;

use crate::api::ApiError;
use crate::cache::EntityError;
use crate::handlers::{Handlers, LookupError};
use crate::prompt::Prompt;
use crate::submit::{Phase, ProgressReporter, SubmissionEngine, SubmitError};

/// Errors from reconciling the remote tree with the report.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Can not resolve suite: {0}")]
    Lookup(#[from] LookupError),

    #[error("Error while fetching {}: {}", .0.kind, .0.message)]
    Fetch(#[from] EntityError),

    #[error("Error adding {entity}: {source}")]
    Create {
        entity: &'static str,
        source: ApiError,
    },

    #[error("User did not agree to create {0}.")]
    Declined(&'static str),

    #[error("Error while {phase}: {message}")]
    Batch { phase: Phase, message: String },

    #[error("Case '{0}' has no section to be created in")]
    Unplaced(String),

    #[error(transparent)]
    Interrupted(#[from] SubmitError),
}

/// Creates what is missing remotely, in dependency order.
pub struct Reconciler<'a> {
    handlers: &'a Handlers,
    prompt: &'a dyn Prompt,
    engine: &'a SubmissionEngine,
    progress: &'a dyn ProgressReporter,
    case_workers: usize,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        handlers: &'a Handlers,
        prompt: &'a dyn Prompt,
        engine: &'a SubmissionEngine,
        progress: &'a dyn ProgressReporter,
        case_workers: usize,
    ) -> Self {
        Self {
            handlers,
            prompt,
            engine,
            progress,
            case_workers: case_workers.max(1),
        }
    }

    fn confirm(&self, question: &str, what: &'static str) -> Result<(), ReconcileError> {
        if self.prompt.confirm(question) {
            Ok(())
        } else {
            Err(ReconcileError::Declined(what))
        }
    }
}
