//! Typed operations on remote entities.
//!
//! Each entity kind has its own trait so the upload pipeline can be driven
//! against any implementation; [`Handlers::remote`] wires the ones backed by
//! a [`Transport`].

mod case;
mod project;
mod result;
mod run;
mod section;
mod suite;
mod verify;

pub use case::RemoteCases;
pub use project::RemoteProjects;
pub use result::{RemoteAttachments, RemoteResults};
pub use run::RemoteRuns;
pub use section::{NewSection, RemoteSections};
pub use suite::RemoteSuites;
pub use verify::ResponseVerifier;

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::api::{
    ApiError, RemoteCase, RemotePlan, RemoteResult, RemoteRun, RemoteSection, RemoteSuite,
    RemoteTest, Transport,
};
use crate::cache::EntityError;
use crate::model::{ProjectData, RunSpec};

/// Resolving a named or numbered entity failed.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("{entity} not found: {name}")]
    NotFound { entity: &'static str, name: String },

    #[error("More than one {entity} matches '{name}'")]
    Ambiguous { entity: &'static str, name: String },

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Validation(String),
}

impl From<EntityError> for LookupError {
    fn from(err: EntityError) -> Self {
        LookupError::Transport(err.message)
    }
}

impl From<ApiError> for LookupError {
    fn from(err: ApiError) -> Self {
        LookupError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait ProjectHandler: Send + Sync {
    async fn project_by_id(&self, project_id: i64) -> Result<ProjectData, LookupError>;

    async fn project_by_name(&self, name: &str) -> Result<ProjectData, LookupError>;

    /// System name of the case field holding automation IDs in `project_id`.
    async fn automation_id_field(&self, project_id: i64) -> Result<String, LookupError>;
}

#[async_trait]
pub trait SuiteHandler: Send + Sync {
    async fn suites(&self, project_id: i64) -> Result<Arc<Vec<RemoteSuite>>, EntityError>;

    async fn add_suite(
        &self,
        project_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<i64, ApiError>;

    async fn delete_suite(&self, suite_id: i64) -> Result<(), ApiError>;
}

#[async_trait]
pub trait SectionHandler: Send + Sync {
    async fn sections(
        &self,
        project_id: i64,
        suite_id: i64,
    ) -> Result<Arc<Vec<RemoteSection>>, EntityError>;

    async fn add_section(&self, project_id: i64, section: &NewSection) -> Result<i64, ApiError>;

    async fn delete_section(&self, section_id: i64) -> Result<(), ApiError>;

    /// Forget cached sections after the remote tree changed.
    async fn invalidate(&self);
}

#[async_trait]
pub trait CaseHandler: Send + Sync {
    async fn cases(&self, project_id: i64, suite_id: i64)
        -> Result<Arc<Vec<RemoteCase>>, EntityError>;

    /// A single case, `None` when the service does not know the ID.
    async fn get_case(&self, case_id: i64) -> Result<Option<RemoteCase>, ApiError>;

    async fn add_case(&self, section_id: i64, body: &Value) -> Result<i64, ApiError>;

    async fn update_case(&self, case_id: i64, body: &Value) -> Result<(), ApiError>;

    async fn delete_cases(&self, suite_id: i64, case_ids: &[i64]) -> Result<(), ApiError>;

    async fn invalidate(&self);
}

#[async_trait]
pub trait RunHandler: Send + Sync {
    async fn get_run(&self, run_id: i64) -> Result<RemoteRun, ApiError>;

    async fn add_run(&self, project_id: i64, run: &RunSpec) -> Result<i64, ApiError>;

    async fn update_run(&self, run_id: i64, run: &RunSpec) -> Result<(), ApiError>;

    async fn close_run(&self, run_id: i64) -> Result<(), ApiError>;

    async fn delete_run(&self, run_id: i64) -> Result<(), ApiError>;

    /// Tests of a run, one per case included in it.
    async fn tests(&self, run_id: i64) -> Result<Arc<Vec<RemoteTest>>, EntityError>;

    async fn get_plan(&self, plan_id: i64) -> Result<RemotePlan, ApiError>;

    /// Add a run to a plan as a new entry, returning the run's ID.
    async fn add_plan_entry(
        &self,
        plan_id: i64,
        run: &RunSpec,
        config_ids: &[i64],
    ) -> Result<i64, ApiError>;

    async fn update_plan_entry(
        &self,
        plan_id: i64,
        entry_id: &str,
        run: &RunSpec,
    ) -> Result<(), ApiError>;

    async fn update_run_in_plan_entry(&self, run_id: i64, run: &RunSpec) -> Result<(), ApiError>;
}

#[async_trait]
pub trait ResultHandler: Send + Sync {
    /// Submit result bodies for cases of a run.
    async fn add_results_for_cases(
        &self,
        run_id: i64,
        results: &[Value],
    ) -> Result<Vec<RemoteResult>, ApiError>;
}

#[async_trait]
pub trait AttachmentHandler: Send + Sync {
    async fn add_attachment_to_result(&self, result_id: i64, path: &Path) -> Result<(), ApiError>;
}

/// One handler per entity kind.
#[derive(Clone)]
pub struct Handlers {
    pub projects: Arc<dyn ProjectHandler>,
    pub suites: Arc<dyn SuiteHandler>,
    pub sections: Arc<dyn SectionHandler>,
    pub cases: Arc<dyn CaseHandler>,
    pub runs: Arc<dyn RunHandler>,
    pub results: Arc<dyn ResultHandler>,
    pub attachments: Arc<dyn AttachmentHandler>,
}

impl Handlers {
    /// Handlers talking to the service through `transport`.
    ///
    /// With `verify`, created suites, sections and cases are compared with
    /// what the service echoes back.
    pub fn remote(transport: Arc<dyn Transport>, verify: bool) -> Self {
        let verifier = ResponseVerifier::new(verify);
        Self {
            projects: Arc::new(RemoteProjects::new(Arc::clone(&transport))),
            suites: Arc::new(RemoteSuites::new(Arc::clone(&transport), verifier)),
            sections: Arc::new(RemoteSections::new(Arc::clone(&transport), verifier)),
            cases: Arc::new(RemoteCases::new(Arc::clone(&transport), verifier)),
            runs: Arc::new(RemoteRuns::new(Arc::clone(&transport))),
            results: Arc::new(RemoteResults::new(Arc::clone(&transport))),
            attachments: Arc::new(RemoteAttachments::new(transport)),
        }
    }
}
