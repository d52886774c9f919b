//! Reconciles parsed test reports with a remote test-management service.
//!
//! A report is parsed into [`Suite`]s, matched against the remote cases,
//! missing suites, sections and cases are created, and results are
//! submitted to a run. Anything created is reverted when a later step fails.

pub mod api;
pub mod cache;
pub mod config;
pub mod handlers;
pub mod matcher;
pub mod model;
pub mod parsers;
pub mod prompt;
pub mod reconcile;
pub mod rollback;
pub mod submit;
pub mod uploader;

pub use api::{ApiError, ApiResponse, HttpTransport, Transport};
pub use config::{Config, ConfigError};
pub use handlers::{Handlers, LookupError};
pub use matcher::MatcherKind;
pub use model::{Case, CaseResult, Section, Status, Suite};
pub use parsers::{ParseOptions, ParserRegistry, ReportFormat};
pub use prompt::{AutoResponse, Prompt};
pub use rollback::{Rollback, RunState};
pub use submit::{Progress, ProgressReporter, SubmissionEngine, UnitFailure};
pub use uploader::{ResultsUploader, UploadError, UploadReport};
