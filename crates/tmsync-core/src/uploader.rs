//! The upload pipeline: project and suite resolution, case reconciliation,
//! run handling, result submission and rollback.

use chrono::{NaiveDate, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::api::{ApiError, RemoteResult};
use crate::config::Config;
use crate::handlers::{Handlers, LookupError};
use crate::matcher::{matcher_for, MatchError, MatcherKind};
use crate::model::{ProjectData, RunSpec, Suite};
use crate::prompt::Prompt;
use crate::reconcile::{ReconcileError, Reconciler};
use crate::rollback::{Rollback, RunState};
use crate::submit::{NoProgress, Phase, ProgressReporter, SubmissionEngine, SubmitError, UnitFailure};

/// Date format accepted for run start and end dates.
const RUN_DATE_FORMAT: &str = "%m/%d/%Y";

/// Errors that end an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("{action}: {source}")]
    Run {
        action: &'static str,
        source: ApiError,
    },

    #[error("Error while adding results: {message}")]
    Results {
        message: String,
        /// Results accepted by the service before the failure.
        submitted: usize,
    },

    #[error(transparent)]
    Interrupted(#[from] SubmitError),

    /// A failure after the suite was resolved; what had been created was reverted.
    #[error("{cause}")]
    RolledBack {
        cause: Box<UploadError>,
        log: Vec<String>,
    },
}

impl UploadError {
    /// Lines describing the rollback that followed the failure, if any.
    pub fn rollback_log(&self) -> &[String] {
        match self {
            UploadError::RolledBack { log, .. } => log,
            _ => &[],
        }
    }
}

/// What an upload did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub project_id: i64,
    pub suite_id: i64,
    pub suite_created: bool,
    pub run_id: Option<i64>,
    pub cases_added: usize,
    pub cases_updated: usize,
    pub results_added: usize,
    pub attachments_failed: usize,
}

/// Uploads parsed suites to the remote service.
pub struct ResultsUploader {
    config: Config,
    handlers: Handlers,
    prompt: Arc<dyn Prompt>,
    engine: SubmissionEngine,
    progress: Arc<dyn ProgressReporter>,
}

impl ResultsUploader {
    pub fn new(config: Config, handlers: Handlers, prompt: Arc<dyn Prompt>) -> Self {
        Self {
            config,
            handlers,
            prompt,
            engine: SubmissionEngine::new(),
            progress: Arc::new(NoProgress),
        }
    }

    /// Use `engine` for concurrent phases, e.g. one wired to an interrupt.
    pub fn with_engine(mut self, engine: SubmissionEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(
            &self.handlers,
            self.prompt.as_ref(),
            &self.engine,
            self.progress.as_ref(),
            self.config.workers.case_workers,
        )
    }

    /// Upload `suite` and its results.
    ///
    /// Failures before the suite is resolved return directly, unless the
    /// suite was created anyway. Any later failure reverts what this call
    /// created and returns
    /// [`UploadError::RolledBack`].
    pub async fn upload(&self, suite: &mut Suite) -> Result<UploadReport, UploadError> {
        let started = Instant::now();
        let upload = &self.config.upload;

        let project = self.resolve_project().await?;
        let automation_field = match upload.case_matcher {
            MatcherKind::Auto => Some(self.handlers.projects.automation_id_field(project.id).await?),
            _ => None,
        };

        let suite_name = upload.suite_name.clone().unwrap_or_else(|| suite.name.clone());
        info!("Checking suite '{suite_name}'.");
        let mut state = RunState::default();
        let resolution = match self
            .reconciler()
            .get_suite_id(
                &project,
                &suite_name,
                suite.description.as_deref(),
                upload.suite_id.or(suite.suite_id),
                &mut state,
            )
            .await
        {
            Ok(resolution) => resolution,
            Err(cause) if state.created_anything() => {
                return Err(self.roll_back(&project, &state, cause.into()).await)
            }
            Err(cause) => return Err(cause.into()),
        };
        suite.suite_id = Some(resolution.suite_id);

        let mut report = UploadReport {
            project_id: project.id,
            suite_id: resolution.suite_id,
            suite_created: resolution.created,
            ..Default::default()
        };

        let outcome = self
            .sync(&project, suite, automation_field.as_deref(), &mut state, &mut report)
            .await;

        match outcome {
            Ok(()) => {
                info!("Submitted results in {:.1} secs.", started.elapsed().as_secs_f64());
                Ok(report)
            }
            Err(cause) => Err(self.roll_back(&project, &state, cause).await),
        }
    }

    /// Create or update the configured run without submitting results.
    pub async fn add_run(&self) -> Result<i64, UploadError> {
        let upload = &self.config.upload;
        let project = self.resolve_project().await?;
        let suite_name = upload.suite_name.clone().unwrap_or_default();
        let mut state = RunState::default();

        let result = match self
            .reconciler()
            .get_suite_id(&project, &suite_name, None, upload.suite_id, &mut state)
            .await
        {
            Ok(resolution) => match self.run_spec(resolution.suite_id, &[], &[]) {
                Ok(spec) => self.create_or_update_run(&project, spec, &mut state).await,
                Err(invalid) => Err(invalid),
            },
            Err(cause) if state.created_anything() => Err(cause.into()),
            Err(cause) => return Err(cause.into()),
        };
        match result {
            Ok(run_id) => Ok(run_id),
            Err(cause) => Err(self.roll_back(&project, &state, cause).await),
        }
    }

    /// Revert what `state` records and wrap `cause` with the rollback log.
    async fn roll_back(&self, project: &ProjectData, state: &RunState, cause: UploadError) -> UploadError {
        error!("{cause}");
        let log = Rollback::new(&self.handlers, project.suite_mode)
            .rollback(state)
            .await;
        UploadError::RolledBack {
            cause: Box::new(cause),
            log,
        }
    }

    async fn resolve_project(&self) -> Result<ProjectData, UploadError> {
        let upload = &self.config.upload;
        info!("Checking project.");
        let project = match (upload.project_id, upload.project.as_deref()) {
            (Some(id), _) => self.handlers.projects.project_by_id(id).await?,
            (None, Some(name)) => self.handlers.projects.project_by_name(name).await?,
            (None, None) => {
                return Err(UploadError::Invalid(
                    "a project name or project id is required".to_string(),
                ))
            }
        };
        info!(project_id = project.id, "Project '{}' found.", project.name);
        Ok(project)
    }

    async fn sync(
        &self,
        project: &ProjectData,
        suite: &mut Suite,
        automation_field: Option<&str>,
        state: &mut RunState,
        report: &mut UploadReport,
    ) -> Result<(), UploadError> {
        let upload = &self.config.upload;
        let suite_id = report.suite_id;
        let reconciler = self.reconciler();

        suite.add_global_case_fields(&upload.case_fields);
        suite.add_global_result_fields(&upload.result_fields);

        info!("Checking for missing test cases.");
        let matcher = matcher_for(
            upload.case_matcher,
            Arc::clone(&self.handlers.cases),
            automation_field.map(str::to_string),
            &self.config.workers,
        )?;
        let classification = matcher.classify(project.id, suite_id, suite).await?;

        if classification.has_missing() || upload.update_cases {
            // Existing cases stay where they are unless they are being updated.
            let keep = if upload.update_cases {
                Vec::new()
            } else {
                classification.existing.clone()
            };
            reconciler
                .reconcile_sections(project.id, &project.name, suite_id, suite, upload.section_id, &keep, state)
                .await?;
        }

        if upload.update_cases {
            match reconciler
                .update_existing_cases(suite, &classification.existing, automation_field, state)
                .await
            {
                Ok(()) => {}
                Err(ReconcileError::Batch { message, .. }) => {
                    error!("Error updating test cases: {message}");
                }
                Err(e) => return Err(e.into()),
            }
            report.cases_updated = state.updated_case_ids.len();
        }

        reconciler
            .add_missing_cases(&project.name, suite, &classification.missing, automation_field, state)
            .await?;
        report.cases_added = state.created_case_ids.len();

        if upload.skip_run {
            info!("Skipping run and results upload.");
            return Ok(());
        }

        let cases = suite.cases();
        let case_ids: Vec<i64> = cases.iter().filter_map(|case| case.case_id).collect();
        let properties = suite.property_lines();
        let spec = self.run_spec(suite_id, &case_ids, &properties)?;
        let run_id = self.create_or_update_run(project, spec, state).await?;
        report.run_id = Some(run_id);

        let results = self.add_results(run_id, suite).await?;
        report.results_added = results.len();

        report.attachments_failed = self.upload_attachments(run_id, suite, &results).await;

        if upload.close_run {
            info!("Closing run.");
            self.handlers
                .runs
                .close_run(run_id)
                .await
                .map_err(|source| UploadError::Run {
                    action: "Error closing run",
                    source,
                })?;
            info!(run_id, "Run closed.");
        }
        Ok(())
    }

    /// Run body from the configuration, the suite's cases and section properties.
    fn run_spec(
        &self,
        suite_id: i64,
        case_ids: &[i64],
        properties: &[String],
    ) -> Result<RunSpec, UploadError> {
        let upload = &self.config.upload;

        let mut description: Vec<String> = Vec::new();
        if let Some(text) = &upload.run_description {
            description.push(format!("{text}\n"));
        }
        description.extend(properties.iter().cloned());

        let mut spec = RunSpec {
            name: upload.title.clone(),
            description: (!description.is_empty()).then(|| description.join("\n")),
            suite_id: Some(suite_id),
            milestone_id: upload.milestone_id,
            assignedto_id: upload.run_assigned_to_id,
            include_all: upload.run_include_all,
            case_ids: Vec::new(),
            refs: upload.run_refs.clone(),
            start_on: upload.run_start_date.as_deref().map(parse_run_date).transpose()?,
            due_on: upload.run_end_date.as_deref().map(parse_run_date).transpose()?,
        };
        if !spec.include_all {
            spec.merge_case_ids(upload.run_case_ids.iter().copied().chain(case_ids.iter().copied()));
        }
        Ok(spec)
    }

    async fn create_or_update_run(
        &self,
        project: &ProjectData,
        mut spec: RunSpec,
        state: &mut RunState,
    ) -> Result<i64, UploadError> {
        let upload = &self.config.upload;
        let runs = &self.handlers.runs;

        let Some(run_id) = upload.run_id else {
            if spec.name.is_none() {
                return Err(UploadError::Invalid(
                    "Please give your run a title using --title.".to_string(),
                ));
            }
            info!("Creating run.");
            let created = match upload.plan_id {
                Some(plan_id) => runs.add_plan_entry(plan_id, &spec, &upload.config_ids).await,
                None => runs.add_run(project.id, &spec).await,
            };
            let run_id = created.map_err(|source| UploadError::Run {
                action: "Error creating run",
                source,
            })?;
            state.record_run(run_id, true);
            self.log_run_link(run_id);
            return Ok(run_id);
        };

        state.record_run(run_id, false);
        let existing = runs.get_run(run_id).await.map_err(|source| UploadError::Run {
            action: "Error retrieving run",
            source,
        })?;
        info!(run_id, "Updating run.");

        if !spec.include_all {
            let tests = runs.tests(run_id).await.map_err(|e| UploadError::Run {
                action: "Error retrieving tests in run",
                source: ApiError::Client(e.message),
            })?;
            spec.merge_case_ids(tests.iter().map(|test| test.case_id));
        }
        spec.description = existing.description.clone();
        if spec.name.is_none() {
            spec.name = existing.name.clone();
        }

        let updated = match existing.plan_id {
            None => runs.update_run(run_id, &spec).await,
            Some(_) if !existing.config_ids.is_empty() => {
                runs.update_run_in_plan_entry(run_id, &spec).await
            }
            Some(plan_id) => {
                let plan = runs.get_plan(plan_id).await.map_err(|source| UploadError::Run {
                    action: "Error retrieving plan",
                    source,
                })?;
                let entry_id = plan.entry_for_run(run_id).ok_or_else(|| UploadError::Run {
                    action: "Error retrieving run entry in plan",
                    source: ApiError::InvalidResponse(format!("run {run_id} is not in plan {plan_id}")),
                })?;
                runs.update_plan_entry(plan_id, entry_id, &spec).await
            }
        };
        updated.map_err(|source| UploadError::Run {
            action: "Error updating run",
            source,
        })?;
        self.log_run_link(run_id);
        Ok(run_id)
    }

    fn log_run_link(&self, run_id: i64) {
        let host = self.config.server.host.as_deref().unwrap_or_default();
        info!(run_id, "Test run: {}/index.php?/runs/view/{run_id}", host.trim_end_matches('/'));
    }

    /// Submit the results of every case with an ID, in batches.
    ///
    /// On failure the error carries how many results were accepted before it.
    async fn add_results(&self, run_id: i64, suite: &Suite) -> Result<Vec<RemoteResult>, UploadError> {
        let bodies: Vec<Value> = suite
            .cases()
            .into_iter()
            .filter_map(|case| case.case_id.map(|id| case.result.to_body(id)))
            .collect();
        if bodies.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config.upload.batch_size.max(1);
        let batches: Vec<Vec<Value>> = bodies.chunks(batch_size).map(<[Value]>::to_vec).collect();
        info!("Adding results: {} in {} batches.", bodies.len(), batches.len());

        let progress = self.progress.start("Adding results", bodies.len() as u64);
        let handler = Arc::clone(&self.handlers.results);
        let outcome = self
            .engine
            .run(
                Phase::AddResults,
                batches,
                self.config.workers.result_workers,
                |batch| batch.len() as u64,
                |batch: Vec<Value>| {
                    let handler = Arc::clone(&handler);
                    async move {
                        handler
                            .add_results_for_cases(run_id, &batch)
                            .await
                            .map_err(|e| UnitFailure::new(e.to_string()))
                    }
                },
                progress.as_ref(),
            )
            .await;

        let error = outcome.error.clone();
        let interrupted = outcome.interruption(Phase::AddResults);
        let results: Vec<RemoteResult> = outcome.all_successes().into_iter().flatten().collect();
        interrupted?;
        match error {
            Some(message) => {
                warn!(submitted = results.len(), "Results accepted before the failure are kept.");
                Err(UploadError::Results {
                    message,
                    submitted: results.len(),
                })
            }
            None => Ok(results),
        }
    }

    /// Upload attachments to the results they belong to; returns the failure count.
    async fn upload_attachments(&self, run_id: i64, suite: &Suite, results: &[RemoteResult]) -> usize {
        let pending: Vec<(i64, PathBuf)> = suite
            .cases()
            .into_iter()
            .filter_map(|case| case.case_id.map(|id| (id, &case.result.attachments)))
            .flat_map(|(id, paths)| paths.iter().map(move |path| (id, path.clone())))
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let tests = match self.handlers.runs.tests(run_id).await {
            Ok(tests) => tests,
            Err(e) => {
                error!("Unable to upload attachments: {e}");
                return pending.len();
            }
        };
        let test_by_case: HashMap<i64, i64> = tests.iter().map(|t| (t.case_id, t.id)).collect();
        let result_by_test: HashMap<i64, i64> = results.iter().map(|r| (r.test_id, r.id)).collect();

        info!("Uploading {} attachments.", pending.len());
        let attachments = Arc::clone(&self.handlers.attachments);
        let failures: Vec<bool> = stream::iter(pending)
            .map(|(case_id, path)| {
                let attachments = Arc::clone(&attachments);
                let result_id = test_by_case
                    .get(&case_id)
                    .and_then(|test_id| result_by_test.get(test_id))
                    .copied();
                async move {
                    let Some(result_id) = result_id else {
                        error!(case_id, "No result to attach {} to.", path.display());
                        return true;
                    };
                    match attachments.add_attachment_to_result(result_id, &path).await {
                        Ok(()) => false,
                        Err(e) => {
                            error!(case_id, "Error uploading attachment {}: {e}", path.display());
                            true
                        }
                    }
                }
            })
            .buffer_unordered(self.config.workers.result_workers.max(1))
            .collect()
            .await;
        failures.into_iter().filter(|failed| *failed).count()
    }
}

/// Parse a `MM/DD/YYYY` date into a UTC timestamp.
pub fn parse_run_date(date: &str) -> Result<i64, UploadError> {
    let day = NaiveDate::parse_from_str(date.trim(), RUN_DATE_FORMAT)
        .map_err(|e| UploadError::Invalid(format!("Invalid run date '{date}' (expected MM/DD/YYYY): {e}")))?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| UploadError::Invalid(format!("Invalid run date '{date}'")))?;
    Ok(Utc.from_utc_datetime(&midnight).timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_date() {
        assert_eq!(parse_run_date("01/02/2024").unwrap(), 1_704_153_600);
        assert!(parse_run_date("2024-01-02").is_err());
        assert!(parse_run_date("13/40/2024").is_err());
    }

    #[test]
    fn test_rollback_log_only_on_rolled_back() {
        let plain = UploadError::Invalid("x".into());
        assert!(plain.rollback_log().is_empty());

        let rolled = UploadError::RolledBack {
            cause: Box::new(plain),
            log: vec!["Deleted created run".into()],
        };
        assert_eq!(rolled.rollback_log(), ["Deleted created run".to_string()]);
        assert_eq!(rolled.to_string(), "x");
    }
}
