use tracing::info;

use super::{ReconcileError, Reconciler};
use crate::handlers::LookupError;
use crate::model::{ProjectData, SuiteMode};
use crate::rollback::RunState;

/// The suite an upload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuiteResolution {
    pub suite_id: i64,
    /// Whether the suite was created by this call.
    pub created: bool,
}

impl Reconciler<'_> {
    /// Resolve the target suite according to the project's suite mode.
    ///
    /// An explicit `suite_id` must exist. Otherwise a single-suite project
    /// must have exactly one suite, a project with baselines at most one,
    /// and a multi-suite project is matched by `name`, creating the suite
    /// after confirmation when no suite has that name.
    ///
    /// The suite is recorded in `state`, also when it was created but the
    /// creation call failed afterwards.
    pub async fn get_suite_id(
        &self,
        project: &ProjectData,
        name: &str,
        description: Option<&str>,
        suite_id: Option<i64>,
        state: &mut RunState,
    ) -> Result<SuiteResolution, ReconcileError> {
        let resolution = self
            .find_or_create_suite(project, name, description, suite_id, state)
            .await?;
        state.record_suite(resolution.suite_id, resolution.created);
        Ok(resolution)
    }

    async fn find_or_create_suite(
        &self,
        project: &ProjectData,
        name: &str,
        description: Option<&str>,
        suite_id: Option<i64>,
        state: &mut RunState,
    ) -> Result<SuiteResolution, ReconcileError> {
        let suites = self.handlers.suites.suites(project.id).await?;

        if let Some(id) = suite_id {
            return if suites.iter().any(|s| s.id == id) {
                Ok(SuiteResolution {
                    suite_id: id,
                    created: false,
                })
            } else {
                Err(LookupError::NotFound {
                    entity: "suite",
                    name: id.to_string(),
                }
                .into())
            };
        }

        match project.suite_mode {
            SuiteMode::SingleSuite | SuiteMode::SingleSuiteBaselines => {
                let mut iter = suites.iter();
                match (iter.next(), iter.next()) {
                    (Some(suite), None) => Ok(SuiteResolution {
                        suite_id: suite.id,
                        created: false,
                    }),
                    (None, _) => Err(LookupError::NotFound {
                        entity: "suite",
                        name: format!("any suite in project '{}'", project.name),
                    }
                    .into()),
                    (Some(_), Some(_)) => Err(LookupError::Ambiguous {
                        entity: "suite",
                        name: format!(
                            "project '{}', which should hold a single suite (one or more baselines exist)",
                            project.name
                        ),
                    }
                    .into()),
                }
            }
            SuiteMode::MultipleSuites => {
                let mut matching = suites.iter().filter(|s| s.name == name);
                match (matching.next(), matching.next()) {
                    (Some(suite), None) => Ok(SuiteResolution {
                        suite_id: suite.id,
                        created: false,
                    }),
                    (Some(_), Some(_)) => Err(LookupError::Ambiguous {
                        entity: "suite",
                        name: name.to_string(),
                    }
                    .into()),
                    (None, _) => {
                        self.confirm(
                            &format!(
                                "Suite '{name}' does not exist in project '{}'. Would you like to create it?",
                                project.name
                            ),
                            "suite",
                        )?;
                        info!("Adding suite to project {}.", project.name);
                        let id = match self.handlers.suites.add_suite(project.id, name, description).await {
                            Ok(id) => id,
                            Err(source) => {
                                if let Some(id) = source.created_id() {
                                    state.record_suite(id, true);
                                }
                                return Err(ReconcileError::Create {
                                    entity: "suite",
                                    source,
                                });
                            }
                        };
                        Ok(SuiteResolution {
                            suite_id: id,
                            created: true,
                        })
                    }
                }
            }
        }
    }
}
