use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{LookupError, ProjectHandler};
use crate::api::{CaseField, RemoteProject, Transport};
use crate::cache::{fetch_all, EntityCache, EntityKind};
use crate::config::AUTOMATION_ID_FIELDS;
use crate::model::{ProjectData, SuiteMode};

pub struct RemoteProjects {
    transport: Arc<dyn Transport>,
    cache: EntityCache<RemoteProject>,
}

impl RemoteProjects {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: EntityCache::new(EntityKind::Projects),
        }
    }

    async fn projects(&self) -> Result<Arc<Vec<RemoteProject>>, LookupError> {
        Ok(self.cache.entities(self.transport.as_ref(), "get_projects").await?)
    }
}

fn to_project_data(project: &RemoteProject) -> Result<ProjectData, LookupError> {
    let suite_mode = SuiteMode::from_id(project.suite_mode).ok_or_else(|| {
        LookupError::Validation(format!(
            "Project '{}' has an unknown suite mode {}",
            project.name, project.suite_mode
        ))
    })?;
    Ok(ProjectData {
        id: project.id,
        name: project.name.clone(),
        suite_mode,
    })
}

#[async_trait]
impl ProjectHandler for RemoteProjects {
    async fn project_by_id(&self, project_id: i64) -> Result<ProjectData, LookupError> {
        let projects = self.projects().await?;
        let project = projects
            .iter()
            .find(|p| p.id == project_id)
            .ok_or_else(|| LookupError::NotFound {
                entity: "project",
                name: project_id.to_string(),
            })?;
        to_project_data(project)
    }

    async fn project_by_name(&self, name: &str) -> Result<ProjectData, LookupError> {
        let projects = self.projects().await?;
        let mut matching = projects.iter().filter(|p| p.name == name);
        match (matching.next(), matching.next()) {
            (Some(project), None) => to_project_data(project),
            (Some(_), Some(_)) => Err(LookupError::Ambiguous {
                entity: "project",
                name: name.to_string(),
            }),
            (None, _) => Err(LookupError::NotFound {
                entity: "project",
                name: name.to_string(),
            }),
        }
    }

    async fn automation_id_field(&self, project_id: i64) -> Result<String, LookupError> {
        let raw = fetch_all(self.transport.as_ref(), EntityKind::CaseFields, "get_case_fields")
            .await
            .map_err(|e| {
                LookupError::Transport(format!("Can not define automation ID field: {}", e.message))
            })?;
        let fields: Vec<CaseField> = raw
            .into_iter()
            .filter_map(|field| serde_json::from_value(field).ok())
            .collect();

        // Both names existing at once is left to the service's admins; the first wins.
        let field = fields
            .iter()
            .find(|f| AUTOMATION_ID_FIELDS.contains(&f.system_name.as_str()))
            .ok_or_else(|| LookupError::NotFound {
                entity: "automation ID field",
                name: AUTOMATION_ID_FIELDS.join(" or "),
            })?;

        if !field.is_active || !field.applies_to(project_id) {
            return Err(LookupError::Validation(format!(
                "Automation ID field '{}' is not active for project {project_id}. \
                 Enable it in the service's case field settings.",
                field.system_name
            )));
        }

        debug!(field = %field.system_name, project_id, "resolved automation ID field");
        Ok(field.system_name.clone())
    }
}
