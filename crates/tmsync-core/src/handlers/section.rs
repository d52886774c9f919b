use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use super::{ResponseVerifier, SectionHandler};
use crate::api::{created_id, ApiError, RemoteSection, Transport};
use crate::cache::{EntityCache, EntityError, EntityKind};

/// Body of a section create request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSection {
    pub name: String,
    pub suite_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub struct RemoteSections {
    transport: Arc<dyn Transport>,
    verifier: ResponseVerifier,
    cache: EntityCache<RemoteSection>,
}

impl RemoteSections {
    pub fn new(transport: Arc<dyn Transport>, verifier: ResponseVerifier) -> Self {
        Self {
            transport,
            verifier,
            cache: EntityCache::new(EntityKind::Sections),
        }
    }
}

#[async_trait]
impl SectionHandler for RemoteSections {
    async fn sections(
        &self,
        project_id: i64,
        suite_id: i64,
    ) -> Result<Arc<Vec<RemoteSection>>, EntityError> {
        self.cache
            .entities(
                self.transport.as_ref(),
                &format!("get_sections/{project_id}&suite_id={suite_id}"),
            )
            .await
    }

    async fn add_section(&self, project_id: i64, section: &NewSection) -> Result<i64, ApiError> {
        let body = serde_json::to_value(section)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        let returned = self
            .transport
            .post(&format!("add_section/{project_id}"), &body)
            .await
            .into_result()?;
        let id = created_id(&returned)?;
        self.verifier.verify("section", id, &body, &returned)?;
        Ok(id)
    }

    async fn delete_section(&self, section_id: i64) -> Result<(), ApiError> {
        self.transport
            .post(&format!("delete_section/{section_id}"), &json!({}))
            .await
            .into_result()?;
        Ok(())
    }

    async fn invalidate(&self) {
        self.cache.invalidate().await;
    }
}
