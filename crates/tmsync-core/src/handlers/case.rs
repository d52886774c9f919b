use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{CaseHandler, ResponseVerifier};
use crate::api::{created_id, ApiError, RemoteCase, Transport};
use crate::cache::{EntityCache, EntityError, EntityKind};

pub struct RemoteCases {
    transport: Arc<dyn Transport>,
    verifier: ResponseVerifier,
    cache: EntityCache<RemoteCase>,
}

impl RemoteCases {
    pub fn new(transport: Arc<dyn Transport>, verifier: ResponseVerifier) -> Self {
        Self {
            transport,
            verifier,
            cache: EntityCache::new(EntityKind::Cases),
        }
    }
}

#[async_trait]
impl CaseHandler for RemoteCases {
    async fn cases(
        &self,
        project_id: i64,
        suite_id: i64,
    ) -> Result<Arc<Vec<RemoteCase>>, EntityError> {
        self.cache
            .entities(
                self.transport.as_ref(),
                &format!("get_cases/{project_id}&suite_id={suite_id}"),
            )
            .await
    }

    async fn get_case(&self, case_id: i64) -> Result<Option<RemoteCase>, ApiError> {
        let response = self.transport.get(&format!("get_case/{case_id}")).await;
        // The service answers 400 for IDs it does not know.
        if matches!(response.status_code, 400 | 404) {
            return Ok(None);
        }
        response.parse().map(Some)
    }

    async fn add_case(&self, section_id: i64, body: &Value) -> Result<i64, ApiError> {
        let returned = self
            .transport
            .post(&format!("add_case/{section_id}"), body)
            .await
            .into_result()?;
        let id = created_id(&returned)?;
        self.verifier.verify("case", id, body, &returned)?;
        Ok(id)
    }

    async fn update_case(&self, case_id: i64, body: &Value) -> Result<(), ApiError> {
        self.transport
            .post(&format!("update_case/{case_id}"), body)
            .await
            .into_result()?;
        Ok(())
    }

    async fn delete_cases(&self, suite_id: i64, case_ids: &[i64]) -> Result<(), ApiError> {
        self.transport
            .post(&format!("delete_cases/{suite_id}"), &json!({ "case_ids": case_ids }))
            .await
            .into_result()?;
        self.cache.invalidate().await;
        Ok(())
    }

    async fn invalidate(&self) {
        self.cache.invalidate().await;
    }
}
