use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{ResponseVerifier, SuiteHandler};
use crate::api::{created_id, ApiError, RemoteSuite, Transport};
use crate::cache::{EntityCache, EntityError, EntityKind};

pub struct RemoteSuites {
    transport: Arc<dyn Transport>,
    verifier: ResponseVerifier,
    cache: EntityCache<RemoteSuite>,
}

impl RemoteSuites {
    pub fn new(transport: Arc<dyn Transport>, verifier: ResponseVerifier) -> Self {
        Self {
            transport,
            verifier,
            cache: EntityCache::new(EntityKind::Suites),
        }
    }
}

#[async_trait]
impl SuiteHandler for RemoteSuites {
    async fn suites(&self, project_id: i64) -> Result<Arc<Vec<RemoteSuite>>, EntityError> {
        self.cache
            .entities(self.transport.as_ref(), &format!("get_suites/{project_id}"))
            .await
    }

    async fn add_suite(
        &self,
        project_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<i64, ApiError> {
        let mut body = json!({ "name": name });
        if let Some(description) = description {
            body["description"] = Value::String(description.to_string());
        }
        let returned = self
            .transport
            .post(&format!("add_suite/{project_id}"), &body)
            .await
            .into_result()?;
        let id = created_id(&returned)?;
        self.cache.invalidate().await;
        self.verifier.verify("suite", id, &body, &returned)?;
        Ok(id)
    }

    async fn delete_suite(&self, suite_id: i64) -> Result<(), ApiError> {
        self.transport
            .post(&format!("delete_suite/{suite_id}"), &json!({}))
            .await
            .into_result()?;
        self.cache.invalidate().await;
        Ok(())
    }
}
