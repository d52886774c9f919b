use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use super::{AttachmentHandler, ResultHandler};
use crate::api::{ApiError, RemoteResult, Transport};

pub struct RemoteResults {
    transport: Arc<dyn Transport>,
}

impl RemoteResults {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ResultHandler for RemoteResults {
    async fn add_results_for_cases(
        &self,
        run_id: i64,
        results: &[Value],
    ) -> Result<Vec<RemoteResult>, ApiError> {
        self.transport
            .post(
                &format!("add_results_for_cases/{run_id}"),
                &json!({ "results": results }),
            )
            .await
            .parse()
    }
}

pub struct RemoteAttachments {
    transport: Arc<dyn Transport>,
}

impl RemoteAttachments {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AttachmentHandler for RemoteAttachments {
    async fn add_attachment_to_result(&self, result_id: i64, path: &Path) -> Result<(), ApiError> {
        self.transport
            .post_file(&format!("add_attachment_to_result/{result_id}"), path)
            .await
            .into_result()?;
        Ok(())
    }
}
