use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::RunHandler;
use crate::api::{created_id, ApiError, RemotePlan, RemoteRun, RemoteTest, Transport};
use crate::cache::{EntityCache, EntityError, EntityKind};
use crate::model::RunSpec;

pub struct RemoteRuns {
    transport: Arc<dyn Transport>,
    tests: EntityCache<RemoteTest>,
}

impl RemoteRuns {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            tests: EntityCache::new(EntityKind::Tests),
        }
    }

    async fn post(&self, uri: &str, body: &Value) -> Result<Value, ApiError> {
        self.transport.post(uri, body).await.into_result()
    }
}

fn run_body(run: &RunSpec) -> Result<Value, ApiError> {
    serde_json::to_value(run).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl RunHandler for RemoteRuns {
    async fn get_run(&self, run_id: i64) -> Result<RemoteRun, ApiError> {
        self.transport.get(&format!("get_run/{run_id}")).await.parse()
    }

    async fn add_run(&self, project_id: i64, run: &RunSpec) -> Result<i64, ApiError> {
        let returned = self.post(&format!("add_run/{project_id}"), &run_body(run)?).await?;
        self.tests.invalidate().await;
        created_id(&returned)
    }

    async fn update_run(&self, run_id: i64, run: &RunSpec) -> Result<(), ApiError> {
        self.post(&format!("update_run/{run_id}"), &run_body(run)?).await?;
        self.tests.invalidate().await;
        Ok(())
    }

    async fn close_run(&self, run_id: i64) -> Result<(), ApiError> {
        self.post(&format!("close_run/{run_id}"), &json!({ "run_id": run_id }))
            .await?;
        Ok(())
    }

    async fn delete_run(&self, run_id: i64) -> Result<(), ApiError> {
        self.post(&format!("delete_run/{run_id}"), &json!({})).await?;
        self.tests.invalidate().await;
        Ok(())
    }

    /// Tests of a run, cached until the run's case selection changes.
    async fn tests(&self, run_id: i64) -> Result<Arc<Vec<RemoteTest>>, EntityError> {
        self.tests
            .entities(self.transport.as_ref(), &format!("get_tests/{run_id}"))
            .await
    }

    async fn get_plan(&self, plan_id: i64) -> Result<RemotePlan, ApiError> {
        self.transport.get(&format!("get_plan/{plan_id}")).await.parse()
    }

    async fn add_plan_entry(
        &self,
        plan_id: i64,
        run: &RunSpec,
        config_ids: &[i64],
    ) -> Result<i64, ApiError> {
        let run_body = run_body(run)?;
        let body = if config_ids.is_empty() {
            run_body
        } else {
            json!({
                "name": run.name,
                "suite_id": run.suite_id,
                "config_ids": config_ids,
                "runs": [run_body],
            })
        };
        let returned = self.post(&format!("add_plan_entry/{plan_id}"), &body).await?;
        self.tests.invalidate().await;
        returned
            .get("runs")
            .and_then(|runs| runs.get(0))
            .and_then(|run| run.get("id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| ApiError::InvalidResponse("plan entry has no run".to_string()))
    }

    async fn update_plan_entry(
        &self,
        plan_id: i64,
        entry_id: &str,
        run: &RunSpec,
    ) -> Result<(), ApiError> {
        self.post(&format!("update_plan_entry/{plan_id}/{entry_id}"), &run_body(run)?)
            .await?;
        self.tests.invalidate().await;
        Ok(())
    }

    async fn update_run_in_plan_entry(&self, run_id: i64, run: &RunSpec) -> Result<(), ApiError> {
        self.post(&format!("update_run_in_plan_entry/{run_id}"), &run_body(run)?)
            .await?;
        self.tests.invalidate().await;
        Ok(())
    }
}
