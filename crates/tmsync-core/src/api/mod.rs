//! Transport to the remote test-management service.
//!
//! Every request yields an [`ApiResponse`] with the same shape whether it
//! succeeded, failed remotely or never reached the service; handlers turn
//! that into typed results with [`ApiResponse::into_result`].

mod error;
mod http;
mod remote;

pub use error::ApiError;
pub use http::HttpTransport;
pub use remote::{
    CaseField, FieldConfig, FieldContext, PlanEntry, PlanRun, RemoteCase, RemotePlan,
    RemoteProject, RemoteResult, RemoteRun, RemoteSection, RemoteSuite, RemoteTest,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

/// Outcome of a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status, or 0 when no response was received.
    pub status_code: u16,
    pub body: Value,
    /// Error reported by the service or the transport.
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            body,
            error: None,
        }
    }

    pub fn failed(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            body: Value::Null,
            error: Some(message.into()),
        }
    }

    /// A non-empty error message is a failure regardless of the status code.
    pub fn is_success(&self) -> bool {
        self.error.as_deref().map_or(true, str::is_empty) && (200..300).contains(&self.status_code)
    }

    pub fn into_result(self) -> Result<Value, ApiError> {
        match self.error {
            Some(message) if !message.is_empty() => Err(ApiError::Remote {
                status: self.status_code,
                message,
            }),
            _ if !(200..300).contains(&self.status_code) => Err(ApiError::Remote {
                status: self.status_code,
                message: format!("Request failed with status {}", self.status_code),
            }),
            _ => Ok(self.body),
        }
    }

    /// Deserialize a successful body.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let body = self.into_result()?;
        serde_json::from_value(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

/// Sends requests to the service.
///
/// `uri` is relative to the API root, e.g. `get_cases/1&suite_id=2`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, uri: &str) -> ApiResponse;

    async fn post(&self, uri: &str, body: &Value) -> ApiResponse;

    /// Upload a file as a multipart `attachment` field.
    async fn post_file(&self, uri: &str, path: &Path) -> ApiResponse;
}

/// Read the `id` of a created entity from its response body.
pub(crate) fn created_id(body: &Value) -> Result<i64, ApiError> {
    body.get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiError::InvalidResponse("response has no numeric `id`".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_wins_over_status() {
        let response = ApiResponse {
            status_code: 200,
            body: json!({}),
            error: Some("Field :title is required".into()),
        };
        assert!(!response.is_success());
        let err = response.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Field :title is required");
    }

    #[test]
    fn test_bad_status_without_message() {
        let response = ApiResponse::ok(403, Value::Null);
        assert_eq!(response.into_result().unwrap_err().status(), Some(403));
    }

    #[test]
    fn test_parse_body() {
        let response = ApiResponse::ok(200, json!({"id": 5, "name": "Suite"}));
        let suite: RemoteSuite = response.parse().unwrap();
        assert_eq!(suite.id, 5);
        assert_eq!(created_id(&json!({"id": 9})).unwrap(), 9);
        assert!(created_id(&json!({})).is_err());
    }
}
