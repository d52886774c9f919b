use thiserror::Error;

/// Errors from a single API operation.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service answered with an error, or could not be reached (`status` 0).
    #[error("{message}")]
    Remote { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    /// The entity `id` was created but echoed back different data.
    #[error("Data verification failed for {entity}: {details}")]
    Verification {
        entity: &'static str,
        id: i64,
        details: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// ID of an entity that exists remotely although the call failed.
    pub fn created_id(&self) -> Option<i64> {
        match self {
            ApiError::Verification { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Client(err.to_string())
    }
}
