//! Echo verification of created entities.

use serde_json::Value;

use crate::api::ApiError;
use crate::model::parse_timespan;

/// Compares what was sent with what the service returned for a create call.
///
/// Every field sent must come back equal. Descriptions and comments treat a
/// missing value and an empty string alike; estimates compare by total duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseVerifier {
    enabled: bool,
}

impl ResponseVerifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Check the echo of the entity `id`; a mismatch error carries `id`.
    pub fn verify(
        &self,
        entity: &'static str,
        id: i64,
        sent: &Value,
        returned: &Value,
    ) -> Result<(), ApiError> {
        if !self.enabled {
            return Ok(());
        }
        let Some(sent) = sent.as_object() else {
            return Ok(());
        };
        for (key, value) in sent {
            let echoed = returned.get(key).unwrap_or(&Value::Null);
            if !fields_match(key, value, echoed) {
                return Err(ApiError::Verification {
                    entity,
                    id,
                    details: format!("field `{key}` sent as {value} but returned as {echoed}"),
                });
            }
        }
        Ok(())
    }
}

fn fields_match(key: &str, sent: &Value, returned: &Value) -> bool {
    match key {
        "description" | "comment" => text_or_empty(sent) == text_or_empty(returned),
        "estimate" => match (sent.as_str(), returned.as_str()) {
            (Some(a), Some(b)) => match (parse_timespan(a), parse_timespan(b)) {
                (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
                _ => a == b,
            },
            _ => sent == returned,
        },
        _ => sent == returned,
    }
}

fn text_or_empty(value: &Value) -> &str {
    value.as_str().unwrap_or("")
}
