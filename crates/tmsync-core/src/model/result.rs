//! Test outcomes attached to local cases.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;

/// Outcome of a test or step, encoded with the service's status IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Untested,
    Skipped,
    Failed,
}

impl Status {
    /// The service's status ID.
    pub fn id(self) -> i64 {
        match self {
            Status::Passed => 1,
            Status::Untested => 3,
            Status::Skipped => 4,
            Status::Failed => 5,
        }
    }
}

/// A single step of a test with its own outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub content: String,
    pub status: Option<Status>,
}

impl StepResult {
    pub fn new(content: impl Into<String>, status: Option<Status>) -> Self {
        Self {
            content: content.into(),
            status,
        }
    }
}

/// Result recorded for a case in a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseResult {
    pub status: Option<Status>,
    pub comment: Option<String>,
    /// Duration already formatted as a timespan, e.g. `"3s"`.
    pub elapsed: Option<String>,
    pub version: Option<String>,
    pub defects: Option<String>,
    pub assignedto_id: Option<i64>,
    pub steps: Vec<StepResult>,
    /// Files uploaded to the result once it exists.
    pub attachments: Vec<PathBuf>,
    /// Custom result fields, serialized at the top level of the result body.
    pub result_fields: Map<String, Value>,
}

impl CaseResult {
    pub fn with_status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Put `comment` in front of the existing comment, separated by a blank line.
    pub fn prepend_comment(&mut self, comment: &str) {
        self.comment = Some(match self.comment.take() {
            Some(existing) => format!("{comment}\n\n{existing}"),
            None => comment.to_string(),
        });
    }

    /// Add global result fields without overriding the result's own fields.
    pub fn add_global_fields(&mut self, fields: &Map<String, Value>) {
        for (key, value) in fields {
            self.result_fields
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Request body for this result of case `case_id`.
    pub fn to_body(&self, case_id: i64) -> Value {
        let mut body = Map::new();
        body.insert("case_id".into(), json!(case_id));
        if let Some(status) = self.status {
            body.insert("status_id".into(), json!(status.id()));
        }
        let optional = [
            ("comment", self.comment.as_ref()),
            ("elapsed", self.elapsed.as_ref()),
            ("version", self.version.as_ref()),
            ("defects", self.defects.as_ref()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                body.insert(key.into(), json!(value));
            }
        }
        if let Some(assignee) = self.assignedto_id {
            body.insert("assignedto_id".into(), json!(assignee));
        }
        if !self.steps.is_empty() {
            let steps: Vec<Value> = self
                .steps
                .iter()
                .map(|step| {
                    let mut s = json!({ "content": step.content });
                    if let Some(status) = step.status {
                        s["status_id"] = json!(status.id());
                    }
                    s
                })
                .collect();
            body.insert("custom_step_results".into(), Value::Array(steps));
        }
        for (key, value) in &self.result_fields {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}

/// Format a duration in seconds as a timespan string.
///
/// Without millisecond precision, anything above one second is rounded to
/// whole seconds and anything positive below that becomes `1s`. With it,
/// durations are kept to three decimals. Durations that would format to
/// nothing meaningful yield `None`.
pub fn format_elapsed(seconds: f64, allow_ms: bool) -> Option<String> {
    if !seconds.is_finite() {
        return None;
    }
    if allow_ms {
        if seconds >= 0.001 {
            let rounded = (seconds * 1000.0).round_ties_even() / 1000.0;
            Some(format!("{rounded}s"))
        } else {
            None
        }
    } else if seconds > 1.0 {
        Some(format!("{}s", seconds.round_ties_even() as i64))
    } else if seconds > 0.0 {
        Some("1s".to_string())
    } else {
        None
    }
}

/// Parse a timespan string such as `"1m 30s"`, `"2.5s"` or `"1h"` to seconds.
///
/// Unknown units make the whole span unparseable.
pub fn parse_timespan(span: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut seen = false;
    for part in span.split_whitespace() {
        let split = part.find(|c: char| c.is_ascii_alphabetic())?;
        let (number, unit) = part.split_at(split);
        let value: f64 = number.parse().ok()?;
        let factor = match unit {
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "d" => 86400.0,
            "w" => 604800.0,
            _ => return None,
        };
        total += value * factor;
        seen = true;
    }
    seen.then_some(total)
}
