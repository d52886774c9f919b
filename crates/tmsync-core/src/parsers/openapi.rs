//! OpenAPI specifications, one case per documented response.

use serde_yaml::Value;
use std::path::Path;
use tracing::info;

use super::traits::{ReportFormat, ReportParser};
use super::{default_suite_name, file_name, trim_title, ParseError, ParseOptions};
use crate::model::{Case, Section, Suite};

const VERBS: &[&str] = &["get", "put", "patch", "post", "delete", "options", "trace", "connect"];

const UNTAGGED: &str = "untagged";

/// Parser generating cases from the responses of an OpenAPI document.
///
/// Cases carry no result status: they describe what is to be tested.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenApiParser;

impl OpenApiParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_str(&self, content: &str, path: &Path, options: &ParseOptions) -> Result<Suite, ParseError> {
        let spec: Value = serde_yaml::from_str(content)?;
        let paths = spec
            .get("paths")
            .and_then(Value::as_mapping)
            .ok_or_else(|| ParseError::Invalid("OpenAPI document has no paths".to_string()))?;

        let mut sections = vec![Section::new(UNTAGGED)];
        let mut cases_count = 0;

        for (route, operations) in paths {
            let Some(route) = route.as_str() else { continue };
            let Some(operations) = operations.as_mapping() else { continue };

            for (verb, operation) in operations {
                let Some(verb) = verb.as_str().filter(|v| VERBS.contains(&v.to_ascii_lowercase().as_str())) else {
                    continue;
                };
                let Some(responses) = operation.get("responses").and_then(Value::as_mapping) else {
                    continue;
                };

                let tag = operation
                    .get("tags")
                    .and_then(Value::as_sequence)
                    .and_then(|tags| tags.first())
                    .and_then(Value::as_str)
                    .unwrap_or(UNTAGGED);
                let index = match sections.iter().position(|s| s.name == tag) {
                    Some(index) => index,
                    None => {
                        sections.push(Section::new(tag));
                        sections.len() - 1
                    }
                };

                for (code, response) in responses {
                    let code = scalar_to_string(code);
                    let description = response.get("description").and_then(Value::as_str);
                    let case = response_case(route, verb, &code, description);
                    sections[index].cases.push(case);
                    cases_count += 1;
                }
            }
        }

        let name = options.suite_name.clone().unwrap_or_else(|| {
            spec.get("info")
                .and_then(|info| info.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| default_suite_name(path))
        });
        let mut suite = Suite::new(name);
        suite.source = Some(file_name(path));
        suite.sections = sections.into_iter().filter(|s| !s.cases.is_empty()).collect();

        info!("Processed {cases_count} test cases based on possible responses.");
        Ok(suite)
    }
}

impl ReportParser for OpenApiParser {
    fn parse_file(&self, path: &Path, options: &ParseOptions) -> Result<Vec<Suite>, ParseError> {
        info!("Parsing OpenAPI specification {}.", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
        Ok(vec![self.parse_str(&content, path, options)?])
    }

    fn format(&self) -> ReportFormat {
        ReportFormat::OpenApi
    }

    fn format_name(&self) -> &'static str {
        "OpenAPI"
    }
}

/// `GET /pets -> 200 (A list of pets)` with automation ID `/pets.GET.200`.
fn response_case(route: &str, verb: &str, code: &str, description: Option<&str>) -> Case {
    let verb = verb.to_ascii_uppercase();
    let mut title = format!("{verb} {route} -> {code}");
    if let Some(description) = description.filter(|d| !d.is_empty()) {
        title.push_str(&format!(" ({description})"));
    }
    Case::new(trim_title(&title)).with_automation_id(format!("{route}.{verb}.{code}"))
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
