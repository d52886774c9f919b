//! Cucumber JSON reports.

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::info;

use super::traits::{ReportFormat, ReportParser};
use super::{file_name, parse_name_with_id, trim_title, ParseError, ParseOptions};
use crate::matcher::MatcherKind;
use crate::model::{format_elapsed, Case, CaseResult, Section, Status, StepResult, Suite};

/// Suite name when the options give none; the report itself carries no name.
const DEFAULT_SUITE_NAME: &str = "Cucumber Test Results";

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Element {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    #[serde(default)]
    keyword: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    result: StepOutcome,
}

#[derive(Debug, Default, Deserialize)]
struct StepOutcome {
    #[serde(default)]
    status: String,
    /// Nanoseconds.
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    error_message: Option<String>,
}

impl Step {
    fn text(&self) -> String {
        format!("{} {}", self.keyword.trim(), self.name).trim().to_string()
    }

    fn status(&self) -> Status {
        match self.result.status.to_ascii_lowercase().as_str() {
            "passed" => Status::Passed,
            "failed" => Status::Failed,
            "skipped" => Status::Skipped,
            _ => Status::Untested,
        }
    }
}

/// Parser for Cucumber JSON output.
///
/// Every feature with scenarios becomes a section; scenarios and scenario
/// outlines become cases whose steps are the result's step results.
#[derive(Debug, Default, Clone, Copy)]
pub struct CucumberParser;

impl CucumberParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_str(&self, content: &str, path: &Path, options: &ParseOptions) -> Result<Suite, ParseError> {
        let raw: Value = serde_json::from_str(content)?;
        if !raw.is_array() {
            return Err(ParseError::Invalid(format!(
                "{}: Cucumber JSON must be an array of features",
                path.display()
            )));
        }
        let features: Vec<Feature> = serde_json::from_value(raw)?;

        let sections: Vec<Section> = features
            .iter()
            .map(|feature| parse_feature(feature, options))
            .filter(|section| !section.cases.is_empty())
            .collect();

        let name = options
            .suite_name
            .clone()
            .unwrap_or_else(|| DEFAULT_SUITE_NAME.to_string());
        let mut suite = Suite::new(name);
        suite.source = Some(file_name(path));
        suite.sections = sections;

        info!(
            "Processed {} test cases in {} sections.",
            suite.cases().len(),
            suite.sections.len()
        );
        Ok(suite)
    }
}

impl ReportParser for CucumberParser {
    fn parse_file(&self, path: &Path, options: &ParseOptions) -> Result<Vec<Suite>, ParseError> {
        info!("Parsing Cucumber JSON report {}.", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
        Ok(vec![self.parse_str(&content, path, options)?])
    }

    fn format(&self) -> ReportFormat {
        ReportFormat::Cucumber
    }

    fn format_name(&self) -> &'static str {
        "Cucumber JSON"
    }
}

fn tag_names(tags: &[Tag]) -> impl Iterator<Item = &str> {
    tags.iter().map(|t| t.name.as_str()).filter(|n| !n.is_empty())
}

fn parse_feature(feature: &Feature, options: &ParseOptions) -> Section {
    let name = feature.name.as_deref().unwrap_or("Untitled Feature");
    let mut section = Section::new(name);
    section.cases = feature
        .elements
        .iter()
        .filter(|e| matches!(e.kind.as_str(), "scenario" | "scenario_outline"))
        .map(|scenario| parse_scenario(scenario, name, &feature.tags, options))
        .collect();
    section
}

fn parse_scenario(scenario: &Element, feature: &str, feature_tags: &[Tag], options: &ParseOptions) -> Case {
    let raw_name = scenario.name.as_deref().unwrap_or("Untitled Scenario");
    let tags: Vec<&str> = tag_names(feature_tags).chain(tag_names(&scenario.tags)).collect();

    let automation_id = std::iter::once(feature)
        .chain(tags.iter().copied())
        .chain(std::iter::once(raw_name))
        .collect::<Vec<_>>()
        .join(".");

    let (case_id, title) = match options.case_matcher {
        MatcherKind::Name => parse_name_with_id(raw_name),
        MatcherKind::Property => (tags.iter().find_map(|tag| tag_case_id(tag)), raw_name.to_string()),
        MatcherKind::Auto => (None, raw_name.to_string()),
    };

    let mut result = CaseResult::with_status(overall_status(&scenario.steps));
    result.steps = scenario
        .steps
        .iter()
        .map(|step| StepResult::new(step.text(), Some(step.status())))
        .collect();

    let total: f64 = scenario.steps.iter().filter_map(|s| s.result.duration).sum();
    if total > 0.0 {
        result.elapsed = format_elapsed(total / NANOS_PER_SECOND, options.allow_ms);
    }

    let failures: Vec<String> = scenario
        .steps
        .iter()
        .filter(|step| step.status() == Status::Failed)
        .map(|step| {
            let mut text = format!("Failed: {}", step.text());
            if let Some(message) = step.result.error_message.as_deref().filter(|m| !m.is_empty()) {
                text.push_str(&format!("\n  Error: {message}"));
            }
            text
        })
        .collect();
    if !failures.is_empty() {
        result.comment = Some(failures.join("\n\n"));
    }

    let mut case = Case::new(trim_title(&title)).with_automation_id(automation_id);
    case.case_id = case_id;
    case.result = result;
    case
}

/// A failed step fails the scenario; otherwise the first step that did not
/// pass decides, and a scenario without such steps passed.
fn overall_status(steps: &[Step]) -> Status {
    let mut overall = Status::Passed;
    for step in steps {
        match step.status() {
            Status::Failed => return Status::Failed,
            Status::Passed => {}
            other if overall == Status::Passed => overall = other,
            _ => {}
        }
    }
    overall
}

/// Case ID of a `@C123` tag.
fn tag_case_id(tag: &str) -> Option<i64> {
    let rest = tag.strip_prefix("@C").or_else(|| tag.strip_prefix("@c"))?;
    rest.parse().ok()
}
