//! Robot Framework `output.xml` reports.

use chrono::NaiveDateTime;
use roxmltree::{Document, Node};
use std::path::{Path, PathBuf};
use tracing::info;

use super::traits::{ReportFormat, ReportParser};
use super::{
    default_suite_name, file_name, parse_case_ids, parse_name_with_id, resolve_fields, trim_title,
    ParseError, ParseOptions,
};
use crate::matcher::MatcherKind;
use crate::model::{format_elapsed, Case, CaseResult, Section, Status, StepResult, Suite};

/// Timestamp format of `starttime`/`endtime` before Robot Framework 7.
const TIMESTAMP_FORMAT: &str = "%Y%m%d %H:%M:%S%.f";

const CASE_ID_DIRECTIVE: &str = "- testrail_case_id:";
const ATTACHMENT_DIRECTIVE: &str = "- testrail_attachment:";
const RESULT_FIELD_DIRECTIVE: &str = "- testrail_result_field:";
const RESULT_COMMENT_DIRECTIVE: &str = "- testrail_result_comment:";
const CASE_FIELD_DIRECTIVE: &str = "- testrail_case_field:";

/// Parser for Robot Framework output.
///
/// Nested suites become sections named by their dotted path; only suites
/// that hold tests directly produce a section.
#[derive(Debug, Default, Clone, Copy)]
pub struct RobotParser;

impl RobotParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_str(&self, content: &str, path: &Path, options: &ParseOptions) -> Result<Suite, ParseError> {
        let doc = Document::parse(content).map_err(|e| ParseError::xml(path, e))?;
        let root = doc.root_element();
        if !root.has_tag_name("robot") {
            return Err(ParseError::xml(path, "expected <robot> as root element"));
        }

        let mut sections = Vec::new();
        for suite in root.children().filter(|n| n.has_tag_name("suite")) {
            collect_sections(suite, "", options, &mut sections)?;
        }

        let name = options
            .suite_name
            .clone()
            .unwrap_or_else(|| default_suite_name(path));
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

impl ReportParser for RobotParser {
    fn parse_file(&self, path: &Path, options: &ParseOptions) -> Result<Vec<Suite>, ParseError> {
        info!("Parsing Robot Framework report {}.", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
        Ok(vec![self.parse_str(&content, path, options)?])
    }

    fn format(&self) -> ReportFormat {
        ReportFormat::Robot
    }

    fn format_name(&self) -> &'static str {
        "Robot Framework"
    }
}

fn collect_sections(
    node: Node,
    namespace: &str,
    options: &ParseOptions,
    sections: &mut Vec<Section>,
) -> Result<(), ParseError> {
    let name = node.attribute("name").unwrap_or_default();
    let namespace = if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    };

    let tests: Vec<Node> = node.children().filter(|n| n.has_tag_name("test")).collect();
    if !tests.is_empty() {
        let mut section = Section::new(namespace.clone());
        for test in tests {
            section.cases.extend(parse_test(test, &namespace, options)?);
        }
        sections.push(section);
    }

    for child in node.children().filter(|n| n.has_tag_name("suite")) {
        collect_sections(child, &namespace, options, sections)?;
    }
    Ok(())
}

fn parse_test(node: Node, namespace: &str, options: &ParseOptions) -> Result<Vec<Case>, ParseError> {
    let raw_name = node.attribute("name").unwrap_or_default();
    let (mut case_ids, title) = match options.case_matcher {
        MatcherKind::Name => {
            let (id, title) = parse_name_with_id(raw_name);
            (id.into_iter().collect::<Vec<_>>(), title)
        }
        _ => (Vec::new(), raw_name.to_string()),
    };

    let mut attachments: Vec<PathBuf> = Vec::new();
    let mut result_fields = Vec::new();
    let mut case_fields = Vec::new();
    let mut comments = Vec::new();
    let doc = node
        .children()
        .find(|n| n.has_tag_name("doc"))
        .and_then(|n| n.text())
        .unwrap_or_default();
    for line in doc.lines().map(str::trim) {
        if let Some(value) = directive(line, CASE_ID_DIRECTIVE) {
            if options.case_matcher == MatcherKind::Property {
                case_ids = parse_case_ids(value)?;
            }
        } else if let Some(value) = directive(line, ATTACHMENT_DIRECTIVE) {
            attachments.push(value.into());
        } else if let Some(value) = directive(line, RESULT_FIELD_DIRECTIVE) {
            result_fields.push(value);
        } else if let Some(value) = directive(line, RESULT_COMMENT_DIRECTIVE) {
            comments.push(value);
        } else if let Some(value) = directive(line, CASE_FIELD_DIRECTIVE) {
            case_fields.push(value);
        }
    }

    let status_node = node
        .children()
        .find(|n| n.has_tag_name("status"))
        .ok_or_else(|| ParseError::Invalid(format!("Test '{raw_name}' has no status")))?;

    let mut result = CaseResult::with_status(status_of(status_node)?);
    result.comment = status_node
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    result.elapsed = elapsed_seconds(status_node).and_then(|secs| format_elapsed(secs, options.allow_ms));
    for keyword in node.children().filter(|n| n.has_tag_name("kw")) {
        let status = keyword
            .children()
            .find(|n| n.has_tag_name("status"))
            .map(status_of)
            .transpose()?;
        result
            .steps
            .push(StepResult::new(keyword.attribute("name").unwrap_or_default(), status));
    }
    result.attachments = attachments;
    result.result_fields = resolve_fields(&result_fields)?;
    for comment in comments.iter().rev() {
        result.prepend_comment(comment);
    }

    let mut case = Case::new(trim_title(&title)).with_automation_id(format!("{namespace}.{title}"));
    case.case_fields = resolve_fields(&case_fields)?;
    case.result = result;

    Ok(match case_ids.as_slice() {
        [] => vec![case],
        [id] => {
            case.case_id = Some(*id);
            vec![case]
        }
        ids => case.fan_out(ids),
    })
}

/// Value of a `- testrail_*:` documentation line, matched case-insensitively.
fn directive<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| line[prefix.len()..].trim())
}

fn status_of(node: Node) -> Result<Status, ParseError> {
    let status = node.attribute("status").unwrap_or_default();
    match status.to_ascii_lowercase().as_str() {
        "pass" => Ok(Status::Passed),
        "not run" => Ok(Status::Untested),
        "skip" => Ok(Status::Skipped),
        "fail" => Ok(Status::Failed),
        _ => Err(ParseError::Invalid(format!("Unknown Robot Framework status '{status}'"))),
    }
}

/// Duration from `elapsed` (Robot Framework 7) or `starttime`/`endtime`.
fn elapsed_seconds(status: Node) -> Option<f64> {
    if let Some(elapsed) = status.attribute("elapsed") {
        return elapsed.trim().parse().ok();
    }
    let start = NaiveDateTime::parse_from_str(status.attribute("starttime")?, TIMESTAMP_FORMAT).ok()?;
    let end = NaiveDateTime::parse_from_str(status.attribute("endtime")?, TIMESTAMP_FORMAT).ok()?;
    Some((end - start).num_milliseconds() as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<robot generator="Robot 6.1">
  <suite name="Tests">
    <suite name="Sub">
      <test name="[C5] Passing test">
        <kw name="Open Browser"><status status="PASS" starttime="20240101 10:00:00.000" endtime="20240101 10:00:01.000"/></kw>
        <kw name="Check Title"><status status="PASS" starttime="20240101 10:00:01.000" endtime="20240101 10:00:02.000"/></kw>
        <doc>Checks the login page
- testrail_case_id: C5, C6
- testrail_attachment: out/screen.png
- testrail_result_field: custom_env:qa
- testrail_result_comment: nightly</doc>
        <status status="PASS" starttime="20240101 10:00:00.000" endtime="20240101 10:00:02.600"/>
      </test>
      <test name="Failing test">
        <kw name="Fail"><status status="FAIL" starttime="20240101 10:00:03.000" endtime="20240101 10:00:03.100"/></kw>
        <status status="FAIL" starttime="20240101 10:00:03.000" endtime="20240101 10:00:03.100">Boom</status>
      </test>
    </suite>
  </suite>
</robot>"#;

    fn parse(matcher: MatcherKind) -> Suite {
        let options = ParseOptions {
            case_matcher: matcher,
            ..Default::default()
        };
        RobotParser::new()
            .parse_str(OUTPUT, Path::new("output.xml"), &options)
            .unwrap()
    }

    #[test]
    fn test_dotted_sections() {
        let suite = parse(MatcherKind::Auto);
        assert_eq!(suite.name, "output");
        assert_eq!(suite.sections.len(), 1);
        assert_eq!(suite.sections[0].name, "Tests.Sub");
        let cases = suite.cases();
        assert_eq!(cases[1].automation_id.as_deref(), Some("Tests.Sub.Failing test"));
    }

    #[test]
    fn test_steps_and_status() {
        let suite = parse(MatcherKind::Auto);
        let cases = suite.cases();
        let passed = &cases[0].result;
        assert_eq!(passed.status, Some(Status::Passed));
        assert_eq!(passed.elapsed.as_deref(), Some("3s"));
        assert_eq!(passed.steps.len(), 2);
        assert_eq!(passed.steps[0].content, "Open Browser");
        assert_eq!(passed.comment.as_deref(), Some("nightly"));
        assert_eq!(passed.result_fields["custom_env"], "qa");

        let failed = &cases[1].result;
        assert_eq!(failed.status, Some(Status::Failed));
        assert_eq!(failed.comment.as_deref(), Some("Boom"));
        assert_eq!(failed.steps[0].status, Some(Status::Failed));
    }

    #[test]
    fn test_case_id_matchers() {
        let by_name = parse(MatcherKind::Name);
        assert_eq!(by_name.cases()[0].case_id, Some(5));
        assert_eq!(by_name.cases()[0].title, "Passing test");

        let by_property = parse(MatcherKind::Property);
        let ids: Vec<_> = by_property.cases().iter().map(|c| c.case_id).collect();
        assert_eq!(ids, vec![Some(5), Some(6), None]);
    }

    #[test]
    fn test_rf7_elapsed_attribute() {
        let xml = r#"<robot><suite name="S"><test name="t">
            <status status="SKIP" start="2024-01-01T10:00:00.000000" elapsed="0.250"/>
        </test></suite></robot>"#;
        let options = ParseOptions {
            allow_ms: true,
            ..Default::default()
        };
        let suite = RobotParser::new().parse_str(xml, Path::new("o.xml"), &options).unwrap();
        let result = &suite.cases()[0].result;
        assert_eq!(result.status, Some(Status::Skipped));
        assert_eq!(result.elapsed.as_deref(), Some("0.25s"));
    }
}
