//! JUnit XML reports.

use roxmltree::{Document, Node};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

use super::traits::{ReportFormat, ReportParser};
use super::{
    default_suite_name, file_name, parse_case_ids, parse_name_with_id, resolve_fields, trim_title,
    ParseError, ParseOptions,
};
use crate::matcher::MatcherKind;
use crate::model::{format_elapsed, Case, CaseResult, Property, Section, Status, Suite};

/// Parser for JUnit XML with either `<testsuites>` or `<testsuite>` as root.
#[derive(Debug, Default, Clone, Copy)]
pub struct JunitParser;

impl JunitParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse report `content` read from `path`.
    pub fn parse_str(&self, content: &str, path: &Path, options: &ParseOptions) -> Result<Suite, ParseError> {
        let doc = Document::parse(content).map_err(|e| ParseError::xml(path, e))?;
        let root = doc.root_element();

        let testsuites: Vec<Node> = match root.tag_name().name() {
            "testsuites" => root
                .children()
                .filter(|n| n.has_tag_name("testsuite"))
                .collect(),
            "testsuite" => vec![root],
            other => {
                return Err(ParseError::xml(
                    path,
                    format!("unexpected root element <{other}>, expected <testsuites> or <testsuite>"),
                ))
            }
        };

        let name = options
            .suite_name
            .clone()
            .or_else(|| {
                (root.has_tag_name("testsuites"))
                    .then(|| root.attribute("name"))
                    .flatten()
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| default_suite_name(path));

        let mut suite = Suite::new(name);
        suite.source = Some(file_name(path));

        let mut seen_properties = HashSet::new();
        let mut cases_count = 0;
        for testsuite in testsuites {
            let section = parse_testsuite(testsuite, options, &mut seen_properties)?;
            if section.cases.is_empty() {
                continue;
            }
            cases_count += section.cases.len();
            suite.sections.push(section);
        }

        info!(
            "Processed {cases_count} test cases in {} sections.",
            suite.sections.len()
        );
        Ok(suite)
    }
}

impl ReportParser for JunitParser {
    fn parse_file(&self, path: &Path, options: &ParseOptions) -> Result<Vec<Suite>, ParseError> {
        info!("Parsing JUnit report {}.", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
        Ok(vec![self.parse_str(&content, path, options)?])
    }

    fn format(&self) -> ReportFormat {
        ReportFormat::JUnit
    }

    fn format_name(&self) -> &'static str {
        "JUnit"
    }
}

fn parse_testsuite(
    node: Node,
    options: &ParseOptions,
    seen_properties: &mut HashSet<String>,
) -> Result<Section, ParseError> {
    let mut section = Section::new(node.attribute("name").unwrap_or_default());

    // Suite properties are kept once per report, on the first section carrying them.
    for (name, value) in properties(node) {
        if seen_properties.insert(name.to_string()) {
            section.properties.push(Property::new(name, value));
        }
    }

    for testcase in node.children().filter(|n| n.has_tag_name("testcase")) {
        section.cases.extend(parse_testcase(testcase, options)?);
    }
    Ok(section)
}

/// One case, or several when the case lists more than one ID.
fn parse_testcase(node: Node, options: &ParseOptions) -> Result<Vec<Case>, ParseError> {
    let raw_name = node.attribute("name").unwrap_or_default();
    let classname = node.attribute("classname").unwrap_or_default();
    let automation_id = format!("{classname}.{raw_name}");

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
    for (name, value) in properties(node) {
        if name == "test_id" && options.case_matcher == MatcherKind::Property {
            case_ids = parse_case_ids(value)?;
        } else if name.starts_with("testrail_attachment") {
            attachments.push(value.into());
        } else if name.starts_with("testrail_result_field") {
            result_fields.push(value);
        } else if name.starts_with("testrail_result_comment") {
            comments.push(value);
        } else if name.starts_with("testrail_case_field") {
            case_fields.push(value);
        }
    }

    let mut result = junit_result(node);
    result.elapsed = node
        .attribute("time")
        .and_then(|t| t.trim().parse::<f64>().ok())
        .and_then(|secs| format_elapsed(secs, options.allow_ms));
    result.attachments = attachments;
    result.result_fields = resolve_fields(&result_fields)?;
    for comment in comments.iter().rev() {
        result.prepend_comment(comment);
    }

    let mut case = Case::new(trim_title(&title)).with_automation_id(automation_id);
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

/// Status and comment from the `<failure>`, `<error>` or `<skipped>` child.
fn junit_result(node: Node) -> CaseResult {
    let outcome = node
        .children()
        .find(|n| n.has_tag_name("failure") || n.has_tag_name("error") || n.has_tag_name("skipped"));

    let Some(outcome) = outcome else {
        return CaseResult::with_status(Status::Passed);
    };

    let status = if outcome.has_tag_name("skipped") {
        Status::Skipped
    } else {
        Status::Failed
    };
    let mut result = CaseResult::with_status(status);

    let mut lines = Vec::new();
    if let Some(kind) = outcome.attribute("type").filter(|t| !t.is_empty()) {
        lines.push(format!("Type: {kind}"));
    }
    if let Some(message) = outcome.attribute("message").filter(|m| !m.is_empty()) {
        lines.push(format!("Message: {message}"));
    }
    if let Some(text) = outcome.text().map(str::trim).filter(|t| !t.is_empty()) {
        lines.push(format!("Text: {text}"));
    }
    if !lines.is_empty() {
        result.comment = Some(lines.join("\n"));
    }
    result
}

/// `name`/`value` pairs of the element's `<properties>` child.
fn properties<'a>(node: Node<'a, 'a>) -> Vec<(&'a str, &'a str)> {
    node.children()
        .filter(|n| n.has_tag_name("properties"))
        .flat_map(|props| props.children().filter(|n| n.has_tag_name("property")))
        .filter_map(|prop| {
            let name = prop.attribute("name")?;
            let value = prop.attribute("value").or_else(|| prop.text()).unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites name="nightly">
  <testsuite name="Login">
    <properties>
      <property name="browser" value="firefox"/>
    </properties>
    <testcase classname="tests.login" name="[C10] valid user" time="1.6"/>
    <testcase classname="tests.login" name="invalid user" time="0.2">
      <failure type="AssertionError" message="expected 401">stack trace</failure>
      <properties>
        <property name="test_id" value="C20, C21"/>
        <property name="testrail_attachment" value="shots/fail.png"/>
        <property name="testrail_result_field" value="custom_env:staging"/>
        <property name="testrail_result_comment" value="flaky on CI"/>
        <property name="testrail_case_field" value="custom_priority:high"/>
      </properties>
    </testcase>
  </testsuite>
  <testsuite name="Empty"/>
  <testsuite name="Logout">
    <properties>
      <property name="browser" value="firefox"/>
    </properties>
    <testcase classname="tests.logout" name="logout"><skipped message="not ready"/></testcase>
  </testsuite>
</testsuites>"#;

    fn parse(matcher: MatcherKind) -> Suite {
        let options = ParseOptions {
            case_matcher: matcher,
            ..Default::default()
        };
        JunitParser::new()
            .parse_str(REPORT, Path::new("reports/junit.xml"), &options)
            .unwrap()
    }

    #[test]
    fn test_sections_and_properties() {
        let suite = parse(MatcherKind::Auto);
        assert_eq!(suite.name, "nightly");
        assert_eq!(suite.source.as_deref(), Some("junit.xml"));
        let names: Vec<_> = suite.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Login", "Logout"]);
        assert_eq!(suite.sections[0].properties.len(), 1);
        assert!(suite.sections[1].properties.is_empty());
    }

    #[test]
    fn test_results() {
        let suite = parse(MatcherKind::Auto);
        let cases = suite.cases();
        assert_eq!(cases[0].automation_id.as_deref(), Some("tests.login.[C10] valid user"));
        assert_eq!(cases[0].result.status, Some(Status::Passed));
        assert_eq!(cases[0].result.elapsed.as_deref(), Some("2s"));

        let failed = &cases[1].result;
        assert_eq!(failed.status, Some(Status::Failed));
        assert_eq!(
            failed.comment.as_deref(),
            Some("flaky on CI\n\nType: AssertionError\nMessage: expected 401\nText: stack trace")
        );
        assert_eq!(failed.result_fields["custom_env"], "staging");
        assert_eq!(cases[1].case_fields["custom_priority"], "high");
        assert_eq!(failed.attachments.len(), 1);

        assert_eq!(cases[2].result.status, Some(Status::Skipped));
    }

    #[test]
    fn test_name_matcher_reads_id_from_title() {
        let suite = parse(MatcherKind::Name);
        let cases = suite.cases();
        assert_eq!(cases[0].case_id, Some(10));
        assert_eq!(cases[0].title, "valid user");
        assert_eq!(cases[1].case_id, None);
    }

    #[test]
    fn test_property_matcher_fans_out() {
        let suite = parse(MatcherKind::Property);
        let cases = suite.cases();
        assert_eq!(cases.len(), 4);
        assert_eq!(cases[1].case_id, Some(20));
        assert_eq!(cases[2].case_id, Some(21));
        assert_eq!(cases[1].result, cases[2].result);
    }

    #[test]
    fn test_single_testsuite_root() {
        let xml = r#"<testsuite name="solo"><testcase classname="a" name="b"/></testsuite>"#;
        let suite = JunitParser::new()
            .parse_str(xml, Path::new("solo-report.xml"), &ParseOptions::default())
            .unwrap();
        assert_eq!(suite.name, "solo-report");
        assert_eq!(suite.sections[0].name, "solo");
    }

    #[test]
    fn test_rejects_unknown_root() {
        let result = JunitParser::new().parse_str("<html/>", Path::new("x.xml"), &ParseOptions::default());
        assert!(matches!(result, Err(ParseError::Xml { .. })));
    }
}
