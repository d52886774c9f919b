//! Parser registry for managing report format parsers.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::cucumber::CucumberParser;
use super::junit::JunitParser;
use super::merge::{merge_junit_reports, resolve_report_files};
use super::openapi::OpenApiParser;
use super::robot::RobotParser;
use super::traits::{ReportFormat, ReportParser};
use super::{ParseError, ParseOptions};
use crate::model::Suite;

/// Registry of report parsers, one per format.
pub struct ParserRegistry {
    parsers: HashMap<ReportFormat, Arc<dyn ReportParser>>,
}

impl ParserRegistry {
    /// Create a new registry with all built-in parsers.
    pub fn new() -> Self {
        let mut registry = Self {
            parsers: HashMap::new(),
        };

        registry.register(Arc::new(JunitParser::new()));
        registry.register(Arc::new(RobotParser::new()));
        registry.register(Arc::new(OpenApiParser::new()));
        registry.register(Arc::new(CucumberParser::new()));

        registry
    }

    /// Register a parser for its format, replacing any previous one.
    pub fn register(&mut self, parser: Arc<dyn ReportParser>) {
        self.parsers.insert(parser.format(), parser);
    }

    pub fn parser(&self, format: ReportFormat) -> Option<Arc<dyn ReportParser>> {
        self.parsers.get(&format).cloned()
    }

    /// Parse every file matching `pattern`.
    ///
    /// Several JUnit files are merged into one transient report first; other
    /// formats are parsed file by file.
    pub fn parse(
        &self,
        format: ReportFormat,
        pattern: &str,
        options: &ParseOptions,
    ) -> Result<Vec<Suite>, ParseError> {
        let parser = self
            .parser(format)
            .ok_or_else(|| ParseError::Invalid(format!("No parser registered for {format}")))?;
        let files = resolve_report_files(pattern)?;

        if format == ReportFormat::JUnit && files.len() > 1 {
            info!("Found {} {} reports, merging.", files.len(), parser.format_name());
            let merged = merge_junit_reports(&files, &options.work_dir)?;
            return parser.parse_file(merged.path(), options);
        }

        let mut suites = Vec::new();
        for file in &files {
            suites.extend(parser.parse_file(file, options)?);
        }
        Ok(suites)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MERGED_REPORT_NAME;
    use tempfile::TempDir;

    #[test]
    fn test_registry_has_all_parsers() {
        let registry = ParserRegistry::new();
        for format in [
            ReportFormat::JUnit,
            ReportFormat::Robot,
            ReportFormat::OpenApi,
            ReportFormat::Cucumber,
        ] {
            assert_eq!(registry.parser(format).unwrap().format(), format);
        }
    }

    #[test]
    fn test_parse_merges_junit_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("one.xml"),
            r#"<testsuite name="One"><testcase classname="c" name="a"/></testsuite>"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("two.xml"),
            r#"<testsuite name="Two"><testcase classname="c" name="b"/></testsuite>"#,
        )
        .unwrap();

        let options = ParseOptions {
            suite_name: Some("Merged".into()),
            work_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let pattern = format!("{}/*.xml", dir.path().display());
        let suites = ParserRegistry::new()
            .parse(ReportFormat::JUnit, &pattern, &options)
            .unwrap();

        assert_eq!(suites.len(), 1);
        assert_eq!(suites[0].name, "Merged");
        assert_eq!(suites[0].sections.len(), 2);
        assert!(!dir.path().join(MERGED_REPORT_NAME).exists());
    }
}
