//! Report parsers turning test reports into [`Suite`](crate::model::Suite)s.
//!
//! ## Components
//!
//! - `ReportParser` trait - Common interface for all report formats
//! - `ParserRegistry` - Maps formats to parsers and expands input globs
//!
//! ## Supported Formats
//!
//! | Format | Input | Sections |
//! |--------|-------|----------|
//! | JUnit | XML | One per `<testsuite>` |
//! | Robot Framework | `output.xml` | One per suite with tests, dotted names |
//! | OpenAPI | YAML | One per first tag, plus `untagged` |
//! | Cucumber | JSON | One per feature with scenarios |

mod cucumber;
mod fields;
mod junit;
mod merge;
mod openapi;
mod registry;
mod robot;
mod traits;

pub use cucumber::CucumberParser;
pub use fields::resolve_fields;
pub use junit::JunitParser;
pub use merge::{merge_junit_reports, resolve_report_files, TransientInput};
pub use openapi::OpenApiParser;
pub use registry::ParserRegistry;
pub use robot::RobotParser;
pub use traits::{ReportFormat, ReportParser};

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use crate::config::{UploadConfig, MAX_TITLE_LENGTH};
use crate::matcher::MatcherKind;

/// Errors from reading a report.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid XML in {path}: {message}")]
    Xml { path: PathBuf, message: String },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),

    #[error("Invalid file pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("No report files match '{0}'")]
    NoFiles(String),
}

impl ParseError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ParseError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn xml(path: &Path, err: impl std::fmt::Display) -> Self {
        ParseError::Xml {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Settings that change how a report is read.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Decides where case IDs are read from.
    pub case_matcher: MatcherKind,
    /// Suite name used instead of the one found in the report.
    pub suite_name: Option<String>,
    /// Keep millisecond precision in elapsed times.
    pub allow_ms: bool,
    /// Directory the merged report of several JUnit files is written to.
    pub work_dir: PathBuf,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            case_matcher: MatcherKind::default(),
            suite_name: None,
            allow_ms: false,
            work_dir: PathBuf::from("."),
        }
    }
}

impl ParseOptions {
    pub fn from_config(upload: &UploadConfig) -> Self {
        Self {
            case_matcher: upload.case_matcher,
            suite_name: upload.suite_name.clone(),
            allow_ms: upload.allow_ms,
            ..Self::default()
        }
    }
}

/// Cap a title at the maximum length, keeping its trailing words.
pub fn trim_title(title: &str) -> String {
    let title = title.trim();
    let length = title.chars().count();
    if length <= MAX_TITLE_LENGTH {
        return title.to_string();
    }

    let mut kept: Vec<&str> = Vec::new();
    let mut used = 0;
    for word in title.split_whitespace().rev() {
        let added = word.chars().count() + usize::from(!kept.is_empty());
        if used + added > MAX_TITLE_LENGTH {
            break;
        }
        used += added;
        kept.push(word);
    }

    if kept.is_empty() {
        // A single word longer than the cap.
        return title.chars().skip(length - MAX_TITLE_LENGTH).collect();
    }
    kept.reverse();
    kept.join(" ")
}

/// Test name shapes carrying a case ID, with the separator joining what
/// surrounds the ID once it is removed.
const NAME_ID_PATTERNS: &[(&str, &str)] = &[
    // `[C123] Login`, `Login [C123]`, `module [C123] Login`
    (r"(?i)^(?P<before>.*?)\s*\[C(?P<id>\d+)\]\s*(?P<after>.*)$", " "),
    // `C123 Login`, `C123_login()`
    (r"(?i)^C(?P<id>\d+)[ _](?P<after>.+)$", " "),
    // `Login C123`, `login_C123`, `login_C123(param)`
    (r"(?i)^(?P<before>.+?)[ _]C(?P<id>\d+)(?:\(.*\))?$", " "),
    // `module_C123_login`
    (r"(?i)^(?P<before>.+?)_C(?P<id>\d+)_(?P<after>.+)$", "_"),
];

fn name_id_patterns() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        NAME_ID_PATTERNS
            .iter()
            .filter_map(|(pattern, separator)| Regex::new(pattern).ok().map(|re| (re, *separator)))
            .collect()
    })
}

/// Split a test name such as `[C123] Login` or `login_C123()` into its case
/// ID and the remaining title.
///
/// Names without a recognizable ID are returned unchanged.
pub fn parse_name_with_id(name: &str) -> (Option<i64>, String) {
    for (re, separator) in name_id_patterns() {
        let Some(caps) = re.captures(name) else {
            continue;
        };
        let Some(Ok(id)) = caps.name("id").map(|m| m.as_str().parse::<i64>()) else {
            continue;
        };
        let title: Vec<&str> = ["before", "after"]
            .into_iter()
            .filter_map(|group| caps.name(group))
            .map(|m| m.as_str().trim())
            .filter(|part| !part.is_empty())
            .collect();
        return (Some(id), title.join(separator));
    }
    (None, name.to_string())
}

/// Parse a comma separated list of case IDs such as `C1, c2, 3`.
pub fn parse_case_ids(value: &str) -> Result<Vec<i64>, ParseError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            let digits = id.trim_start_matches(['C', 'c']);
            digits
                .parse::<i64>()
                .map_err(|_| ParseError::Invalid(format!("Invalid case ID '{id}'")))
        })
        .collect()
}

/// Name of a suite read from `path` when neither the options nor the report give one.
pub(crate) fn default_suite_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
