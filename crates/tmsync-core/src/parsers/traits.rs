//! Common interface of report parsers.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::{ParseError, ParseOptions};
use crate::model::Suite;

/// Report formats understood by the parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportFormat {
    JUnit,
    Robot,
    OpenApi,
    Cucumber,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JUnit => write!(f, "junit"),
            Self::Robot => write!(f, "robot"),
            Self::OpenApi => write!(f, "openapi"),
            Self::Cucumber => write!(f, "cucumber"),
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "junit" => Ok(Self::JUnit),
            "robot" => Ok(Self::Robot),
            "openapi" => Ok(Self::OpenApi),
            "cucumber" => Ok(Self::Cucumber),
            other => Err(format!("unknown report format '{other}'")),
        }
    }
}

/// Reads one report file into suites.
///
/// Implementations are stateless: the same file and options always give
/// the same suites.
pub trait ReportParser: Send + Sync {
    /// Parse the report at `path`.
    fn parse_file(&self, path: &Path, options: &ParseOptions) -> Result<Vec<Suite>, ParseError>;

    /// Format handled by this parser.
    fn format(&self) -> ReportFormat;

    /// Human-readable format name used in logs.
    fn format_name(&self) -> &'static str;
}
