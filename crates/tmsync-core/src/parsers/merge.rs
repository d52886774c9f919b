//! Expansion of report globs and merging of several JUnit files.

use roxmltree::Document;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::ParseError;
use crate::config::MERGED_REPORT_NAME;

/// Files matching `pattern`, sorted.
pub fn resolve_report_files(pattern: &str) -> Result<Vec<PathBuf>, ParseError> {
    let entries = glob::glob(pattern).map_err(|e| ParseError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(ParseError::NoFiles(pattern.to_string()));
    }
    Ok(files)
}

/// A file written for the duration of a parse and removed when dropped.
#[derive(Debug)]
pub struct TransientInput {
    path: PathBuf,
}

impl TransientInput {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientInput {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed merged report"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {e}", self.path.display()),
        }
    }
}

/// Combine the test suites of `files` under one `<testsuites>` root in `work_dir`.
pub fn merge_junit_reports(files: &[PathBuf], work_dir: &Path) -> Result<TransientInput, ParseError> {
    let mut merged = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuites>\n");

    for file in files {
        let content = std::fs::read_to_string(file).map_err(|e| ParseError::io(file, e))?;
        let doc = Document::parse(&content).map_err(|e| ParseError::xml(file, e))?;
        let root = doc.root_element();
        match root.tag_name().name() {
            "testsuites" => {
                for suite in root.children().filter(|n| n.has_tag_name("testsuite")) {
                    merged.push_str(&content[suite.range()]);
                    merged.push('\n');
                }
            }
            "testsuite" => {
                merged.push_str(&content[root.range()]);
                merged.push('\n');
            }
            other => {
                return Err(ParseError::xml(
                    file,
                    format!("unexpected root element <{other}>"),
                ))
            }
        }
    }
    merged.push_str("</testsuites>\n");

    let path = work_dir.join(MERGED_REPORT_NAME);
    std::fs::write(&path, merged).map_err(|e| ParseError::io(&path, e))?;
    Ok(TransientInput { path })
}
