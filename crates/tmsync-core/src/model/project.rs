use serde::Serialize;

/// How a project organizes its suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteMode {
    /// Exactly one suite.
    SingleSuite,
    /// One suite plus baselines.
    SingleSuiteBaselines,
    /// Any number of suites.
    MultipleSuites,
}

impl SuiteMode {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(SuiteMode::SingleSuite),
            2 => Some(SuiteMode::SingleSuiteBaselines),
            3 => Some(SuiteMode::MultipleSuites),
            _ => None,
        }
    }
}

/// A resolved remote project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectData {
    pub id: i64,
    pub name: String,
    pub suite_mode: SuiteMode,
}

/// Body of a run create or update request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignedto_id: Option<i64>,
    pub include_all: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub case_ids: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Unix timestamp.
    pub start_on: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_on: Option<i64>,
}

impl RunSpec {
    /// Add case IDs, keeping the list sorted and free of duplicates.
    pub fn merge_case_ids(&mut self, ids: impl IntoIterator<Item = i64>) {
        self.case_ids.extend(ids);
        self.case_ids.sort_unstable();
        self.case_ids.dedup();
    }
}
