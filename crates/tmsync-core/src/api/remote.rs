//! Records as the service returns them.

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProject {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub suite_mode: i64,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSuite {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub suite_id: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCase {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub section_id: Option<i64>,
    #[serde(default)]
    pub suite_id: Option<i64>,
    /// Every other field, including custom ones.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RemoteCase {
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTest {
    pub id: i64,
    pub case_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteResult {
    pub id: i64,
    pub test_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRun {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub suite_id: Option<i64>,
    #[serde(default)]
    pub plan_id: Option<i64>,
    #[serde(default)]
    pub config_ids: Vec<i64>,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemotePlan {
    pub id: i64,
    #[serde(default)]
    pub entries: Vec<PlanEntry>,
}

impl RemotePlan {
    /// ID of the plan entry holding run `run_id`.
    pub fn entry_for_run(&self, run_id: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.runs.iter().any(|run| run.id == run_id))
            .map(|entry| entry.id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanEntry {
    pub id: String,
    #[serde(default)]
    pub runs: Vec<PlanRun>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanRun {
    pub id: i64,
    #[serde(default)]
    pub entry_id: Option<String>,
}

/// A custom case field definition.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseField {
    pub system_name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub configs: Vec<FieldConfig>,
}

impl CaseField {
    /// Whether the field can be used in `project_id`.
    ///
    /// A field without configurations applies everywhere; otherwise one of
    /// its contexts must be global or name the project.
    pub fn applies_to(&self, project_id: i64) -> bool {
        self.configs.is_empty()
            || self.configs.iter().any(|config| {
                config.context.is_global || config.context.project_ids.contains(&project_id)
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    pub context: FieldContext,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldContext {
    #[serde(default)]
    pub is_global: bool,
    #[serde(default, deserialize_with = "nullable_ids")]
    pub project_ids: Vec<i64>,
}

fn nullable_ids<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<i64>>::deserialize(deserializer)?.unwrap_or_default())
}
