//! Local representation of a parsed report.
//!
//! A report becomes one or more [`Suite`]s holding a tree of [`Section`]s,
//! each with its [`Case`]s. Remote IDs start out unknown and are filled in
//! as the upload reconciles the tree with the service.

mod project;
mod result;

pub use project::{ProjectData, RunSpec, SuiteMode};
pub use result::{format_elapsed, parse_timespan, CaseResult, Status, StepResult};

use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// Position of a section in the tree: indices from the suite's top level down.
pub type SectionPath = Vec<usize>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Suite {
    pub name: String,
    pub suite_id: Option<i64>,
    pub description: Option<String>,
    pub sections: Vec<Section>,
    /// Report file the suite was parsed from.
    pub source: Option<String>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// All cases in depth-first order: a section's own cases, then its sub-sections.
    ///
    /// The position of a case in this order is its stable key for the
    /// duration of an upload.
    pub fn cases(&self) -> Vec<&Case> {
        fn collect<'a>(sections: &'a [Section], out: &mut Vec<&'a Case>) {
            for section in sections {
                out.extend(section.cases.iter());
                collect(&section.sub_sections, out);
            }
        }
        let mut out = Vec::new();
        collect(&self.sections, &mut out);
        out
    }

    /// Mutable counterpart of [`Suite::cases`], in the same order.
    pub fn cases_mut(&mut self) -> Vec<&mut Case> {
        fn collect<'a>(sections: &'a mut [Section], out: &mut Vec<&'a mut Case>) {
            for section in sections {
                let Section {
                    cases,
                    sub_sections,
                    ..
                } = section;
                out.extend(cases.iter_mut());
                collect(sub_sections, out);
            }
        }
        let mut out = Vec::new();
        collect(&mut self.sections, &mut out);
        out
    }

    pub fn section_mut(&mut self, path: &[usize]) -> Option<&mut Section> {
        let (first, rest) = path.split_first()?;
        let mut section = self.sections.get_mut(*first)?;
        for index in rest {
            section = section.sub_sections.get_mut(*index)?;
        }
        Some(section)
    }

    /// Copy every section's ID onto the cases it holds.
    ///
    /// Cases listed in `keep` retain their current section.
    pub fn propagate_section_ids(&mut self, keep: &[usize]) {
        fn walk(sections: &mut [Section], ordinal: &mut usize, keep: &HashSet<usize>) {
            for section in sections {
                for case in &mut section.cases {
                    if !keep.contains(ordinal) || case.section_id.is_none() {
                        case.section_id = section.section_id;
                    }
                    *ordinal += 1;
                }
                walk(&mut section.sub_sections, ordinal, keep);
            }
        }
        let keep: HashSet<usize> = keep.iter().copied().collect();
        let mut ordinal = 0;
        walk(&mut self.sections, &mut ordinal, &keep);
    }

    /// `name: value` lines for every property of the top-level sections.
    pub fn property_lines(&self) -> Vec<String> {
        self.sections
            .iter()
            .flat_map(|s| s.properties.iter().map(Property::description))
            .collect()
    }

    pub fn add_global_case_fields(&mut self, fields: &Map<String, Value>) {
        if fields.is_empty() {
            return;
        }
        for case in self.cases_mut() {
            case.add_global_fields(fields);
        }
    }

    pub fn add_global_result_fields(&mut self, fields: &Map<String, Value>) {
        if fields.is_empty() {
            return;
        }
        for case in self.cases_mut() {
            case.result.add_global_fields(fields);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    pub name: String,
    pub section_id: Option<i64>,
    /// Remote parent for a top-level section; nested sections take their parent from the tree.
    pub parent_id: Option<i64>,
    pub description: Option<String>,
    pub cases: Vec<Case>,
    pub sub_sections: Vec<Section>,
    pub properties: Vec<Property>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A report-level property, shown in the run description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn description(&self) -> String {
        format!("{}: {}", self.name, self.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Case {
    pub title: String,
    pub case_id: Option<i64>,
    pub section_id: Option<i64>,
    /// Stable identifier derived from the test's location in the report.
    pub automation_id: Option<String>,
    pub estimate: Option<String>,
    pub template_id: Option<i64>,
    pub type_id: Option<i64>,
    pub milestone_id: Option<i64>,
    pub refs: Option<String>,
    /// Custom case fields, serialized at the top level of the case body.
    pub case_fields: Map<String, Value>,
    pub result: CaseResult,
}

impl Case {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_automation_id(mut self, automation_id: impl Into<String>) -> Self {
        self.automation_id = Some(automation_id.into().trim().to_string());
        self
    }

    /// One independent copy of this case per remote ID.
    ///
    /// Used when a single report entry maps to several remote cases; every
    /// copy owns its own result so later mutation of one never shows in another.
    pub fn fan_out(&self, ids: &[i64]) -> Vec<Case> {
        ids.iter()
            .map(|id| {
                let mut case = self.clone();
                case.case_id = Some(*id);
                case
            })
            .collect()
    }

    /// Add global case fields without overriding the case's own fields.
    pub fn add_global_fields(&mut self, fields: &Map<String, Value>) {
        for (key, value) in fields {
            self.case_fields
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Request body for creating or updating this case.
    ///
    /// The automation ID is written under `automation_field` when one is known.
    pub fn to_body(&self, automation_field: Option<&str>) -> Value {
        let mut body = Map::new();
        body.insert("title".into(), json!(self.title));
        if let Some(section_id) = self.section_id {
            body.insert("section_id".into(), json!(section_id));
        }
        if let Some(estimate) = &self.estimate {
            body.insert("estimate".into(), json!(estimate));
        }
        let ids = [
            ("template_id", self.template_id),
            ("type_id", self.type_id),
            ("milestone_id", self.milestone_id),
        ];
        for (key, value) in ids {
            if let Some(value) = value {
                body.insert(key.into(), json!(value));
            }
        }
        if let Some(refs) = &self.refs {
            body.insert("refs".into(), json!(refs));
        }
        for (key, value) in &self.case_fields {
            body.insert(key.clone(), value.clone());
        }
        if let (Some(field), Some(automation_id)) = (automation_field, &self.automation_id) {
            body.insert(field.to_string(), json!(automation_id));
        }
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_suite() -> Suite {
        let mut root = Section::new("root");
        root.cases.push(Case::new("a"));
        let mut child = Section::new("child");
        child.cases.push(Case::new("b"));
        root.sub_sections.push(child);
        let mut other = Section::new("other");
        other.cases.push(Case::new("c"));
        let mut suite = Suite::new("suite");
        suite.sections = vec![root, other];
        suite
    }

    #[test]
    fn test_cases_depth_first() {
        let suite = sample_suite();
        let titles: Vec<_> = suite.cases().iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);

        let mut suite = suite;
        let titles: Vec<_> = suite.cases_mut().iter().map(|c| c.title.clone()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_propagate_section_ids() {
        let mut suite = sample_suite();
        suite.section_mut(&[0]).unwrap().section_id = Some(1);
        suite.section_mut(&[0, 0]).unwrap().section_id = Some(2);
        suite.section_mut(&[1]).unwrap().section_id = Some(3);
        suite.cases_mut()[2].section_id = Some(99);

        suite.propagate_section_ids(&[2]);

        let ids: Vec<_> = suite.cases().iter().map(|c| c.section_id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(99)]);
    }

    #[test]
    fn test_fan_out_copies_are_independent() {
        let mut case = Case::new("shared").with_automation_id("tests.shared");
        case.result = CaseResult::with_status(Status::Failed);
        case.result.elapsed = Some("3s".into());
        case.result.attachments.push("shot.png".into());
        case.result.steps.push(StepResult::new("open", Some(Status::Passed)));

        let mut copies = case.fan_out(&[10, 20, 30]);

        let ids: Vec<_> = copies.iter().map(|c| c.case_id).collect();
        assert_eq!(ids, vec![Some(10), Some(20), Some(30)]);
        for copy in &copies {
            assert_eq!(copy.title, "shared");
            assert_eq!(copy.automation_id.as_deref(), Some("tests.shared"));
            assert_eq!(copy.result, case.result);
        }

        copies[0].result.prepend_comment("only first");
        copies[0].result.status = Some(Status::Passed);
        copies[0].result.elapsed = None;
        copies[0].result.attachments.push("log.txt".into());
        copies[0].result.steps[0].status = Some(Status::Failed);

        assert_eq!(copies[1].result, case.result);
        assert_eq!(copies[2].result, case.result);
        assert_eq!(case.result.status, Some(Status::Failed));
        assert_eq!(case.result.elapsed.as_deref(), Some("3s"));
        assert_eq!(case.result.attachments, vec![PathBuf::from("shot.png")]);
        assert!(case.result.comment.is_none());
        assert_eq!(case.case_id, None);
    }

    #[test]
    fn test_case_body() {
        let mut case = Case::new("Login").with_automation_id(" tests.Login ");
        case.section_id = Some(4);
        case.case_fields.insert("custom_priority".into(), json!(2));
        let body = case.to_body(Some("custom_automation_id"));
        assert_eq!(body["title"], "Login");
        assert_eq!(body["section_id"], 4);
        assert_eq!(body["custom_priority"], 2);
        assert_eq!(body["custom_automation_id"], "tests.Login");
        assert!(case.to_body(None).get("custom_automation_id").is_none());
    }

    #[test]
    fn test_property_lines() {
        let mut suite = sample_suite();
        suite.sections[0].properties.push(Property::new("browser", "firefox"));
        assert_eq!(suite.property_lines(), vec!["browser: firefox".to_string()]);
    }
}
