//! Section reconciliation split into a pure diff and an apply step.

use std::collections::HashMap;
use tracing::info;

use super::{ReconcileError, Reconciler};
use crate::api::RemoteSection;
use crate::handlers::{NewSection, SectionHandler};
use crate::model::{Section, SectionPath, Suite};
use crate::rollback::RunState;

/// Where a missing section's parent comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRef {
    /// An existing remote section, or the suite root.
    Remote(Option<i64>),
    /// An earlier entry of [`SectionPlan::missing`].
    Planned(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSection {
    pub path: SectionPath,
    pub name: String,
    pub description: Option<String>,
    pub parent: ParentRef,
}

/// Sections to adopt and sections to create, the latter in pre-order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionPlan {
    pub adopted: Vec<(SectionPath, i64)>,
    pub missing: Vec<MissingSection>,
}

impl SectionPlan {
    pub fn has_missing(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Compare the local tree with the remote sections.
///
/// A local section matches a remote one with the same name under the same
/// parent. Top-level sections hang under their own `parent_id`, or
/// `root_parent` when they have none.
pub fn plan_sections(suite: &Suite, remote: &[RemoteSection], root_parent: Option<i64>) -> SectionPlan {
    /// Remote section ID by parent and name; the first listed wins.
    type RemoteIndex<'a> = HashMap<(Option<i64>, &'a str), i64>;

    fn walk(
        sections: &[Section],
        prefix: &[usize],
        parent: Option<ParentRef>,
        root_parent: Option<i64>,
        remote: &RemoteIndex<'_>,
        plan: &mut SectionPlan,
    ) {
        for (index, section) in sections.iter().enumerate() {
            let mut path = prefix.to_vec();
            path.push(index);
            let parent = parent.unwrap_or(ParentRef::Remote(section.parent_id.or(root_parent)));

            let existing = match parent {
                ParentRef::Remote(parent_id) => section
                    .section_id
                    .or_else(|| remote.get(&(parent_id, section.name.as_str())).copied()),
                // Nothing exists under a section that is yet to be created.
                ParentRef::Planned(_) => None,
            };

            let child_parent = match existing {
                Some(id) => {
                    plan.adopted.push((path.clone(), id));
                    ParentRef::Remote(Some(id))
                }
                None => {
                    plan.missing.push(MissingSection {
                        path: path.clone(),
                        name: section.name.clone(),
                        description: section.description.clone(),
                        parent,
                    });
                    ParentRef::Planned(plan.missing.len() - 1)
                }
            };
            walk(&section.sub_sections, &path, Some(child_parent), root_parent, remote, plan);
        }
    }

    let mut index = RemoteIndex::new();
    for section in remote {
        index.entry((section.parent_id, section.name.as_str())).or_insert(section.id);
    }
    let mut plan = SectionPlan::default();
    walk(&suite.sections, &[], None, root_parent, &index, &mut plan);
    plan
}

/// Create the missing sections of `plan`, parents before children.
///
/// Each created ID is recorded in `state` as soon as it exists. Returns the
/// remote ID of every section of the plan.
pub async fn apply_section_plan(
    handler: &dyn SectionHandler,
    project_id: i64,
    suite_id: i64,
    plan: &SectionPlan,
    state: &mut RunState,
) -> Result<Vec<(SectionPath, i64)>, ReconcileError> {
    let mut created: Vec<i64> = Vec::with_capacity(plan.missing.len());
    let mut ids = plan.adopted.clone();

    for missing in &plan.missing {
        let parent_id = match missing.parent {
            ParentRef::Remote(id) => id,
            // Pre-order puts every parent before its children.
            ParentRef::Planned(index) => created.get(index).copied(),
        };
        let section = NewSection {
            name: missing.name.clone(),
            suite_id,
            parent_id,
            description: missing.description.clone(),
        };
        let id = match handler.add_section(project_id, &section).await {
            Ok(id) => id,
            Err(source) => {
                state.created_section_ids.extend(source.created_id());
                handler.invalidate().await;
                return Err(ReconcileError::Create {
                    entity: "section",
                    source,
                });
            }
        };
        state.created_section_ids.push(id);
        created.push(id);
        ids.push((missing.path.clone(), id));
    }

    if !plan.missing.is_empty() {
        handler.invalidate().await;
    }
    Ok(ids)
}

impl Reconciler<'_> {
    /// Make every local section exist remotely and give cases their section IDs.
    ///
    /// Cases listed in `keep_sections` keep the section they already have remotely.
    pub async fn reconcile_sections(
        &self,
        project_id: i64,
        project_name: &str,
        suite_id: i64,
        suite: &mut Suite,
        root_parent: Option<i64>,
        keep_sections: &[usize],
        state: &mut RunState,
    ) -> Result<(), ReconcileError> {
        let remote = self.handlers.sections.sections(project_id, suite_id).await?;
        let plan = plan_sections(suite, &remote, root_parent);

        if plan.has_missing() {
            self.confirm(
                &format!("Sections missing in project '{project_name}'. Would you like to create them?"),
                "sections",
            )?;
            info!("Adding {} missing sections.", plan.missing.len());
        }

        let ids = apply_section_plan(
            self.handlers.sections.as_ref(),
            project_id,
            suite_id,
            &plan,
            state,
        )
        .await?;

        for (path, id) in ids {
            if let Some(section) = suite.section_mut(&path) {
                section.section_id = Some(id);
            }
        }
        suite.propagate_section_ids(keep_sections);
        Ok(())
    }
}
