//! Profile definitions and their alert rules.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use lims_types::NonEmptyText;

use crate::component::ProfileComponent;
use crate::placeholder::formula_placeholders;
use crate::{ProfileError, ProfileResult};

/// What the calling UI should do with a fired alert.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    /// Non-blocking notification (toast).
    #[default]
    Notify,
    /// Critical (panic) value notification. Still non-blocking.
    Critical,
}

/// A threshold/equality rule evaluated against the current values.
///
/// `trigger` has the form `{key} <op> literal`, for example `{hb} < 7` or
/// `{urine_sugar} != 'Nil'`. Parsing happens at evaluation time in `lims-core`; a trigger
/// that does not parse simply never fires.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub trigger: String,
    #[serde(default)]
    pub action: AlertAction,
    pub message: String,
}

/// A named, ordered schema of lab-test parameters.
///
/// Constructed only through [`ProfileDefinition::new`], which enforces:
/// - keys are unique across keyed components
/// - dropdowns have at least one option
/// - calculated components have a non-empty formula
/// - every formula placeholder names a component of this profile
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProfileDefinition {
    profile_id: NonEmptyText,
    name: NonEmptyText,
    components: Vec<ProfileComponent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    alerts: Vec<AlertRule>,
}

impl ProfileDefinition {
    pub fn new(
        profile_id: NonEmptyText,
        name: NonEmptyText,
        components: Vec<ProfileComponent>,
        alerts: Vec<AlertRule>,
    ) -> ProfileResult<Self> {
        let mut keys = BTreeSet::new();
        for component in &components {
            if let Some(key) = component.key() {
                if !keys.insert(key) {
                    return Err(ProfileError::Translation(format!(
                        "profile '{}' has duplicate component key '{}'",
                        profile_id, key
                    )));
                }
            }
        }

        for component in &components {
            match component {
                ProfileComponent::Dropdown { field, options } if options.is_empty() => {
                    return Err(ProfileError::Translation(format!(
                        "profile '{}': dropdown '{}' has no options",
                        profile_id, field.key
                    )));
                }
                ProfileComponent::Calculated { field, formula } => {
                    if formula.trim().is_empty() {
                        return Err(ProfileError::Translation(format!(
                            "profile '{}': calculated field '{}' has an empty formula",
                            profile_id, field.key
                        )));
                    }
                    if let Some(unknown) = formula_placeholders(formula)
                        .into_iter()
                        .find(|reference| !keys.contains(reference))
                    {
                        return Err(ProfileError::Translation(format!(
                            "profile '{}': formula of '{}' references unknown key '{}'",
                            profile_id, field.key, unknown
                        )));
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            profile_id,
            name,
            components,
            alerts,
        })
    }

    pub fn profile_id(&self) -> &str {
        self.profile_id.as_str()
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn components(&self) -> &[ProfileComponent] {
        &self.components
    }

    pub fn alerts(&self) -> &[AlertRule] {
        &self.alerts
    }

    pub fn component(&self, key: &str) -> Option<&ProfileComponent> {
        self.components.iter().find(|c| c.key() == Some(key))
    }

    /// Calculated components in profile order.
    pub fn calculated(&self) -> impl Iterator<Item = &ProfileComponent> {
        self.components.iter().filter(|c| c.is_calculated())
    }

    /// Keys of calculated components that take part in a dependency cycle.
    ///
    /// Cycles are permitted to load; recomputation bounds its passes instead. This is used
    /// to report such profiles when a registry is built.
    pub fn cyclic_keys(&self) -> Vec<&str> {
        let graph: BTreeMap<&str, Vec<&str>> = self
            .calculated()
            .filter_map(|c| Some((c.key()?, formula_placeholders(c.formula()?))))
            .collect();

        graph
            .keys()
            .copied()
            .filter(|start| {
                let mut stack: Vec<&str> = graph[start].clone();
                let mut seen = BTreeSet::new();
                while let Some(next) = stack.pop() {
                    if next == *start {
                        return true;
                    }
                    if seen.insert(next) {
                        if let Some(deps) = graph.get(next) {
                            stack.extend(deps.iter().copied());
                        }
                    }
                }
                false
            })
            .collect()
    }
}
