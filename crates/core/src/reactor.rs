//! Recomputation of calculated fields after an edit.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use profiles::ProfileDefinition;

use crate::alerts::{check_alerts, FiredAlert};
use crate::formula::{self, Evaluation};
use crate::value::{FieldValue, ValueMap};
use crate::{LimsError, LimsResult};

/// How many recomputation passes run after an edit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeMode {
    /// One pass over calculated components in profile order. A calculated field that depends
    /// on one declared after it picks up the new value on the next edit.
    #[default]
    SinglePass,
    /// Repeat passes until nothing changes, bounded by the component count.
    Converge,
}

impl RecomputeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RecomputeMode::SinglePass => "single_pass",
            RecomputeMode::Converge => "converge",
        }
    }
}

impl fmt::Display for RecomputeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecomputeMode {
    type Err = LimsError;

    fn from_str(s: &str) -> LimsResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single_pass" | "single-pass" => Ok(RecomputeMode::SinglePass),
            "converge" => Ok(RecomputeMode::Converge),
            other => Err(LimsError::InvalidInput(format!(
                "unknown recompute mode '{other}' (expected single_pass or converge)"
            ))),
        }
    }
}

/// Outcome of applying one edit.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Reaction {
    pub values: ValueMap,
    /// Calculated keys whose stored value changed, in order of first change.
    pub recomputed: Vec<String>,
    /// Calculated keys that were still changing when the pass ceiling was reached. Their
    /// values have been cleared.
    pub unsettled: Vec<String>,
    pub alerts: Vec<FiredAlert>,
}

/// Applies edits to a value map and keeps calculated fields current.
#[derive(Clone, Copy, Debug, Default)]
pub struct Reactor {
    mode: RecomputeMode,
}

impl Reactor {
    pub fn new(mode: RecomputeMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> RecomputeMode {
        self.mode
    }

    /// Set `changed_key` to `new_value`, recompute calculated fields and re-run alerts.
    ///
    /// A blank `new_value` clears the key. Edits addressed to calculated components are
    /// ignored because those fields are never user editable.
    pub fn react_to_change(
        &self,
        profile: &ProfileDefinition,
        mut values: ValueMap,
        changed_key: &str,
        new_value: FieldValue,
    ) -> Reaction {
        if profile
            .component(changed_key)
            .is_some_and(|c| c.is_calculated())
        {
            tracing::debug!(
                profile = profile.profile_id(),
                key = changed_key,
                "ignoring edit to calculated field"
            );
        } else {
            values.insert(changed_key, new_value);
        }

        self.recompute_all(profile, values)
    }

    /// Recompute every calculated field without applying an edit.
    pub fn recompute_all(&self, profile: &ProfileDefinition, mut values: ValueMap) -> Reaction {
        let mut recomputed: Vec<String> = Vec::new();
        let mut unsettled = Vec::new();

        match self.mode {
            RecomputeMode::SinglePass => {
                recomputed = run_pass(profile, &mut values);
            }
            RecomputeMode::Converge => {
                // One pass more than the component count so the longest acyclic chain still
                // gets a confirming pass with no changes.
                let ceiling = profile.components().len() + 1;
                let mut changed = Vec::new();
                for _ in 0..ceiling {
                    changed = run_pass(profile, &mut values);
                    for key in &changed {
                        if !recomputed.contains(key) {
                            recomputed.push(key.clone());
                        }
                    }
                    if changed.is_empty() {
                        break;
                    }
                }

                if !changed.is_empty() {
                    tracing::warn!(
                        profile = profile.profile_id(),
                        keys = ?changed,
                        "calculated fields did not settle; clearing them"
                    );
                    for key in &changed {
                        values.remove(key);
                    }
                    unsettled = changed;
                }
            }
        }

        let alerts = check_alerts(profile, &values);
        Reaction {
            values,
            recomputed,
            unsettled,
            alerts,
        }
    }
}

/// One pass over calculated components in profile order. Returns the keys that changed.
fn run_pass(profile: &ProfileDefinition, values: &mut ValueMap) -> Vec<String> {
    let mut changed = Vec::new();

    for component in profile.calculated() {
        let (Some(key), Some(formula_text)) = (component.key(), component.formula()) else {
            continue;
        };

        match formula::evaluate(formula_text, values) {
            Evaluation::Ready(result) => {
                let next = FieldValue::Number(result);
                if values.get(key) != Some(&next) {
                    values.insert(key, next);
                    changed.push(key.to_owned());
                }
            }
            Evaluation::NotReady(reason) => {
                tracing::debug!(
                    profile = profile.profile_id(),
                    key,
                    %reason,
                    "calculated field not ready"
                );
            }
        }
    }

    changed
}
