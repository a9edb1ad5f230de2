//! A data-entry session: one technician filling in one order's result for one profile.

use serde::Serialize;

use profiles::{Field, NonEmptyText, ProfileComponent, ProfileDefinition};

use crate::alerts::FiredAlert;
use crate::constants::{FREE_TEXT_KEY, FREE_TEXT_PROFILE_ID};
use crate::range::{self, RangeFlag};
use crate::reactor::{Reaction, Reactor, RecomputeMode};
use crate::results::{self, StoredResult};
use crate::value::{FieldValue, ValueMap};
use crate::{LimsError, LimsResult};

/// How a component is presented for input.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Widget {
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Text,
    TextArea,
    Dropdown {
        options: Vec<String>,
    },
    Calculated {
        formula: String,
    },
    Header,
}

/// One row of the rendered entry form.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FormField {
    /// `None` for section headers.
    pub key: Option<String>,
    pub label: String,
    pub unit: Option<String>,
    pub widget: Widget,
    pub value: Option<FieldValue>,
    pub reference_range: Option<String>,
    pub flag: Option<RangeFlag>,
    pub editable: bool,
}

impl FormField {
    fn new(component: &ProfileComponent, values: &ValueMap) -> Self {
        let widget = match component {
            ProfileComponent::Number(field) => Widget::Number {
                min: field.validation.as_ref().and_then(|v| v.min),
                max: field.validation.as_ref().and_then(|v| v.max),
            },
            ProfileComponent::Text(_) => Widget::Text,
            ProfileComponent::TextArea(_) => Widget::TextArea,
            ProfileComponent::Dropdown { options, .. } => Widget::Dropdown {
                options: options.clone(),
            },
            ProfileComponent::Calculated { formula, .. } => Widget::Calculated {
                formula: formula.clone(),
            },
            ProfileComponent::Header { .. } => Widget::Header,
        };

        let value = component.key().and_then(|k| values.get(k)).cloned();
        let validation = component.validation();
        let flag = validation
            .zip(value.as_ref())
            .and_then(|(validation, value)| range::flag(validation, value));

        Self {
            key: component.key().map(str::to_owned),
            label: component.label().to_owned(),
            unit: component.unit().map(str::to_owned),
            widget,
            value,
            reference_range: validation.and_then(|v| v.reference_range.clone()),
            flag,
            editable: component.is_editable(),
        }
    }
}

/// Build the form for `profile` showing `values`.
pub fn form_fields(profile: &ProfileDefinition, values: &ValueMap) -> Vec<FormField> {
    profile
        .components()
        .iter()
        .map(|component| FormField::new(component, values))
        .collect()
}

/// The entry profile for tests that have no structured profile: one free-text result.
pub fn free_text_profile() -> LimsResult<ProfileDefinition> {
    let text = |s: &str| NonEmptyText::new(s).map_err(|e| LimsError::InvalidInput(e.to_string()));
    Ok(ProfileDefinition::new(
        text(FREE_TEXT_PROFILE_ID)?,
        text("Free-text result")?,
        vec![ProfileComponent::TextArea(Field::plain(
            text(FREE_TEXT_KEY)?,
            "Result",
        ))],
        Vec::new(),
    )?)
}

/// Owns the value map for one result while it is being entered.
#[derive(Clone, Debug)]
pub struct Session<'p> {
    profile: &'p ProfileDefinition,
    reactor: Reactor,
    values: ValueMap,
    legacy: Option<String>,
    alerts: Vec<FiredAlert>,
    free_text: bool,
}

impl<'p> Session<'p> {
    /// Open a session seeded from the persisted result string.
    ///
    /// Calculated fields are recomputed immediately so values stored by an older profile
    /// revision are brought up to date. A legacy free-text result is kept unchanged.
    pub fn open(profile: &'p ProfileDefinition, stored_result: &str, mode: RecomputeMode) -> Self {
        let reactor = Reactor::new(mode);
        let stored = results::deserialize(stored_result);
        let legacy = match &stored {
            StoredResult::Legacy(text) => Some(text.clone()),
            StoredResult::Empty | StoredResult::Structured(_) => None,
        };

        let reaction = reactor.recompute_all(profile, stored.into_values());
        Self {
            profile,
            reactor,
            values: reaction.values,
            legacy,
            alerts: reaction.alerts,
            free_text: false,
        }
    }

    /// Open a free-text entry on `profile` (see [`free_text_profile`]).
    ///
    /// Whatever was stored, structured or not, becomes the text of the single result field,
    /// and [`save`](Self::save) writes that text back as-is.
    pub fn free_text(profile: &'p ProfileDefinition, stored_result: &str) -> Self {
        let mut values = ValueMap::new();
        values.insert(FREE_TEXT_KEY, FieldValue::Text(stored_result.to_owned()));
        Self {
            profile,
            reactor: Reactor::default(),
            values,
            legacy: None,
            alerts: Vec::new(),
            free_text: true,
        }
    }

    pub fn is_free_text(&self) -> bool {
        self.free_text
    }

    pub fn profile(&self) -> &ProfileDefinition {
        self.profile
    }

    pub fn values(&self) -> &ValueMap {
        &self.values
    }

    /// The free-text result this session was opened on, if it predates structured entry.
    pub fn legacy(&self) -> Option<&str> {
        self.legacy.as_deref()
    }

    /// Start structured entry over a legacy result, discarding the legacy text on save.
    pub fn replace_legacy(&mut self) {
        if self.legacy.take().is_some() {
            tracing::info!(profile = self.profile.profile_id(), "replacing legacy result");
        }
    }

    /// Apply one edit.
    ///
    /// Numeric text entered into a number field is stored as a number. A session opened on a
    /// legacy result is read-only until [`replace_legacy`](Self::replace_legacy) is called,
    /// and a free-text session only accepts its result field; other edits are ignored.
    pub fn set(&mut self, key: &str, value: FieldValue) -> Reaction {
        if self.legacy.is_some() || (self.free_text && key != FREE_TEXT_KEY) {
            tracing::warn!(
                profile = self.profile.profile_id(),
                key,
                legacy = self.legacy.is_some(),
                "ignoring edit to read-only result"
            );
            return Reaction {
                values: self.values.clone(),
                alerts: self.alerts.clone(),
                ..Reaction::default()
            };
        }

        let value = match self.profile.component(key) {
            Some(component) => value.coerce_for(component),
            None => value,
        };

        let values = std::mem::take(&mut self.values);
        let reaction = self
            .reactor
            .react_to_change(self.profile, values, key, value);
        self.values = reaction.values.clone();
        self.alerts = reaction.alerts.clone();
        reaction
    }

    pub fn form(&self) -> Vec<FormField> {
        form_fields(self.profile, &self.values)
    }

    pub fn alerts(&self) -> &[FiredAlert] {
        &self.alerts
    }

    /// Serialize the current values for persistence.
    ///
    /// Alerts never block saving. A legacy result is returned unchanged, and a free-text
    /// entry is saved as its plain text.
    pub fn save(&self) -> LimsResult<String> {
        if let Some(text) = &self.legacy {
            return Ok(text.clone());
        }
        if self.free_text {
            return Ok(self
                .values
                .get(FREE_TEXT_KEY)
                .map(FieldValue::display)
                .unwrap_or_default());
        }
        results::serialize(&self.values)
    }
}
