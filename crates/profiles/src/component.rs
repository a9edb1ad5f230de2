//! Profile components: the individual fields of a test profile.
//!
//! A component is one of a closed set of kinds. Input kinds are edited by the technician,
//! `Calculated` components are derived from other keys through a formula, and `Header`
//! components are keyless section labels.

use serde::{Deserialize, Serialize};

use lims_types::NonEmptyText;

/// Discriminant of a [`ProfileComponent`], as it appears in the `input_type` wire field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Number,
    Text,
    TextArea,
    Dropdown,
    Calculated,
    Header,
}

impl InputType {
    pub fn as_str(self) -> &'static str {
        match self {
            InputType::Number => "number",
            InputType::Text => "text",
            InputType::TextArea => "text_area",
            InputType::Dropdown => "dropdown",
            InputType::Calculated => "calculated",
            InputType::Header => "header",
        }
    }
}

impl std::fmt::Display for InputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference range and panic thresholds for a numeric field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Validation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Human-readable range shown next to the field, e.g. `"13.0 - 17.0"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panic_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panic_high: Option<f64>,
}

/// Attributes shared by every keyed component.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Field {
    pub key: NonEmptyText,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
}

impl Field {
    /// A field with only a key and label, used for template-derived components.
    pub fn plain(key: NonEmptyText, label: impl Into<String>) -> Self {
        Self {
            key,
            label: label.into(),
            unit: None,
            validation: None,
        }
    }
}

/// One field within a profile.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "input_type", rename_all = "snake_case")]
pub enum ProfileComponent {
    Number(Field),
    Text(Field),
    TextArea(Field),
    Dropdown {
        #[serde(flatten)]
        field: Field,
        options: Vec<String>,
    },
    Calculated {
        #[serde(flatten)]
        field: Field,
        formula: String,
    },
    Header {
        label: String,
    },
}

impl ProfileComponent {
    pub fn input_type(&self) -> InputType {
        match self {
            ProfileComponent::Number(_) => InputType::Number,
            ProfileComponent::Text(_) => InputType::Text,
            ProfileComponent::TextArea(_) => InputType::TextArea,
            ProfileComponent::Dropdown { .. } => InputType::Dropdown,
            ProfileComponent::Calculated { .. } => InputType::Calculated,
            ProfileComponent::Header { .. } => InputType::Header,
        }
    }

    /// The keyed attributes of this component; `None` for headers.
    pub fn field(&self) -> Option<&Field> {
        match self {
            ProfileComponent::Number(field)
            | ProfileComponent::Text(field)
            | ProfileComponent::TextArea(field)
            | ProfileComponent::Dropdown { field, .. }
            | ProfileComponent::Calculated { field, .. } => Some(field),
            ProfileComponent::Header { .. } => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.field().map(|f| f.key.as_str())
    }

    pub fn label(&self) -> &str {
        match self {
            ProfileComponent::Header { label } => label,
            other => other.field().map(|f| f.label.as_str()).unwrap_or_default(),
        }
    }

    pub fn unit(&self) -> Option<&str> {
        self.field().and_then(|f| f.unit.as_deref())
    }

    pub fn validation(&self) -> Option<&Validation> {
        self.field().and_then(|f| f.validation.as_ref())
    }

    /// The formula of a calculated component.
    pub fn formula(&self) -> Option<&str> {
        match self {
            ProfileComponent::Calculated { formula, .. } => Some(formula),
            _ => None,
        }
    }

    pub fn is_calculated(&self) -> bool {
        matches!(self, ProfileComponent::Calculated { .. })
    }

    /// Whether a technician may type into this component.
    pub fn is_editable(&self) -> bool {
        match self {
            ProfileComponent::Number(_)
            | ProfileComponent::Text(_)
            | ProfileComponent::TextArea(_)
            | ProfileComponent::Dropdown { .. } => true,
            ProfileComponent::Calculated { .. } | ProfileComponent::Header { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> NonEmptyText {
        NonEmptyText::new(k).expect("valid key")
    }

    #[test]
    fn header_has_no_key_and_is_not_editable() {
        let header = ProfileComponent::Header {
            label: "Differential Count".into(),
        };
        assert_eq!(header.key(), None);
        assert_eq!(header.label(), "Differential Count");
        assert!(!header.is_editable());
        assert_eq!(header.input_type(), InputType::Header);
    }

    #[test]
    fn calculated_exposes_formula_and_is_read_only() {
        let calc = ProfileComponent::Calculated {
            field: Field::plain(key("globulin"), "Globulin"),
            formula: "{total_protein} - {albumin}".into(),
        };
        assert_eq!(calc.key(), Some("globulin"));
        assert_eq!(calc.formula(), Some("{total_protein} - {albumin}"));
        assert!(calc.is_calculated());
        assert!(!calc.is_editable());
    }

    #[test]
    fn serializes_with_input_type_tag_and_flat_fields() {
        let dropdown = ProfileComponent::Dropdown {
            field: Field::plain(key("colour"), "Colour"),
            options: vec!["Pale Yellow".into(), "Amber".into()],
        };
        let json = serde_json::to_value(&dropdown).expect("serialize");
        assert_eq!(json["input_type"], "dropdown");
        assert_eq!(json["key"], "colour");
        assert_eq!(json["options"][1], "Amber");
        assert!(json.get("unit").is_none());
    }
}
