//! Wire models for profile documents and their translation to domain types.
//!
//! Wire structs mirror the on-disk/on-the-wire shape exactly. Translation enforces what the
//! flat shape cannot: which attributes each `input_type` may carry, non-empty keys, and the
//! profile invariants checked by [`ProfileDefinition::new`].

use serde::de::DeserializeOwned;
use serde::Deserialize;

use lims_types::NonEmptyText;

use crate::component::{Field, InputType, ProfileComponent, Validation};
use crate::custom_test::{CustomTestDefinition, InputSchemaEntry};
use crate::profile::{AlertRule, ProfileDefinition};
use crate::{ProfileError, ProfileResult};

// ============================================================================
// Wire types
// ============================================================================

/// A built-in catalog profile document.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ProfileWire {
    pub profile_id: String,
    pub name: String,
    pub components: Vec<ComponentWire>,
    #[serde(default)]
    pub alerts: Vec<AlertRule>,
}

/// Flat component shape shared by catalog profiles and structured custom tests.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ComponentWire {
    pub input_type: InputType,
    #[serde(default)]
    pub key: Option<String>,
    pub label: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub validation: Option<Validation>,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct ReportConfigWire {
    pub components: Vec<ComponentWire>,
}

/// A tenant custom test document. Unknown keys are ignored.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct CustomTestWire {
    pub test_id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub report_config: Option<ReportConfigWire>,
    #[serde(default)]
    pub html_template: Option<String>,
    #[serde(default)]
    pub input_schema: Vec<InputSchemaEntry>,
}

// ============================================================================
// Parsing helpers
// ============================================================================

fn schema_mismatch<E: std::fmt::Display>(what: &str, err: serde_path_to_error::Error<E>) -> ProfileError {
    let path = err.path().to_string();
    let source = err.into_inner();
    let path = if path.is_empty() || path == "." {
        "<root>"
    } else {
        path.as_str()
    };
    ProfileError::Translation(format!("{what} schema mismatch at {path}: {source}"))
}

/// Deserialize YAML, surfacing the path to the failing field.
pub(crate) fn from_yaml<T: DeserializeOwned>(yaml_text: &str, what: &str) -> ProfileResult<T> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
    serde_path_to_error::deserialize(deserializer).map_err(|err| schema_mismatch(what, err))
}

/// Deserialize JSON, surfacing the path to the failing field.
pub(crate) fn from_json<T: DeserializeOwned>(json_text: &str, what: &str) -> ProfileResult<T> {
    let mut deserializer = serde_json::Deserializer::from_str(json_text);
    let value =
        serde_path_to_error::deserialize(&mut deserializer).map_err(|err| schema_mismatch(what, err))?;
    deserializer.end()?;
    Ok(value)
}

/// Deserialize an already-parsed JSON value, surfacing the path to the failing field.
pub(crate) fn from_json_value<T: DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> ProfileResult<T> {
    serde_path_to_error::deserialize(value).map_err(|err| schema_mismatch(what, err))
}

// ============================================================================
// Wire -> domain
// ============================================================================

fn non_empty(value: &str, what: &str) -> ProfileResult<NonEmptyText> {
    NonEmptyText::new(value).map_err(|_| ProfileError::Translation(format!("{what} cannot be empty")))
}

pub(crate) fn component_to_domain(wire: ComponentWire) -> ProfileResult<ProfileComponent> {
    let ComponentWire {
        input_type,
        key,
        label,
        unit,
        options,
        formula,
        validation,
    } = wire;

    if options.is_some() && input_type != InputType::Dropdown {
        return Err(ProfileError::Translation(format!(
            "'{label}': options are only allowed on dropdown components, not {input_type}"
        )));
    }
    if formula.is_some() && input_type != InputType::Calculated {
        return Err(ProfileError::Translation(format!(
            "'{label}': formula is only allowed on calculated components, not {input_type}"
        )));
    }

    let keyed = |label: String| -> ProfileResult<Field> {
        let key = key.as_deref().ok_or_else(|| {
            ProfileError::Translation(format!("{input_type} component '{label}' is missing a key"))
        })?;
        Ok(Field {
            key: non_empty(key, "component key")?,
            label,
            unit: unit.clone(),
            validation: validation.clone(),
        })
    };

    Ok(match input_type {
        InputType::Header => {
            if key.is_some() || unit.is_some() || validation.is_some() {
                return Err(ProfileError::Translation(format!(
                    "header '{label}' must not carry a key, unit or validation"
                )));
            }
            ProfileComponent::Header { label }
        }
        InputType::Number => ProfileComponent::Number(keyed(label)?),
        InputType::Text => ProfileComponent::Text(keyed(label)?),
        InputType::TextArea => ProfileComponent::TextArea(keyed(label)?),
        InputType::Dropdown => ProfileComponent::Dropdown {
            field: keyed(label)?,
            options: options.unwrap_or_default(),
        },
        InputType::Calculated => ProfileComponent::Calculated {
            field: keyed(label)?,
            formula: formula.unwrap_or_default(),
        },
    })
}

fn components_to_domain(wires: Vec<ComponentWire>) -> ProfileResult<Vec<ProfileComponent>> {
    wires.into_iter().map(component_to_domain).collect()
}

pub(crate) fn profile_to_domain(wire: ProfileWire) -> ProfileResult<ProfileDefinition> {
    ProfileDefinition::new(
        non_empty(&wire.profile_id, "profile_id")?,
        non_empty(&wire.name, "profile name")?,
        components_to_domain(wire.components)?,
        wire.alerts,
    )
}

pub(crate) fn custom_test_to_domain(wire: CustomTestWire) -> ProfileResult<CustomTestDefinition> {
    let test_id = non_empty(&wire.test_id, "test_id")?;

    let components = wire
        .report_config
        .map(|config| components_to_domain(config.components))
        .transpose()?;

    let html_template = wire.html_template.filter(|t| !t.trim().is_empty());

    if components.is_none() && html_template.is_none() && wire.input_schema.is_empty() {
        return Err(ProfileError::Translation(format!(
            "custom test '{test_id}' must define report_config, html_template or input_schema"
        )));
    }

    Ok(CustomTestDefinition {
        name: non_empty(&wire.name, "custom test name")?,
        code: wire
            .code
            .as_deref()
            .and_then(|c| NonEmptyText::new(c).ok()),
        test_id,
        components,
        html_template,
        input_schema: wire.input_schema,
    })
}
