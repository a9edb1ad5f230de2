//! Request and response bodies for the REST API.
//!
//! Engine types (`FormField`, `FiredAlert`, `ValueMap`, ...) are embedded directly and
//! documented as free-form objects in the OpenAPI schema.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use lims_core::{FieldValue, FiredAlert, FormField, ProfileDefinition, ValueMap};
use profiles::InputSchemaEntry;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProfileSummary {
    pub profile_id: String,
    pub name: String,
    /// Number of components, headers included.
    pub components: usize,
}

impl From<&ProfileDefinition> for ProfileSummary {
    fn from(profile: &ProfileDefinition) -> Self {
        Self {
            profile_id: profile.profile_id().to_owned(),
            name: profile.name().to_owned(),
            components: profile.components().len(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListProfilesRes {
    pub profiles: Vec<ProfileSummary>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ProfileRes {
    #[schema(value_type = Object)]
    pub profile: ProfileDefinition,
    /// True when the test has no structured profile and is entered as one free-text field.
    pub free_text: bool,
    /// The empty entry form for this profile.
    #[schema(value_type = Vec<Object>)]
    pub form: Vec<FormField>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ResolveProfileReq {
    pub test_name: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct EntryChangeReq {
    pub test_name: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// The persisted result string the session starts from. Empty for a new result.
    #[serde(default)]
    pub stored_result: String,
    pub changed_key: String,
    /// Number or string. `null` or an empty string clears the field.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub new_value: Option<FieldValue>,
    /// Discard a legacy free-text result and start structured entry over it.
    #[serde(default)]
    pub replace_legacy: bool,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct EntryChangeRes {
    /// The serialized result to persist.
    pub result_value: String,
    pub free_text: bool,
    /// The read-only legacy result the edit was not applied to, if any.
    pub legacy: Option<String>,
    pub recomputed: Vec<String>,
    pub unsettled: Vec<String>,
    #[schema(value_type = Vec<Object>)]
    pub alerts: Vec<FiredAlert>,
    #[schema(value_type = Vec<Object>)]
    pub form: Vec<FormField>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct EvaluateFormulaReq {
    pub formula: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub values: ValueMap,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct EvaluateFormulaRes {
    pub ready: bool,
    pub value: Option<f64>,
    /// Why the formula could not be evaluated, when `ready` is false.
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct TemplateVariablesReq {
    pub html_template: String,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct TemplateVariablesRes {
    #[schema(value_type = Vec<Object>)]
    pub input_schema: Vec<InputSchemaEntry>,
}
