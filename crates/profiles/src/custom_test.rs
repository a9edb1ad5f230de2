//! Tenant-authored (custom) test definitions.
//!
//! A lab either authors a custom test structurally (`report_config.components`, same shape as
//! a built-in profile component list) or as a rich-text HTML template containing
//! `{{Variable}}` placeholders, optionally with a stored `input_schema` derived from it.
//!
//! Custom test documents are produced by an external editor and may carry extra bookkeeping
//! fields, so unlike the built-in catalog their wire model tolerates unknown keys.

use serde::{Deserialize, Serialize};

use lims_types::NonEmptyText;

use crate::component::ProfileComponent;
use crate::wire::{self, CustomTestWire};
use crate::ProfileResult;

/// Kind of an `input_schema` entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaFieldType {
    #[default]
    Text,
    Number,
    TextArea,
}

/// One entry of a template-derived input schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchemaEntry {
    pub key: NonEmptyText,
    pub label: String,
    #[serde(rename = "type", default)]
    pub field_type: SchemaFieldType,
}

/// One entry of a tenant's custom test list, translated independently of its siblings.
#[derive(Debug)]
pub struct CustomTestEntry {
    /// The entry's `test_id` as written, or `#<index>` when it has none.
    pub id: String,
    pub test: ProfileResult<CustomTestDefinition>,
}

/// A custom test owned by one tenant.
#[derive(Clone, Debug, PartialEq)]
pub struct CustomTestDefinition {
    pub test_id: NonEmptyText,
    pub name: NonEmptyText,
    pub code: Option<NonEmptyText>,
    /// Structured components from `report_config`, if the test was authored structurally.
    pub components: Option<Vec<ProfileComponent>>,
    pub html_template: Option<String>,
    pub input_schema: Vec<InputSchemaEntry>,
}

impl CustomTestDefinition {
    /// Whether this definition answers to `test_name` (exact match on name or code).
    pub fn matches(&self, test_name: &str) -> bool {
        self.name.as_str() == test_name
            || self.code.as_ref().is_some_and(|c| c.as_str() == test_name)
    }

    /// Parse a JSON array of custom tests, keeping each entry's outcome separate.
    ///
    /// Only a document that is not a JSON array is an error; a malformed entry is reported
    /// in its own [`CustomTestEntry`] without affecting the rest of the list.
    pub fn parse_json_entries(json_text: &str) -> ProfileResult<Vec<CustomTestEntry>> {
        let values: Vec<serde_json::Value> = wire::from_json(json_text, "custom test list")?;

        Ok(values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let id = value
                    .get("test_id")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("#{index}"));
                let test = wire::from_json_value::<CustomTestWire>(value, "custom test")
                    .and_then(wire::custom_test_to_domain);
                CustomTestEntry { id, test }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProfileError;

    fn parse_one(json: &str) -> ProfileResult<CustomTestDefinition> {
        wire::from_json::<CustomTestWire>(json, "custom test").and_then(wire::custom_test_to_domain)
    }

    #[test]
    fn parses_template_only_test() {
        let json = r#"{
            "test_id": "t-100",
            "name": "Peripheral Smear",
            "code": "PS",
            "html_template": "<p>RBC: {{RBC Morphology}}</p>",
            "created_by": "editor"
        }"#;

        let test = parse_one(json).expect("parse custom test");
        assert_eq!(test.name.as_str(), "Peripheral Smear");
        assert!(test.components.is_none());
        assert!(test.input_schema.is_empty());
        assert!(test.matches("PS"));
        assert!(test.matches("Peripheral Smear"));
        assert!(!test.matches("peripheral smear"));
    }

    #[test]
    fn parses_structured_test() {
        let json = r#"{
            "test_id": "t-200",
            "name": "Thyroid Panel",
            "report_config": {
                "components": [
                    {"input_type": "header", "label": "Hormones"},
                    {"input_type": "number", "key": "tsh", "label": "TSH", "unit": "uIU/mL",
                     "validation": {"min": 0.4, "max": 4.0, "reference_range": "0.4 - 4.0"}},
                    {"input_type": "number", "key": "t4", "label": "Free T4", "unit": "ng/dL"}
                ]
            }
        }"#;

        let test = parse_one(json).expect("parse custom test");
        let components = test.components.expect("structured components");
        assert_eq!(components.len(), 3);
        assert_eq!(components[1].key(), Some("tsh"));
    }

    #[test]
    fn parses_stored_input_schema() {
        let json = r#"{
            "test_id": "t-300",
            "name": "Semen Analysis",
            "html_template": "<p>{{Volume}} {{Count}}</p>",
            "input_schema": [
                {"key": "Volume", "label": "Volume (mL)", "type": "number"},
                {"key": "Count", "label": "Count"}
            ]
        }"#;

        let test = parse_one(json).expect("parse custom test");
        assert_eq!(test.input_schema.len(), 2);
        assert_eq!(test.input_schema[0].field_type, SchemaFieldType::Number);
        assert_eq!(test.input_schema[1].field_type, SchemaFieldType::Text);
    }

    #[test]
    fn rejects_test_without_any_layout() {
        let json = r#"{"test_id": "t-400", "name": "Empty"}"#;
        let err = parse_one(json).expect_err("no layout");
        assert!(matches!(err, ProfileError::Translation(msg) if msg.contains("report_config")));
    }

    #[test]
    fn entries_are_translated_independently() {
        let json = r#"[
            {"test_id": "good", "name": "Good", "html_template": "{{x}}"},
            {"test_id": "bad", "name": "Bad", "report_config": {"components": [
                {"input_type": "number", "key": "x", "label": "X", "colour": "red"}
            ]}},
            {"name": "No Id", "html_template": "{{y}}"}
        ]"#;

        let entries = CustomTestDefinition::parse_json_entries(json).expect("array");
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["good", "bad", "#2"]);
        assert_eq!(
            entries[0].test.as_ref().map(|t| t.name.as_str()).ok(),
            Some("Good")
        );
        match &entries[1].test {
            Err(ProfileError::Translation(msg)) => assert!(msg.contains("colour"), "{msg}"),
            other => panic!("expected Translation error, got {other:?}"),
        }
        assert!(entries[2].test.is_err());
    }

    #[test]
    fn entries_require_an_array() {
        assert!(CustomTestDefinition::parse_json_entries(r#"{"test_id": "x"}"#).is_err());
        assert!(CustomTestDefinition::parse_json_entries("{ not json").is_err());
    }

    #[test]
    fn reports_path_of_schema_mismatch() {
        let json = r#"[{"test_id": "t-1", "name": "A", "report_config": {"components": [
            {"input_type": "slider", "key": "x", "label": "X"}
        ]}}]"#;
        let mut entries = CustomTestDefinition::parse_json_entries(json).expect("array");
        match entries.remove(0).test {
            Err(ProfileError::Translation(msg)) => assert!(msg.contains("input_type"), "{msg}"),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }
}
