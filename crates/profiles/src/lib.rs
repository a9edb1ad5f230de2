//! Lab test profile definitions and their wire formats.
//!
//! This crate owns the *shape* of a test profile and nothing else:
//! - domain types ([`ProfileDefinition`], [`ProfileComponent`], [`AlertRule`],
//!   [`CustomTestDefinition`])
//! - strict wire models for the built-in YAML catalog and tenant custom-test JSON
//! - translation from wire models to domain types, enforcing profile invariants
//!
//! Evaluation (formulas, recomputation, alerts, result serialisation) lives in `lims-core`.

pub mod catalog;
pub mod component;
pub mod custom_test;
pub mod placeholder;
pub mod profile;

mod wire;

pub use catalog::{builtin_catalog, parse_profile_yaml};
pub use component::{Field, InputType, ProfileComponent, Validation};
pub use custom_test::{CustomTestDefinition, CustomTestEntry, InputSchemaEntry, SchemaFieldType};
pub use placeholder::formula_placeholders;
pub use profile::{AlertAction, AlertRule, ProfileDefinition};

pub use lims_types::{NonEmptyText, TenantId};

/// Errors returned by the `profiles` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`ProfileError`].
pub type ProfileResult<T> = Result<T, ProfileError>;
