//! The built-in profile catalog.
//!
//! Catalog profiles ship as YAML documents embedded in the binary. They are parsed strictly
//! (unknown keys are rejected) so a typo in a catalog file fails loudly at startup instead of
//! silently dropping a reference range.

use std::collections::BTreeSet;

use crate::profile::ProfileDefinition;
use crate::wire::{self, ProfileWire};
use crate::{ProfileError, ProfileResult};

/// Embedded catalog documents as `(file name, YAML text)`, in catalog order.
const BUILTIN_DOCUMENTS: &[(&str, &str)] = &[
    ("cbc.yaml", include_str!("../catalog/cbc.yaml")),
    ("lft.yaml", include_str!("../catalog/lft.yaml")),
    ("kft.yaml", include_str!("../catalog/kft.yaml")),
    ("lipid.yaml", include_str!("../catalog/lipid.yaml")),
    ("blood_sugar.yaml", include_str!("../catalog/blood_sugar.yaml")),
    ("urine.yaml", include_str!("../catalog/urine.yaml")),
];

/// Parse a single profile definition from YAML text.
pub fn parse_profile_yaml(yaml_text: &str) -> ProfileResult<ProfileDefinition> {
    let wire: ProfileWire = wire::from_yaml(yaml_text, "profile")?;
    wire::profile_to_domain(wire)
}

/// Parse every embedded catalog document.
///
/// # Errors
///
/// Returns [`ProfileError::Translation`] naming the offending file if a document does not
/// match the profile schema, violates a profile invariant, or reuses a profile id or name.
pub fn builtin_catalog() -> ProfileResult<Vec<ProfileDefinition>> {
    let mut ids = BTreeSet::new();
    let mut names = BTreeSet::new();
    let mut profiles = Vec::with_capacity(BUILTIN_DOCUMENTS.len());

    for (file, yaml_text) in BUILTIN_DOCUMENTS {
        let profile = parse_profile_yaml(yaml_text).map_err(|e| match e {
            ProfileError::Translation(msg) => ProfileError::Translation(format!("{file}: {msg}")),
            other => other,
        })?;

        if !ids.insert(profile.profile_id().to_owned())
            || !names.insert(profile.name().to_owned())
        {
            return Err(ProfileError::Translation(format!(
                "{file}: profile id '{}' or name '{}' is already defined",
                profile.profile_id(),
                profile.name()
            )));
        }

        profiles.push(profile);
    }

    Ok(profiles)
}
