//! Test-name to profile resolution.
//!
//! A [`ProfileRegistry`] is built once at startup from the embedded catalog plus each tenant's
//! custom tests, then shared read-only. Resolution checks the built-in catalog by exact display
//! name first and then the tenant's custom tests by name or code. A test name that resolves to
//! nothing is normal: [`ProfileRegistry::resolve_entry`] then offers a single free-text field.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use profiles::{
    builtin_catalog, CustomTestDefinition, CustomTestEntry, Field, InputSchemaEntry,
    ProfileComponent, ProfileDefinition, SchemaFieldType, TenantId,
};

use crate::constants::{CUSTOM_TESTS_EXTENSION, MAX_CUSTOM_TESTS_BYTES};
use crate::reactor::RecomputeMode;
use crate::session::{free_text_profile, Session};
use crate::template::extract_variables;
use crate::{LimsError, LimsResult};

/// What an order's test name resolves to for data entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Resolved<'a> {
    /// A built-in profile or one of the tenant's custom tests.
    Profile(&'a ProfileDefinition),
    /// No structured profile exists; the result is entered as one free-text field.
    FreeText(&'a ProfileDefinition),
}

impl<'a> Resolved<'a> {
    pub fn profile(self) -> &'a ProfileDefinition {
        match self {
            Resolved::Profile(profile) | Resolved::FreeText(profile) => profile,
        }
    }

    pub fn is_free_text(self) -> bool {
        matches!(self, Resolved::FreeText(_))
    }

    /// Open a data-entry session on `stored_result` for whatever this resolved to.
    pub fn open(self, stored_result: &str, mode: RecomputeMode) -> Session<'a> {
        match self {
            Resolved::Profile(profile) => Session::open(profile, stored_result, mode),
            Resolved::FreeText(profile) => Session::free_text(profile, stored_result),
        }
    }
}

#[derive(Clone, Debug)]
struct TenantTest {
    test: CustomTestDefinition,
    profile: ProfileDefinition,
}

impl TenantTest {
    fn new(test: CustomTestDefinition) -> LimsResult<Self> {
        let profile = profile_for_custom_test(&test)?;
        warn_on_cycles(&profile);
        Ok(Self { test, profile })
    }
}

#[derive(Clone, Debug)]
pub struct ProfileRegistry {
    builtin: Vec<ProfileDefinition>,
    free_text: ProfileDefinition,
    tenants: BTreeMap<TenantId, Vec<TenantTest>>,
}

impl ProfileRegistry {
    /// Registry containing only the embedded catalog.
    pub fn builtin() -> LimsResult<Self> {
        let builtin = builtin_catalog()?;
        for profile in &builtin {
            warn_on_cycles(profile);
        }
        tracing::info!(profiles = builtin.len(), "loaded built-in profile catalog");

        Ok(Self {
            builtin,
            free_text: free_text_profile()?,
            tenants: BTreeMap::new(),
        })
    }

    /// Add the parsed custom tests for `tenant`, replacing any previously registered.
    ///
    /// Each entry is validated on its own. Invalid tests and repeated `test_id`s are skipped
    /// with a warning; the rest stay enterable.
    pub fn with_tenant_tests(mut self, tenant: TenantId, tests: Vec<CustomTestEntry>) -> Self {
        let mut seen = BTreeSet::new();
        let mut tenant_tests = Vec::with_capacity(tests.len());

        for CustomTestEntry { id, test } in tests {
            if !seen.insert(id.clone()) {
                tracing::warn!(tenant = %tenant, test_id = %id, "skipping duplicate custom test id");
                continue;
            }
            match test.map_err(LimsError::from).and_then(TenantTest::new) {
                Ok(tenant_test) => tenant_tests.push(tenant_test),
                Err(e) => {
                    tracing::warn!(tenant = %tenant, test_id = %id, "skipping custom test: {}", e);
                }
            }
        }

        tracing::info!(tenant = %tenant, tests = tenant_tests.len(), "loaded custom tests");
        self.tenants.insert(tenant, tenant_tests);
        self
    }

    /// Load every `<tenant_id>.json` document in `dir`.
    ///
    /// Files whose stem is not a valid tenant id, that exceed the size cap, or that are not a
    /// JSON array are skipped with a warning. Within a file, each invalid test is skipped on
    /// its own. Only failing to list `dir` is an error.
    pub fn load_custom_tests_dir(mut self, dir: &Path) -> LimsResult<Self> {
        let entries = fs::read_dir(dir).map_err(LimsError::FileRead)?;

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(CUSTOM_TESTS_EXTENSION)
            {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let tenant = match TenantId::parse(stem) {
                Ok(tenant) => tenant,
                Err(e) => {
                    tracing::warn!("skipping custom tests file {}: {}", path.display(), e);
                    continue;
                }
            };

            match entry.metadata() {
                Ok(meta) if meta.len() > MAX_CUSTOM_TESTS_BYTES => {
                    tracing::warn!(
                        "skipping custom tests file {}: {} bytes exceeds limit of {}",
                        path.display(),
                        meta.len(),
                        MAX_CUSTOM_TESTS_BYTES
                    );
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("failed to stat {}: {}", path.display(), e);
                    continue;
                }
            }

            let parsed = fs::read_to_string(&path)
                .map_err(LimsError::FileRead)
                .and_then(|text| {
                    CustomTestDefinition::parse_json_entries(&text).map_err(LimsError::from)
                });

            match parsed {
                Ok(tests) => self = self.with_tenant_tests(tenant, tests),
                Err(e) => {
                    tracing::warn!("failed to load custom tests {}: {}", path.display(), e);
                }
            }
        }

        Ok(self)
    }

    /// Resolve the profile used to enter results for `test_name`.
    pub fn resolve(&self, test_name: &str, tenant: Option<&TenantId>) -> Option<&ProfileDefinition> {
        if let Some(profile) = self.builtin.iter().find(|p| p.name() == test_name) {
            return Some(profile);
        }

        self.tenants
            .get(tenant?)?
            .iter()
            .find(|t| t.test.matches(test_name))
            .map(|t| &t.profile)
    }

    /// Like [`resolve`](Self::resolve), falling back to free-text entry for unknown tests.
    pub fn resolve_entry(&self, test_name: &str, tenant: Option<&TenantId>) -> Resolved<'_> {
        match self.resolve(test_name, tenant) {
            Some(profile) => Resolved::Profile(profile),
            None => {
                tracing::debug!(test_name, "no profile for test, using free-text entry");
                Resolved::FreeText(&self.free_text)
            }
        }
    }

    /// [`resolve_entry`](Self::resolve_entry) with the tenant id as received from a caller.
    pub fn resolve_entry_raw(
        &self,
        test_name: &str,
        tenant_id: Option<&str>,
    ) -> LimsResult<Resolved<'_>> {
        let tenant = parse_tenant(tenant_id)?;
        Ok(self.resolve_entry(test_name, tenant.as_ref()))
    }

    /// The custom test that `test_name` resolves to for `tenant`, if it is not a built-in.
    pub fn custom_test(&self, test_name: &str, tenant: &TenantId) -> Option<&CustomTestDefinition> {
        if self.builtin.iter().any(|p| p.name() == test_name) {
            return None;
        }
        self.tenants
            .get(tenant)?
            .iter()
            .find(|t| t.test.matches(test_name))
            .map(|t| &t.test)
    }

    /// Built-in profile by id.
    pub fn get(&self, profile_id: &str) -> Option<&ProfileDefinition> {
        self.builtin.iter().find(|p| p.profile_id() == profile_id)
    }

    pub fn builtin_profiles(&self) -> &[ProfileDefinition] {
        &self.builtin
    }

    pub fn tenant_profiles<'a>(
        &'a self,
        tenant: &TenantId,
    ) -> impl Iterator<Item = &'a ProfileDefinition> + 'a {
        self.tenants
            .get(tenant)
            .into_iter()
            .flatten()
            .map(|t| &t.profile)
    }
}

/// A missing or blank tenant id means no tenant.
fn parse_tenant(tenant_id: Option<&str>) -> LimsResult<Option<TenantId>> {
    Ok(tenant_id
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(TenantId::parse)
        .transpose()?)
}

fn warn_on_cycles(profile: &ProfileDefinition) {
    let cyclic = profile.cyclic_keys();
    if !cyclic.is_empty() {
        tracing::warn!(
            profile = profile.profile_id(),
            keys = ?cyclic,
            "profile has cyclic calculated fields"
        );
    }
}

/// Build the entry profile for a custom test.
///
/// Structured components are used as-is. Otherwise a stored `input_schema` takes precedence
/// over scanning the HTML template for `{{Variable}}` placeholders.
pub fn profile_for_custom_test(test: &CustomTestDefinition) -> LimsResult<ProfileDefinition> {
    let components = match (&test.components, &test.input_schema, &test.html_template) {
        (Some(components), _, _) => components.clone(),
        (None, schema, _) if !schema.is_empty() => schema.iter().map(schema_component).collect(),
        (None, _, Some(html)) => extract_variables(html)
            .iter()
            .map(schema_component)
            .collect(),
        (None, _, None) => Vec::new(),
    };

    Ok(ProfileDefinition::new(
        test.test_id.clone(),
        test.name.clone(),
        components,
        Vec::new(),
    )?)
}

fn schema_component(entry: &InputSchemaEntry) -> ProfileComponent {
    let field = Field::plain(entry.key.clone(), entry.label.clone());
    match entry.field_type {
        SchemaFieldType::Number => ProfileComponent::Number(field),
        SchemaFieldType::TextArea => ProfileComponent::TextArea(field),
        SchemaFieldType::Text => ProfileComponent::Text(field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use profiles::InputType;

    const LAB_TESTS: &str = r#"[
        {
            "test_id": "tft",
            "name": "Thyroid Panel",
            "code": "TFT",
            "report_config": {
                "components": [
                    {"input_type": "number", "key": "tsh", "label": "TSH", "unit": "mIU/L"}
                ]
            },
            "created_by": "editor"
        },
        {
            "test_id": "semen",
            "name": "Semen Analysis",
            "html_template": "<p>Volume {{Volume}} ml, count {{ Count }}, again {{Volume}}</p>"
        },
        {
            "test_id": "widal",
            "name": "Widal Test",
            "html_template": "<p>{{TO}}</p>",
            "input_schema": [
                {"key": "TO", "label": "Typhi O", "type": "text"},
                {"key": "titre", "label": "Titre", "type": "number"},
                {"key": "notes", "label": "Notes", "type": "text_area"}
            ]
        }
    ]"#;

    fn tenant(id: &str) -> TenantId {
        TenantId::parse(id).expect("valid tenant id")
    }

    fn registry() -> ProfileRegistry {
        let tests = CustomTestDefinition::parse_json_entries(LAB_TESTS).expect("valid tests");
        ProfileRegistry::builtin()
            .expect("catalog")
            .with_tenant_tests(tenant("lab-a"), tests)
    }

    #[test]
    fn resolves_builtin_by_display_name() {
        let registry = registry();
        let profile = registry
            .resolve("Liver Function Test (LFT)", None)
            .expect("builtin");
        assert_eq!(profile.profile_id(), "lft");
        assert!(registry.resolve("liver function test (lft)", None).is_none());
    }

    #[test]
    fn unknown_test_resolves_to_none() {
        let registry = registry();
        assert!(registry.resolve("Unknown Test", Some(&tenant("lab-a"))).is_none());
        assert!(registry.resolve("Thyroid Panel", Some(&tenant("lab-b"))).is_none());
        assert!(registry.resolve("Thyroid Panel", None).is_none());
    }

    #[test]
    fn resolves_custom_test_by_name_or_code() {
        let registry = registry();
        let lab = tenant("lab-a");
        let by_name = registry.resolve("Thyroid Panel", Some(&lab)).expect("by name");
        let by_code = registry.resolve("TFT", Some(&lab)).expect("by code");
        assert_eq!(by_name, by_code);
        assert_eq!(by_name.components()[0].key(), Some("tsh"));
    }

    #[test]
    fn raw_tenant_ids_are_validated() {
        let registry = registry();
        let found = registry
            .resolve_entry_raw("TFT", Some(" lab-a "))
            .expect("valid tenant");
        assert_eq!(found.profile().profile_id(), "tft");
        assert!(!registry
            .resolve_entry_raw("Lipid Profile", Some(""))
            .expect("blank tenant")
            .is_free_text());

        let err = registry
            .resolve_entry_raw("TFT", Some("../lab-a"))
            .expect_err("path-like tenant");
        assert!(matches!(err, LimsError::TenantId(_)));
    }

    #[test]
    fn template_only_test_synthesizes_text_fields() {
        let registry = registry();
        let profile = registry
            .resolve("Semen Analysis", Some(&tenant("lab-a")))
            .expect("template test");
        let keys: Vec<_> = profile.components().iter().filter_map(|c| c.key()).collect();
        assert_eq!(keys, vec!["Volume", "Count"]);
        assert!(profile
            .components()
            .iter()
            .all(|c| c.input_type() == InputType::Text));
        assert_eq!(profile.components()[0].label(), "Volume");
    }

    #[test]
    fn stored_input_schema_takes_precedence_over_template() {
        let registry = registry();
        let profile = registry
            .resolve("Widal Test", Some(&tenant("lab-a")))
            .expect("schema test");
        let types: Vec<_> = profile.components().iter().map(|c| c.input_type()).collect();
        assert_eq!(
            types,
            vec![InputType::Text, InputType::Number, InputType::TextArea]
        );
        assert_eq!(profile.components()[0].label(), "Typhi O");
    }

    #[test]
    fn get_and_listings() {
        let registry = registry();
        assert_eq!(registry.builtin_profiles().len(), 6);
        assert_eq!(registry.get("kft").map(|p| p.name()), Some("Kidney Function Test (KFT)"));
        assert!(registry.get("tft").is_none());
        assert_eq!(registry.tenant_profiles(&tenant("lab-a")).count(), 3);
        assert_eq!(registry.tenant_profiles(&tenant("lab-b")).count(), 0);
    }

    #[test]
    fn custom_test_lookup_skips_builtins() {
        let registry = registry();
        let lab = tenant("lab-a");
        let test = registry.custom_test("Semen Analysis", &lab).expect("custom");
        assert!(test.html_template.is_some());
        assert!(registry.custom_test("Lipid Profile", &lab).is_none());
    }

    #[test]
    fn invalid_tenant_test_is_skipped_alone() {
        let tests = CustomTestDefinition::parse_json_entries(
            r#"[
                {"test_id": "dup", "name": "Dup", "input_schema": [
                    {"key": "a", "label": "A"}, {"key": "a", "label": "A again"}
                ]},
                {"test_id": "ok", "name": "Fine", "html_template": "{{a}}"}
            ]"#,
        )
        .expect("parses");
        let registry = ProfileRegistry::builtin()
            .expect("catalog")
            .with_tenant_tests(tenant("lab-a"), tests);

        let lab = tenant("lab-a");
        assert!(registry.resolve("Dup", Some(&lab)).is_none());
        assert!(registry.resolve("Fine", Some(&lab)).is_some());
        assert_eq!(registry.tenant_profiles(&lab).count(), 1);
    }

    #[test]
    fn one_bad_test_in_a_file_keeps_the_rest() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("lab-a.json"),
            r#"[
                {"test_id": "good", "name": "Good Test", "html_template": "<p>{{Result}}</p>"},
                {"test_id": "calc", "name": "Broken Calc", "report_config": {"components": [
                    {"input_type": "calculated", "key": "x", "label": "X", "formula": "{nope} + 1"}
                ]}},
                {"test_id": "extra", "name": "Extra Field", "report_config": {"components": [
                    {"input_type": "text", "key": "y", "label": "Y", "placeholder": "..."}
                ]}},
                {"test_id": "good", "name": "Good Again", "html_template": "{{z}}"}
            ]"#,
        )
        .expect("write");

        let registry = ProfileRegistry::builtin()
            .expect("catalog")
            .load_custom_tests_dir(dir.path())
            .expect("directory loads");

        let lab = tenant("lab-a");
        let good = registry.resolve("Good Test", Some(&lab)).expect("good test");
        assert_eq!(good.components()[0].key(), Some("Result"));
        assert!(registry.resolve("Broken Calc", Some(&lab)).is_none());
        assert!(registry.resolve("Extra Field", Some(&lab)).is_none());
        assert!(registry.resolve("Good Again", Some(&lab)).is_none());
        assert_eq!(registry.tenant_profiles(&lab).count(), 1);
    }

    #[test]
    fn unknown_test_falls_back_to_free_text() {
        let registry = registry();
        let lab = tenant("lab-a");

        let resolved = registry.resolve_entry("Bone Marrow Aspirate", Some(&lab));
        assert!(resolved.is_free_text());
        let fields = resolved.profile().components();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].input_type(), InputType::TextArea);

        let resolved = registry.resolve_entry("TFT", Some(&lab));
        assert!(!resolved.is_free_text());
        assert_eq!(resolved.profile().profile_id(), "tft");

        assert!(registry
            .resolve_entry_raw("Anything", Some(""))
            .expect("blank tenant")
            .is_free_text());
        assert!(matches!(
            registry.resolve_entry_raw("Anything", Some("a/b")),
            Err(LimsError::TenantId(_))
        ));
    }

    #[test]
    fn loads_tenant_files_from_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("lab-a.json"), LAB_TESTS).expect("write");
        fs::write(dir.path().join("lab-b.json"), "{ not json").expect("write");
        fs::write(dir.path().join("bad tenant.json"), LAB_TESTS).expect("write");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let registry = ProfileRegistry::builtin()
            .expect("catalog")
            .load_custom_tests_dir(dir.path())
            .expect("directory loads");

        assert_eq!(registry.tenant_profiles(&tenant("lab-a")).count(), 3);
        assert_eq!(registry.tenant_profiles(&tenant("lab-b")).count(), 0);
        assert!(registry
            .resolve("Semen Analysis", Some(&tenant("lab-a")))
            .is_some());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = ProfileRegistry::builtin()
            .expect("catalog")
            .load_custom_tests_dir(Path::new("/definitely/not/here"))
            .expect_err("missing dir");
        assert!(matches!(err, LimsError::FileRead(_)));
    }
}
