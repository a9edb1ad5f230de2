//! Constants used throughout the LIMS core crate.

/// Default REST listen address when `LIMS_REST_ADDR` is not set.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// File extension of per-tenant custom test documents (`<tenant_id>.json`).
pub const CUSTOM_TESTS_EXTENSION: &str = "json";

/// Upper bound on the size of a single tenant's custom test document.
pub const MAX_CUSTOM_TESTS_BYTES: u64 = 5 * 1024 * 1024;

/// Calculated results are rounded to this many decimal places.
pub const RESULT_DECIMAL_PLACES: i32 = 2;

/// Profile id of the single-field entry used for tests without a structured profile.
pub const FREE_TEXT_PROFILE_ID: &str = "free_text";

/// Key of the one field in a free-text entry.
pub const FREE_TEXT_KEY: &str = "result";
