//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the registry and
//! sessions. Nothing in this crate reads process-wide environment variables; binaries read
//! them and hand the raw values to the parsing helpers below.

use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_REST_ADDR;
use crate::reactor::RecomputeMode;
use crate::{LimsError, LimsResult};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct LimsConfig {
    rest_addr: String,
    custom_tests_dir: Option<PathBuf>,
    recompute_mode: RecomputeMode,
}

impl LimsConfig {
    /// Create a new `LimsConfig`.
    ///
    /// `custom_tests_dir`, when given, must be an existing directory.
    pub fn new(
        rest_addr: String,
        custom_tests_dir: Option<PathBuf>,
        recompute_mode: RecomputeMode,
    ) -> LimsResult<Self> {
        if rest_addr.trim().is_empty() {
            return Err(LimsError::InvalidInput("rest_addr cannot be empty".into()));
        }

        if let Some(dir) = &custom_tests_dir {
            if !dir.is_dir() {
                return Err(LimsError::InvalidInput(format!(
                    "custom tests directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        Ok(Self {
            rest_addr,
            custom_tests_dir,
            recompute_mode,
        })
    }

    pub fn rest_addr(&self) -> &str {
        &self.rest_addr
    }

    pub fn custom_tests_dir(&self) -> Option<&Path> {
        self.custom_tests_dir.as_deref()
    }

    pub fn recompute_mode(&self) -> RecomputeMode {
        self.recompute_mode
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the REST listen address from an optional string value.
pub fn rest_addr_from_env_value(value: Option<String>) -> String {
    non_blank(value).unwrap_or_else(|| DEFAULT_REST_ADDR.into())
}

/// Parse the custom tests directory from an optional string value.
pub fn custom_tests_dir_from_env_value(value: Option<String>) -> Option<PathBuf> {
    non_blank(value).map(PathBuf::from)
}

/// Parse the recompute mode from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`RecomputeMode::SinglePass`].
pub fn recompute_mode_from_env_value(value: Option<String>) -> LimsResult<RecomputeMode> {
    let parsed = non_blank(value)
        .map(|v| v.parse::<RecomputeMode>())
        .transpose()?;

    Ok(parsed.unwrap_or_default())
}
