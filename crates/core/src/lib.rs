//! # LIMS Core
//!
//! The data-entry engine behind structured lab results.
//!
//! This crate contains pure, synchronous operations over in-memory data:
//! - resolving a test name to a profile, or to free-text entry ([`ProfileRegistry`])
//! - evaluating calculated-field formulas ([`formula`])
//! - recomputing calculated fields after each edit ([`Reactor`])
//! - matching alert rules and panic thresholds ([`alerts`])
//! - flattening a result to its persisted string and back ([`results`])
//! - extracting and filling `{{Variable}}` report template placeholders ([`template`])
//!
//! **No API concerns**: HTTP servers and command-line parsing belong in `api-rest`, `lims-cli`
//! and the `lims-run` binary. Nothing here reads environment variables; see [`config`].

pub mod alerts;
pub mod config;
pub mod constants;
pub mod error;
pub mod formula;
pub mod range;
pub mod reactor;
pub mod registry;
pub mod results;
pub mod session;
pub mod template;
pub mod value;

pub use alerts::{check_alerts, FiredAlert};
pub use config::LimsConfig;
pub use error::{LimsError, LimsResult};
pub use formula::{evaluate, Evaluation, NotReady};
pub use range::RangeFlag;
pub use reactor::{Reaction, Reactor, RecomputeMode};
pub use registry::{ProfileRegistry, Resolved};
pub use results::StoredResult;
pub use session::{FormField, Session, Widget};
pub use template::{extract_variables, fill_template};
pub use value::{FieldValue, ValueMap};

pub use profiles::{ProfileDefinition, TenantId};
