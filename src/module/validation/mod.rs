//! Module validation framework
//!
//! Provides manifest validation: identity format and visibility-rule syntax.

pub mod manifest_validator;

pub use manifest_validator::{ManifestValidator, ValidationResult};
