//! Manifest validation framework
//!
//! Validates module manifests for identity format and visibility-rule syntax.

use tracing::{debug, warn};

use crate::module::isolation::ResourcePattern;
use crate::module::registry::manifest::{ModuleManifest, SymbolDeclarations};

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Manifest is valid
    Valid,
    /// Manifest is invalid with specific errors
    Invalid(Vec<String>),
}

/// Manifest validator
pub struct ManifestValidator {
    /// Maximum length of a module name
    max_name_len: usize,
}

impl ManifestValidator {
    /// Create a new manifest validator
    pub fn new() -> Self {
        Self { max_name_len: 128 }
    }

    /// Validate a module manifest
    pub fn validate(&self, manifest: &ModuleManifest) -> ValidationResult {
        let mut errors = Vec::new();

        if !self.is_valid_name(&manifest.name) {
            errors.push(format!(
                "Invalid module name: {} (must start alphanumeric and contain only alphanumerics, '.', '-' or '_')",
                manifest.name
            ));
        }

        if !self.is_valid_version(&manifest.version) {
            errors.push(format!(
                "Invalid version format: {} (expected major.minor[.patch][-prerelease][+build])",
                manifest.version
            ));
        }

        for (label, decls) in [
            ("export", &manifest.exports),
            ("import", &manifest.imports),
            ("deny", &manifest.denies),
        ] {
            errors.extend(self.validate_declarations(label, decls));
        }

        if errors.is_empty() {
            debug!("Manifest validation passed for module: {}", manifest.name);
            ValidationResult::Valid
        } else {
            warn!(
                "Manifest validation failed for module {}: {:?}",
                manifest.name, errors
            );
            ValidationResult::Invalid(errors)
        }
    }

    /// Validate module name format
    #[inline]
    fn is_valid_name(&self, name: &str) -> bool {
        if name.is_empty() || name.len() > self.max_name_len {
            return false;
        }

        if !name.chars().next().is_some_and(|c| c.is_alphanumeric()) {
            return false;
        }

        name.chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    }

    /// Validate version format (semantic versioning)
    ///
    /// Accepts: major.minor[.patch][-prerelease][+build]
    #[inline]
    fn is_valid_version(&self, version: &str) -> bool {
        if version.is_empty() {
            return false;
        }

        let base = version.split_once('+').map_or(version, |(base, _)| base);
        let (version_part, prerelease) = match base.split_once('-') {
            Some((v, pre)) => (v, Some(pre)),
            None => (base, None),
        };

        if prerelease.is_some_and(|pre| {
            pre.is_empty() || !pre.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '-')
        }) {
            return false;
        }

        let nums: Vec<&str> = version_part.split('.').collect();
        if nums.len() < 2 || nums.len() > 3 {
            return false;
        }

        nums.iter().all(|n| {
            !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) && n.parse::<u32>().is_ok()
        })
    }

    /// Dotted identifier: `com.acme.Util`
    fn is_valid_qualified_name(&self, name: &str) -> bool {
        !name.is_empty()
            && name.split('.').all(|segment| {
                segment
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
                    && segment
                        .chars()
                        .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
            })
    }

    /// Namespace pattern: a qualified name optionally followed by `.*`
    fn is_valid_namespace_pattern(&self, pattern: &str) -> bool {
        let base = pattern.strip_suffix(".*").unwrap_or(pattern);
        self.is_valid_qualified_name(base)
    }

    fn validate_declarations(&self, label: &str, decls: &SymbolDeclarations) -> Vec<String> {
        let mut errors = Vec::new();

        for name in &decls.types {
            if !self.is_valid_qualified_name(name) {
                errors.push(format!("Invalid {} type name: {}", label, name));
            }
        }

        for pattern in &decls.namespaces {
            if !self.is_valid_namespace_pattern(pattern) {
                errors.push(format!("Invalid {} namespace pattern: {}", label, pattern));
            }
        }

        for pattern in &decls.resources {
            if let Err(e) = ResourcePattern::parse(pattern) {
                errors.push(format!("Invalid {} resource pattern: {}", label, e));
            }
        }

        errors
    }
}

impl Default for ManifestValidator {
    fn default() -> Self {
        Self::new()
    }
}
