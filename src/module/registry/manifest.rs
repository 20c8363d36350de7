//! Module manifest parsing
//!
//! Turns the loosely-typed manifest attributes of a packaged unit into a
//! strongly-typed [`ModuleManifest`]. Parsing happens once, at descriptor build
//! time; nothing downstream sees the raw key/value map.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

use crate::module::isolation::SymbolRules;
use crate::module::traits::{ModuleError, ModuleKind};

/// Entry marking a unit as a business module
pub const BUSINESS_MARKER_ENTRY: &str = "META-INF/modhost/business.marker";

/// Entry marking a unit as a plugin
pub const PLUGIN_MARKER_ENTRY: &str = "META-INF/modhost/plugin.marker";

/// Priority used when the manifest does not declare one
pub const DEFAULT_PRIORITY: i32 = 1000;

/// Recognized manifest attribute keys
pub mod attributes {
    pub const NAME: &str = "name";
    pub const GROUP_ID: &str = "group-id";
    pub const ARTIFACT_ID: &str = "artifact-id";
    pub const VERSION: &str = "version";
    pub const PRIORITY: &str = "priority";
    pub const ACTIVATOR: &str = "activator";
    pub const MAIN_ENTRY: &str = "main-entry";
    pub const EXPORT_TYPES: &str = "export-types";
    pub const EXPORT_NAMESPACES: &str = "export-namespaces";
    pub const EXPORT_RESOURCES: &str = "export-resources";
    pub const IMPORT_TYPES: &str = "import-types";
    pub const IMPORT_NAMESPACES: &str = "import-namespaces";
    pub const IMPORT_RESOURCES: &str = "import-resources";
    pub const DENY_IMPORT_TYPES: &str = "deny-import-types";
    pub const DENY_IMPORT_NAMESPACES: &str = "deny-import-namespaces";
    pub const DENY_IMPORT_RESOURCES: &str = "deny-import-resources";

    pub(crate) const ALL: &[&str] = &[
        NAME,
        GROUP_ID,
        ARTIFACT_ID,
        VERSION,
        PRIORITY,
        ACTIVATOR,
        MAIN_ENTRY,
        EXPORT_TYPES,
        EXPORT_NAMESPACES,
        EXPORT_RESOURCES,
        IMPORT_TYPES,
        IMPORT_NAMESPACES,
        IMPORT_RESOURCES,
        DENY_IMPORT_TYPES,
        DENY_IMPORT_NAMESPACES,
        DENY_IMPORT_RESOURCES,
    ];
}

/// Raw symbol declarations of one rule kind (export, import or deny)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDeclarations {
    #[serde(default)]
    pub types: BTreeSet<String>,
    #[serde(default)]
    pub namespaces: BTreeSet<String>,
    #[serde(default)]
    pub resources: BTreeSet<String>,
}

impl SymbolDeclarations {
    fn from_attributes(
        attrs: &BTreeMap<String, String>,
        types_key: &str,
        namespaces_key: &str,
        resources_key: &str,
    ) -> Self {
        let list = |key: &str| attrs.get(key).map(|v| parse_symbol_list(v)).unwrap_or_default();
        Self {
            types: list(types_key),
            namespaces: list(namespaces_key),
            resources: list(resources_key),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.namespaces.is_empty() && self.resources.is_empty()
    }

    /// Compile into matchable rules
    pub fn to_rules(&self) -> Result<SymbolRules, ModuleError> {
        SymbolRules::new(
            self.types.iter().cloned(),
            self.namespaces.iter(),
            self.resources.iter(),
        )
    }
}

/// Typed module manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub kind: ModuleKind,
    pub name: String,
    pub version: String,
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub priority: i32,
    /// Name of the entry point in the activator catalog
    pub activator: Option<String>,
    /// Main entry of a business module
    pub main_entry: Option<String>,
    #[serde(default)]
    pub exports: SymbolDeclarations,
    #[serde(default)]
    pub imports: SymbolDeclarations,
    #[serde(default)]
    pub denies: SymbolDeclarations,
}

impl ModuleManifest {
    /// Parse manifest attributes
    ///
    /// Fails when `name` or `version` is missing or blank, or when `priority`
    /// is not an integer. Unknown keys are ignored.
    pub fn from_attributes(
        kind: ModuleKind,
        attrs: &BTreeMap<String, String>,
        default_priority: i32,
    ) -> Result<Self, ModuleError> {
        for key in attrs.keys() {
            if !attributes::ALL.contains(&key.as_str()) {
                trace!("Ignoring unknown manifest attribute: {}", key);
            }
        }

        let name = required(attrs, attributes::NAME)?;
        let version = required(attrs, attributes::VERSION)?;

        let priority = match optional(attrs, attributes::PRIORITY) {
            Some(raw) => raw.parse::<i32>().map_err(|e| {
                ModuleError::MalformedDescriptor(format!(
                    "priority of {} must be an integer, got {:?}: {}",
                    name, raw, e
                ))
            })?,
            None => default_priority,
        };

        Ok(Self {
            kind,
            name,
            version,
            group_id: optional(attrs, attributes::GROUP_ID),
            artifact_id: optional(attrs, attributes::ARTIFACT_ID),
            priority,
            activator: optional(attrs, attributes::ACTIVATOR),
            main_entry: optional(attrs, attributes::MAIN_ENTRY),
            exports: SymbolDeclarations::from_attributes(
                attrs,
                attributes::EXPORT_TYPES,
                attributes::EXPORT_NAMESPACES,
                attributes::EXPORT_RESOURCES,
            ),
            imports: SymbolDeclarations::from_attributes(
                attrs,
                attributes::IMPORT_TYPES,
                attributes::IMPORT_NAMESPACES,
                attributes::IMPORT_RESOURCES,
            ),
            denies: SymbolDeclarations::from_attributes(
                attrs,
                attributes::DENY_IMPORT_TYPES,
                attributes::DENY_IMPORT_NAMESPACES,
                attributes::DENY_IMPORT_RESOURCES,
            ),
        })
    }
}

/// Split a comma/whitespace separated attribute value
pub fn parse_symbol_list(value: &str) -> BTreeSet<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn optional(attrs: &BTreeMap<String, String>, key: &str) -> Option<String> {
    attrs
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(attrs: &BTreeMap<String, String>, key: &str) -> Result<String, ModuleError> {
    optional(attrs, key).ok_or_else(|| {
        ModuleError::MalformedDescriptor(format!("missing required attribute '{}'", key))
    })
}
