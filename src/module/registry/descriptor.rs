//! Module descriptors
//!
//! A [`ModuleDescriptor`] is the immutable, validated description of one
//! packaged unit. The only way to obtain one is through
//! [`ModuleDescriptor::new`] with an already-parsed manifest, or through
//! [`DescriptorFactory::build_descriptor`] from an archive.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::module::archive::ModuleArchive;
use crate::module::isolation::{CodePath, SymbolRules};
use crate::module::registry::manifest::{
    ModuleManifest, BUSINESS_MARKER_ENTRY, DEFAULT_PRIORITY, PLUGIN_MARKER_ENTRY,
};
use crate::module::traits::{ModuleActivator, ModuleError, ModuleId, ModuleKind};
use crate::module::validation::{ManifestValidator, ValidationResult};

/// Immutable module descriptor
#[derive(Clone)]
pub struct ModuleDescriptor {
    id: ModuleId,
    manifest: ModuleManifest,
    code_paths: Arc<[CodePath]>,
    exports: SymbolRules,
    imports: SymbolRules,
    denies: SymbolRules,
    activator: Option<Arc<dyn ModuleActivator>>,
}

impl ModuleDescriptor {
    /// Build a descriptor from a parsed manifest
    ///
    /// The manifest is validated here; an invalid manifest yields
    /// [`ModuleError::MalformedDescriptor`] listing every problem found.
    pub fn new(
        manifest: ModuleManifest,
        code_paths: Vec<CodePath>,
        activator: Option<Arc<dyn ModuleActivator>>,
    ) -> Result<Self, ModuleError> {
        if let ValidationResult::Invalid(errors) = ManifestValidator::new().validate(&manifest) {
            return Err(ModuleError::MalformedDescriptor(format!(
                "{}: {}",
                manifest.name,
                errors.join("; ")
            )));
        }

        Ok(Self {
            id: ModuleId::new(manifest.kind, manifest.name.clone(), manifest.version.clone()),
            exports: manifest.exports.to_rules()?,
            imports: manifest.imports.to_rules()?,
            denies: manifest.denies.to_rules()?,
            code_paths: code_paths.into(),
            manifest,
            activator,
        })
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn kind(&self) -> ModuleKind {
        self.id.kind
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn version(&self) -> &str {
        &self.id.version
    }

    pub fn priority(&self) -> i32 {
        self.manifest.priority
    }

    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    pub fn code_paths(&self) -> &Arc<[CodePath]> {
        &self.code_paths
    }

    pub fn exports(&self) -> &SymbolRules {
        &self.exports
    }

    pub fn imports(&self) -> &SymbolRules {
        &self.imports
    }

    pub fn denies(&self) -> &SymbolRules {
        &self.denies
    }

    pub fn main_entry(&self) -> Option<&str> {
        self.manifest.main_entry.as_deref()
    }

    pub fn activator(&self) -> Option<&Arc<dyn ModuleActivator>> {
        self.activator.as_ref()
    }

    pub fn is_plugin(&self) -> bool {
        self.id.kind == ModuleKind::Plugin
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("priority", &self.manifest.priority)
            .field("code_paths", &self.code_paths.len())
            .field("activator", &self.manifest.activator)
            .finish()
    }
}

/// Named entry points that manifests may reference
#[derive(Clone, Default)]
pub struct ActivatorCatalog {
    activators: BTreeMap<String, Arc<dyn ModuleActivator>>,
}

impl ActivatorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activator under the name manifests use for it
    pub fn register(&mut self, name: impl Into<String>, activator: Arc<dyn ModuleActivator>) {
        self.activators.insert(name.into(), activator);
    }

    pub fn with(mut self, name: impl Into<String>, activator: Arc<dyn ModuleActivator>) -> Self {
        self.register(name, activator);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ModuleActivator>> {
        self.activators.get(name).cloned()
    }
}

impl fmt::Debug for ActivatorCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.activators.keys()).finish()
    }
}

/// Builds descriptors from packaged units
#[derive(Debug, Clone)]
pub struct DescriptorFactory {
    default_priority: i32,
    activators: ActivatorCatalog,
}

impl DescriptorFactory {
    pub fn new(activators: ActivatorCatalog) -> Self {
        Self {
            default_priority: DEFAULT_PRIORITY,
            activators,
        }
    }

    pub fn with_default_priority(mut self, priority: i32) -> Self {
        self.default_priority = priority;
        self
    }

    /// Build a descriptor from a packaged unit
    ///
    /// Fails with [`ModuleError::MalformedDescriptor`] when the unit carries no
    /// marker entry, when required identity attributes are missing, when the
    /// manifest does not validate, or when it names an unknown activator.
    pub fn build_descriptor(&self, archive: &dyn ModuleArchive) -> Result<ModuleDescriptor, ModuleError> {
        let kind = Self::module_kind(archive)?;
        let attrs = archive.manifest_attributes();
        let manifest = ModuleManifest::from_attributes(kind, &attrs, self.default_priority)
            .map_err(|e| match e {
                ModuleError::MalformedDescriptor(msg) => {
                    ModuleError::MalformedDescriptor(format!("{}: {}", archive.label(), msg))
                }
                other => other,
            })?;

        let activator = match manifest.activator.as_deref() {
            Some(name) => Some(self.activators.get(name).ok_or_else(|| {
                ModuleError::MalformedDescriptor(format!(
                    "{}: unknown activator '{}'",
                    archive.label(),
                    name
                ))
            })?),
            None => None,
        };

        let descriptor = ModuleDescriptor::new(manifest, archive.code_paths(), activator)?;
        debug!(
            "Built descriptor {} (priority {}) from {}",
            descriptor.id(),
            descriptor.priority(),
            archive.label()
        );
        Ok(descriptor)
    }

    fn module_kind(archive: &dyn ModuleArchive) -> Result<ModuleKind, ModuleError> {
        let business = archive.is_entry_present(BUSINESS_MARKER_ENTRY);
        let plugin = archive.is_entry_present(PLUGIN_MARKER_ENTRY);
        match (business, plugin) {
            (true, false) => Ok(ModuleKind::Business),
            (false, true) => Ok(ModuleKind::Plugin),
            (true, true) => Err(ModuleError::MalformedDescriptor(format!(
                "{}: carries both business and plugin markers",
                archive.label()
            ))),
            (false, false) => Err(ModuleError::MalformedDescriptor(format!(
                "{}: not a loadable module (no marker entry)",
                archive.label()
            ))),
        }
    }
}

impl Default for DescriptorFactory {
    fn default() -> Self {
        Self::new(ActivatorCatalog::new())
    }
}
