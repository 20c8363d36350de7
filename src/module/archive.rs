//! Packaged unit boundary
//!
//! Archive extraction lives outside the kernel. Hosts hand the kernel anything
//! implementing [`ModuleArchive`]; [`MemoryArchive`] covers units that were
//! already unpacked.

use std::collections::BTreeMap;

use crate::module::isolation::CodePath;

/// One entry of a packaged unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub is_directory: bool,
}

/// Read-only view of a packaged unit
pub trait ModuleArchive: Send + Sync {
    /// Human-readable origin used in diagnostics
    fn label(&self) -> String;

    /// Main manifest attributes
    fn manifest_attributes(&self) -> BTreeMap<String, String>;

    fn entries(&self) -> Vec<ArchiveEntry>;

    /// Whether a non-directory entry called `name` exists
    fn is_entry_present(&self, name: &str) -> bool {
        self.entries()
            .iter()
            .any(|e| !e.is_directory && e.name == name)
    }

    /// The unit's own code paths in declaration order
    fn code_paths(&self) -> Vec<CodePath>;
}

/// In-memory archive
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    label: String,
    attributes: BTreeMap<String, String>,
    entries: Vec<ArchiveEntry>,
    code_paths: Vec<CodePath>,
}

impl MemoryArchive {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entries.push(ArchiveEntry {
            name: name.into(),
            is_directory: false,
        });
        self
    }

    pub fn directory(mut self, name: impl Into<String>) -> Self {
        self.entries.push(ArchiveEntry {
            name: name.into(),
            is_directory: true,
        });
        self
    }

    pub fn code_path(mut self, code_path: CodePath) -> Self {
        self.code_paths.push(code_path);
        self
    }
}

impl ModuleArchive for MemoryArchive {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn manifest_attributes(&self) -> BTreeMap<String, String> {
        self.attributes.clone()
    }

    fn entries(&self) -> Vec<ArchiveEntry> {
        self.entries.clone()
    }

    fn code_paths(&self) -> Vec<CodePath> {
        self.code_paths.clone()
    }
}
