//! Module registry
//!
//! Handles manifest parsing, descriptor construction, peer ordering and
//! dependency resolution.

pub mod dependencies;
pub mod descriptor;
pub mod manifest;
pub mod ordering;

pub use dependencies::{DependencyResolution, ModuleDependencies};
pub use descriptor::{ActivatorCatalog, DescriptorFactory, ModuleDescriptor};
pub use manifest::{ModuleManifest, SymbolDeclarations, DEFAULT_PRIORITY};
pub use ordering::{compare_versions, order_peers, peer_order};
