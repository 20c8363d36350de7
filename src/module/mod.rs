//! Module system for modhost
//!
//! Hosts business modules and plugins side by side in one process.
//!
//! ## Architecture
//!
//! - **Descriptors**: each packaged unit becomes an immutable, validated
//!   [`ModuleDescriptor`]
//! - **Isolation**: every module resolves symbols through its own
//!   [`IsolationContext`], built from export/import/deny rules and the
//!   ordered set of plugins
//! - **Lifecycle**: the [`ModuleManager`] drives modules through their state
//!   machine and starts providers before their consumers
//! - **Crash Containment**: a failing module becomes `Broken` and its services
//!   are withdrawn; other modules keep running

pub mod api;
pub mod archive;
pub mod isolation;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod resolver;
pub mod traits;
pub mod validation;

pub use api::{ModuleContext, ServiceReference};
pub use archive::{ArchiveEntry, MemoryArchive, ModuleArchive};
pub use isolation::{CodePath, IsolationContext, SharedBase, Symbol};
pub use loader::{DeployReport, ModuleLoader};
pub use manager::{ManagerSettings, ModuleManager, ModuleReport, StartReport, StopReport};
pub use registry::{ActivatorCatalog, DescriptorFactory, ModuleDescriptor};
pub use resolver::ResolutionBuilder;
pub use traits::{ModuleActivator, ModuleError, ModuleId, ModuleKind, ModuleState};
