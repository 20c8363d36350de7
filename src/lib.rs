//! modhost - micro-kernel module host
//!
//! Hosts independently packaged business modules and reusable plugins in a
//! single process. Each module resolves types and resources through its own
//! isolation context; modules share capabilities through an in-process
//! service registry.
//!
//! ## Components
//!
//! 1. Descriptor model ([`module::registry`], [`module::validation`])
//! 2. Peer ordering and resolution ([`module::registry::ordering`], [`module::resolver`])
//! 3. Lifecycle controller ([`module::manager`], [`module::loader`])
//! 4. Service registry ([`services`])
//!
//! [`Kernel`] wires them together from a [`KernelConfig`].

pub mod config;
pub mod module;
pub mod services;
pub mod utils;

pub use config::{KernelConfig, LoggingConfig};
pub use module::{
    ActivatorCatalog, CodePath, DescriptorFactory, MemoryArchive, ModuleActivator, ModuleArchive,
    ModuleContext, ModuleDescriptor, ModuleError, ModuleId, ModuleKind, ModuleManager,
    ModuleState, SharedBase, Symbol,
};
pub use services::{ServiceError, ServiceRegistry};

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::module::loader::{DeployReport, ModuleLoader};
use crate::module::manager::{ManagerSettings, StopReport};

/// The assembled kernel: registry, manager and descriptor factory
pub struct Kernel {
    config: KernelConfig,
    services: Arc<ServiceRegistry>,
    manager: Arc<ModuleManager>,
    factory: DescriptorFactory,
}

impl Kernel {
    /// Create a kernel from a validated configuration
    pub fn new(
        config: KernelConfig,
        activators: ActivatorCatalog,
        shared_base: SharedBase,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let services = Arc::new(ServiceRegistry::with_recheck_interval(
            config.services.recheck_interval(),
        ));
        let manager = Arc::new(ModuleManager::with_settings(
            Arc::clone(&services),
            shared_base,
            ManagerSettings::from(&config),
        ));
        let factory = DescriptorFactory::new(activators)
            .with_default_priority(config.descriptors.default_priority);

        Ok(Self {
            config,
            services,
            manager,
            factory,
        })
    }

    /// Create a kernel from a TOML (or `.json`) configuration file
    pub fn from_config_file(
        path: &Path,
        activators: ActivatorCatalog,
        shared_base: SharedBase,
    ) -> anyhow::Result<Self> {
        Self::new(KernelConfig::from_file(path)?, activators, shared_base)
    }

    /// Install the global subscriber described by the logging configuration
    ///
    /// Returns `false` when a subscriber was already installed.
    pub fn init_logging(&self) -> bool {
        utils::init_logging_from_config(self.config.logging.as_ref())
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn manager(&self) -> &Arc<ModuleManager> {
        &self.manager
    }

    pub fn factory(&self) -> &DescriptorFactory {
        &self.factory
    }

    /// Build and register a single unit without starting it
    pub fn install(&self, archive: &dyn ModuleArchive) -> Result<ModuleId, ModuleError> {
        let descriptor = self.factory.build_descriptor(archive)?;
        self.manager.register(descriptor)
    }

    /// Build, register and start a batch of units
    pub async fn deploy(&self, archives: &[Arc<dyn ModuleArchive>]) -> DeployReport {
        ModuleLoader::deploy(&self.manager, &self.factory, archives).await
    }

    /// Stop every running module
    pub async fn shutdown(&self) -> StopReport {
        info!("Shutting down kernel");
        let report = self.manager.stop_all().await;
        info!("Kernel shut down ({} module(s) stopped)", report.stopped.len());
        report
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .field("services", &self.services)
            .finish()
    }
}
