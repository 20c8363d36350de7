//! Module loader implementation
//!
//! Turns a batch of packaged units into registered, started modules.

use std::sync::Arc;
use tracing::{info, warn};

use crate::module::archive::ModuleArchive;
use crate::module::manager::{ModuleManager, StartReport};
use crate::module::registry::{peer_order, DescriptorFactory, ModuleDescriptor};
use crate::module::traits::{ModuleError, ModuleId};

/// Outcome of [`ModuleLoader::deploy`]
#[derive(Debug, Default)]
pub struct DeployReport {
    /// Modules registered, in registration order
    pub registered: Vec<ModuleId>,
    /// Units that never became modules, by archive label
    pub rejected: Vec<(String, ModuleError)>,
    pub start: StartReport,
}

impl DeployReport {
    pub fn is_success(&self) -> bool {
        self.rejected.is_empty() && self.start.is_success()
    }
}

/// Module loader for loading and initializing modules
pub struct ModuleLoader;

impl ModuleLoader {
    /// Build, register and start every unit of `archives`
    ///
    /// Plugins are registered first (in peer order) so business modules
    /// resolve against them, then every resolved module is started. A failing
    /// unit never aborts the batch.
    pub async fn deploy(
        manager: &ModuleManager,
        factory: &DescriptorFactory,
        archives: &[Arc<dyn ModuleArchive>],
    ) -> DeployReport {
        let mut report = DeployReport::default();
        let mut descriptors: Vec<ModuleDescriptor> = Vec::with_capacity(archives.len());

        for archive in archives {
            match factory.build_descriptor(archive.as_ref()) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => {
                    warn!("Rejected module unit {}: {}", archive.label(), e);
                    report.rejected.push((archive.label(), e));
                }
            }
        }

        descriptors.sort_by(|a, b| a.kind().cmp(&b.kind()).then_with(|| peer_order(a, b)));

        for descriptor in descriptors {
            let label = descriptor.id().to_string();
            match manager.register(descriptor) {
                Ok(id) => report.registered.push(id),
                Err(e) => {
                    warn!("Failed to register module {}: {}", label, e);
                    report.rejected.push((label, e));
                }
            }
        }

        report.start = manager.start_all().await;
        info!(
            "Deployed {} module(s): {} rejected, {} started, {} failed to start",
            report.registered.len(),
            report.rejected.len(),
            report.start.started.len(),
            report.start.failed.len()
        );
        report
    }
}
