//! Test utilities for module system testing
//!
//! Provides helpers for building test units, recording activators and a
//! kernel fixture.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use modhost::module::registry::manifest::{BUSINESS_MARKER_ENTRY, PLUGIN_MARKER_ENTRY};
use modhost::{
    ActivatorCatalog, CodePath, Kernel, KernelConfig, MemoryArchive, ModuleActivator,
    ModuleContext, ModuleError, SharedBase,
};

/// Shared log of activator calls, e.g. `["start:a", "start:b", "stop:b"]`
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// What a [`TestActivator`] does on start
#[derive(Clone, Copy, Debug)]
pub enum StartBehavior {
    Succeed,
    Fail,
    Panic,
    Hang,
}

/// Activator recording its calls into a [`CallLog`]
pub struct TestActivator {
    name: String,
    log: CallLog,
    behavior: StartBehavior,
}

impl TestActivator {
    pub fn new(name: &str, log: &CallLog) -> Arc<Self> {
        Self::with_behavior(name, log, StartBehavior::Succeed)
    }

    pub fn with_behavior(name: &str, log: &CallLog, behavior: StartBehavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: Arc::clone(log),
            behavior,
        })
    }
}

#[async_trait]
impl ModuleActivator for TestActivator {
    async fn start(&self, context: &ModuleContext) -> Result<(), ModuleError> {
        self.log.lock().unwrap().push(format!("start:{}", self.name));
        match self.behavior {
            StartBehavior::Succeed => {
                context.publish(Arc::new(self.name.clone()), Some(&self.name));
                Ok(())
            }
            StartBehavior::Fail => {
                context.publish(Arc::new(self.name.clone()), Some(&self.name));
                Err(ModuleError::OperationError(format!("{} refused to start", self.name)))
            }
            StartBehavior::Panic => panic!("{} exploded", self.name),
            StartBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn stop(&self, _context: &ModuleContext) -> Result<(), ModuleError> {
        self.log.lock().unwrap().push(format!("stop:{}", self.name));
        Ok(())
    }
}

/// Builder for in-memory test units
pub struct UnitBuilder {
    archive: MemoryArchive,
}

impl UnitBuilder {
    pub fn plugin(name: &str, version: &str) -> Self {
        Self::new(name, version, PLUGIN_MARKER_ENTRY)
    }

    pub fn business(name: &str, version: &str) -> Self {
        Self::new(name, version, BUSINESS_MARKER_ENTRY)
    }

    fn new(name: &str, version: &str, marker: &str) -> Self {
        Self {
            archive: MemoryArchive::new(format!("{}-{}.unit", name, version))
                .entry(marker)
                .attribute("name", name)
                .attribute("version", version),
        }
    }

    pub fn attr(mut self, key: &str, value: &str) -> Self {
        self.archive = self.archive.attribute(key, value);
        self
    }

    pub fn priority(self, priority: i32) -> Self {
        self.attr("priority", &priority.to_string())
    }

    pub fn activator(self, name: &str) -> Self {
        self.attr("activator", name)
    }

    pub fn types(mut self, location: &str, types: &[&str]) -> Self {
        self.archive = self
            .archive
            .code_path(CodePath::new(location).with_types(types.iter().copied()));
        self
    }

    pub fn resources(mut self, location: &str, resources: &[&str]) -> Self {
        self.archive = self
            .archive
            .code_path(CodePath::new(location).with_resources(resources.iter().copied()));
        self
    }

    pub fn build(self) -> MemoryArchive {
        self.archive
    }

    pub fn shared(self) -> Arc<dyn modhost::ModuleArchive> {
        Arc::new(self.archive)
    }
}

/// Test fixture for module system tests
pub struct ModuleTestFixture {
    pub kernel: Kernel,
    pub log: CallLog,
}

impl ModuleTestFixture {
    /// Kernel whose activators are named after `activators`, all succeeding
    pub fn new(activators: &[&str]) -> Self {
        let log = call_log();
        let catalog = activators.iter().fold(ActivatorCatalog::new(), |catalog, name| {
            catalog.with(*name, TestActivator::new(name, &log))
        });
        Self::with_catalog(catalog, log, KernelConfig::default())
    }

    pub fn with_catalog(catalog: ActivatorCatalog, log: CallLog, mut config: KernelConfig) -> Self {
        config.services.recheck_interval_ms = 5;
        let base = SharedBase::new(vec![
            CodePath::new("runtime/base").with_types(["runtime.text.Str", "runtime.collections.List"])
        ]);
        let kernel = Kernel::new(config, catalog, base).unwrap();
        Self { kernel, log }
    }
}
