//! Configuration management for the kernel
//!
//! Handles configuration loading (TOML or JSON) and validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::module::registry::manifest::DEFAULT_PRIORITY;

/// Descriptor construction configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorConfig {
    /// Priority of modules whose manifest does not declare one
    #[serde(default = "default_priority")]
    pub default_priority: i32,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            default_priority: DEFAULT_PRIORITY,
        }
    }
}

/// Service registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Timeout used by `ServiceReference::wait_default`
    #[serde(default = "default_wait_timeout_ms")]
    pub default_wait_timeout_ms: u64,

    /// Upper bound between two re-checks of a waiting lookup
    #[serde(default = "default_recheck_interval_ms")]
    pub recheck_interval_ms: u64,
}

fn default_wait_timeout_ms() -> u64 {
    10_000
}

fn default_recheck_interval_ms() -> u64 {
    50
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_wait_timeout_ms: default_wait_timeout_ms(),
            recheck_interval_ms: default_recheck_interval_ms(),
        }
    }
}

impl ServiceConfig {
    pub fn default_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.default_wait_timeout_ms)
    }

    pub fn recheck_interval(&self) -> Duration {
        Duration::from_millis(self.recheck_interval_ms)
    }
}

/// Lifecycle controller configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Bound on an activator's `start`; unbounded when absent
    #[serde(default)]
    pub start_timeout_ms: Option<u64>,

    /// Withdraw a module's services when it stops normally
    #[serde(default)]
    pub withdraw_services_on_stop: bool,
}

impl LifecycleConfig {
    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout_ms.map(Duration::from_millis)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "modhost::services=debug"
    /// (`RUST_LOG` takes precedence)
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Kernel configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub descriptors: DescriptorConfig,

    #[serde(default)]
    pub services: ServiceConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl KernelConfig {
    /// Load configuration from a file
    ///
    /// Files ending in `.json` are read as JSON, everything else as TOML.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration as TOML
    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.services.recheck_interval_ms == 0 {
            return Err(anyhow::anyhow!(
                "services.recheck_interval_ms must be greater than 0"
            ));
        }

        if self.services.recheck_interval_ms > self.services.default_wait_timeout_ms {
            return Err(anyhow::anyhow!(
                "services.recheck_interval_ms ({}) must not exceed services.default_wait_timeout_ms ({})",
                self.services.recheck_interval_ms,
                self.services.default_wait_timeout_ms
            ));
        }

        if self.lifecycle.start_timeout_ms == Some(0) {
            return Err(anyhow::anyhow!(
                "lifecycle.start_timeout_ms must be greater than 0 when set"
            ));
        }

        if let Some(filter) = self.logging.as_ref().and_then(|l| l.filter.as_deref()) {
            if filter.trim().is_empty() {
                return Err(anyhow::anyhow!("logging.filter must not be blank when set"));
            }
        }

        Ok(())
    }
}
