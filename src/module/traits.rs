//! Module system traits and interfaces
//!
//! Defines module identity, the lifecycle state machine, the entry-point trait
//! modules implement, and the error type shared by the module system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::module::api::ModuleContext;
use crate::services::ServiceError;

/// Kind of a hosted unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// Reusable extension unit; may export symbols to other modules
    Plugin,
    /// Hosted application unit with its own main entry
    Business,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Plugin => f.write_str("plugin"),
            ModuleKind::Business => f.write_str("business"),
        }
    }
}

/// Module identity: `(kind, name, version)`
///
/// `(name, version)` is unique among simultaneously registered modules of the
/// same kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId {
    pub kind: ModuleKind,
    pub name: String,
    pub version: String,
}

impl ModuleId {
    pub fn new(kind: ModuleKind, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn plugin(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(ModuleKind::Plugin, name, version)
    }

    pub fn business(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(ModuleKind::Business, name, version)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.name, self.version)
    }
}

/// Module lifecycle state
///
/// ```text
/// Created -> Resolved -> Starting -> Activated -> Stopping -> Stopped
///                           |            |
///                           +--> Broken <+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleState {
    /// Descriptor accepted, context not yet built
    Created,
    /// Isolation context built
    Resolved,
    /// Entry point `start` is running
    Starting,
    /// Module is running normally
    Activated,
    /// Entry point `stop` is running
    Stopping,
    /// Module stopped (terminal)
    Stopped,
    /// Module failed to start or crashed (terminal)
    Broken,
}

impl ModuleState {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, ModuleState::Stopped | ModuleState::Broken)
    }

    /// Legal edges of the lifecycle state machine
    pub fn can_transition_to(self, next: ModuleState) -> bool {
        use ModuleState::*;
        matches!(
            (self, next),
            (Created, Resolved)
                | (Resolved, Starting)
                | (Starting, Activated)
                | (Starting, Broken)
                | (Activated, Stopping)
                | (Activated, Broken)
                | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Entry point implemented by modules with custom lifecycle logic
///
/// `start` runs while the module is `Starting`; returning an error marks the
/// module `Broken`. `stop` is best-effort: its errors are logged, never
/// propagated.
#[async_trait]
pub trait ModuleActivator: Send + Sync {
    /// Start the module
    async fn start(&self, context: &ModuleContext) -> Result<(), ModuleError>;

    /// Stop the module
    async fn stop(&self, context: &ModuleContext) -> Result<(), ModuleError>;
}

/// Module system errors
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Malformed module descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("Module {module} cannot resolve required symbol {symbol}")]
    UnresolvedRequiredSymbol { module: ModuleId, symbol: String },

    #[error("Module already registered: {0}")]
    AlreadyRegistered(ModuleId),

    #[error("Module not found: {0}")]
    ModuleNotFound(ModuleId),

    #[error("Invalid state transition for module {module}: {from} -> {to}")]
    InvalidTransition {
        module: ModuleId,
        from: ModuleState,
        to: ModuleState,
    },

    #[error("Module {module} depends on {dependency}, which is {state} rather than Activated")]
    DependencyNotActive {
        module: ModuleId,
        dependency: ModuleId,
        state: ModuleState,
    },

    #[error("Module {module} failed to start: {reason}")]
    StartFailed { module: ModuleId, reason: String },

    #[error("Module operation failed: {0}")]
    OperationError(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<anyhow::Error> for ModuleError {
    fn from(e: anyhow::Error) -> Self {
        ModuleError::OperationError(e.to_string())
    }
}
