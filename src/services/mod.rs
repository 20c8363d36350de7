//! Cross-module service registry
//!
//! Modules publish capabilities keyed by type and optional qualifier; any
//! module may look them up, optionally waiting until one is published.

pub mod registry;

pub use registry::{ServiceKey, ServiceRegistrationInfo, ServiceRegistry};

use std::time::Duration;
use thiserror::Error;

use crate::module::traits::ModuleId;

/// Service registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Service {service} not available after {waited:?}")]
    ServiceNotAvailable { service: String, waited: Duration },

    #[error("Module {requester} cannot withdraw {service}, owned by {owner}")]
    UnauthorizedWithdraw {
        service: String,
        owner: ModuleId,
        requester: ModuleId,
    },

    #[error("Wait for service {service} was cancelled")]
    Cancelled { service: String },
}
