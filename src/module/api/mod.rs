//! Module API
//!
//! What module code sees at runtime: its context and service references.

pub mod context;

pub use context::{ModuleContext, ServiceReference};
