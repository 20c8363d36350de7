//! Module loading system
//!
//! Handles batch deployment of packaged units.

pub mod loader;

pub use loader::{DeployReport, ModuleLoader};
