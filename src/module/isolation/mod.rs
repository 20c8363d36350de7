//! Per-module symbol isolation
//!
//! Each module resolves symbols through an explicit list of lookup tables
//! consulted in order: its own code, granted peer exports, the shared base.

pub mod context;
pub mod symbol;

pub use context::{CodePath, GroupOwner, IsolationContext, SharedBase, SymbolGroup, Visibility};
pub use symbol::{
    namespace_of, Grant, NamespacePattern, ResourceGrant, ResourcePattern, Symbol, SymbolRules,
};
