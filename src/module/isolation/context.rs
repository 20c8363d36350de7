//! Isolation contexts
//!
//! An isolation context is an ordered list of symbol groups consulted in
//! order. The first group that both admits and contains a symbol owns it.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::module::isolation::symbol::{Grant, Symbol, SymbolRules};
use crate::module::traits::{ModuleError, ModuleId};

/// A loadable unit and the symbols it contains
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodePath {
    location: String,
    types: BTreeSet<String>,
    resources: BTreeSet<String>,
}

impl CodePath {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            types: BTreeSet::new(),
            resources: BTreeSet::new(),
        }
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources.extend(resources.into_iter().map(Into::into));
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        match symbol {
            Symbol::Type(name) => self.types.contains(name),
            Symbol::Resource(path) => self.resources.contains(path),
        }
    }
}

/// Fallback code paths every module can see, minus its own deny rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedBase {
    code_paths: Arc<[CodePath]>,
}

impl SharedBase {
    pub fn new(code_paths: Vec<CodePath>) -> Self {
        Self {
            code_paths: code_paths.into(),
        }
    }

    pub fn code_paths(&self) -> &Arc<[CodePath]> {
        &self.code_paths
    }
}

impl Default for SharedBase {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Who contributed a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "owner", content = "module", rename_all = "snake_case")]
pub enum GroupOwner {
    /// The module's own code paths
    SelfModule(ModuleId),
    /// A peer plugin
    Peer(ModuleId),
    /// The shared runtime base
    SharedBase,
}

/// Which symbols of a group the owning context may resolve
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    All,
    Granted(Grant),
    AllExceptDenied,
}

/// One entry of the resolution chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolGroup {
    owner: GroupOwner,
    #[serde(skip)]
    code_paths: Arc<[CodePath]>,
    visibility: Visibility,
}

impl SymbolGroup {
    pub(crate) fn new(owner: GroupOwner, code_paths: Arc<[CodePath]>, visibility: Visibility) -> Self {
        Self {
            owner,
            code_paths,
            visibility,
        }
    }

    pub fn owner(&self) -> &GroupOwner {
        &self.owner
    }

    pub fn code_paths(&self) -> &[CodePath] {
        &self.code_paths
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    /// Peer module behind this group, if any
    pub fn peer(&self) -> Option<&ModuleId> {
        match &self.owner {
            GroupOwner::Peer(id) => Some(id),
            _ => None,
        }
    }

    fn admits(&self, symbol: &Symbol, denies: &SymbolRules) -> bool {
        match &self.visibility {
            Visibility::All => true,
            Visibility::Granted(grant) => grant.admits(symbol) && !denies.matches(symbol),
            Visibility::AllExceptDenied => !denies.matches(symbol),
        }
    }

    fn contains(&self, symbol: &Symbol) -> bool {
        self.code_paths.iter().any(|cp| cp.contains(symbol))
    }
}

/// Resolved symbol boundary of one module
///
/// Built once per (re)resolution and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IsolationContext {
    module: ModuleId,
    groups: Vec<SymbolGroup>,
    denies: SymbolRules,
}

impl IsolationContext {
    pub(crate) fn new(module: ModuleId, groups: Vec<SymbolGroup>, denies: SymbolRules) -> Self {
        Self {
            module,
            groups,
            denies,
        }
    }

    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    pub fn groups(&self) -> &[SymbolGroup] {
        &self.groups
    }

    pub fn denies(&self) -> &SymbolRules {
        &self.denies
    }

    /// Peers contributing a group, in resolution order
    pub fn peers(&self) -> impl Iterator<Item = &ModuleId> {
        self.groups.iter().filter_map(SymbolGroup::peer)
    }

    /// Code-path locations flattened in resolution order
    pub fn code_path_order(&self) -> Vec<&str> {
        self.groups
            .iter()
            .flat_map(|g| g.code_paths.iter().map(CodePath::location))
            .collect()
    }

    /// First group that admits and contains `symbol`
    pub fn resolve(&self, symbol: &Symbol) -> Option<&SymbolGroup> {
        self.groups
            .iter()
            .find(|g| g.admits(symbol, &self.denies) && g.contains(symbol))
    }

    /// Like [`resolve`](Self::resolve), but a miss is an error
    pub fn require(&self, symbol: &Symbol) -> Result<&SymbolGroup, ModuleError> {
        self.resolve(symbol)
            .ok_or_else(|| ModuleError::UnresolvedRequiredSymbol {
                module: self.module.clone(),
                symbol: symbol.to_string(),
            })
    }

    pub fn is_visible(&self, symbol: &Symbol) -> bool {
        self.resolve(symbol).is_some()
    }
}
