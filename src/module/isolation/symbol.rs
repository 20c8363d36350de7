//! Symbols and visibility rules
//!
//! A symbol is a type name (`com.acme.util.Strings`) or a resource path
//! (`META-INF/acme/config.xml`). Rules select symbols by exact type name, by
//! namespace pattern, or by resource glob.

use globset::{Glob, GlobMatcher};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

use crate::module::traits::ModuleError;

/// A resolvable symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    /// Fully qualified type name
    Type(String),
    /// Resource path inside a code path
    Resource(String),
}

impl Symbol {
    pub fn type_name(name: impl Into<String>) -> Self {
        Symbol::Type(name.into())
    }

    pub fn resource(path: impl Into<String>) -> Self {
        Symbol::Resource(path.into())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Type(name) => write!(f, "type {name}"),
            Symbol::Resource(path) => write!(f, "resource {path}"),
        }
    }
}

/// Namespace of a type: everything before the last `.`
pub fn namespace_of(type_name: &str) -> &str {
    type_name.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
}

/// Namespace selector
///
/// `a.b` matches exactly `a.b`; `a.b.*` matches `a.b` and every namespace
/// below it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NamespacePattern {
    Exact(String),
    Subtree(String),
}

impl NamespacePattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix(".*") {
            Some(base) => NamespacePattern::Subtree(base.to_string()),
            None => NamespacePattern::Exact(pattern.to_string()),
        }
    }

    fn base(&self) -> &str {
        match self {
            NamespacePattern::Exact(ns) | NamespacePattern::Subtree(ns) => ns,
        }
    }

    pub fn matches(&self, namespace: &str) -> bool {
        match self {
            NamespacePattern::Exact(ns) => ns == namespace,
            NamespacePattern::Subtree(base) => {
                namespace == base
                    || (namespace.len() > base.len()
                        && namespace.starts_with(base.as_str())
                        && namespace.as_bytes()[base.len()] == b'.')
            }
        }
    }

    /// Whether every namespace `other` selects is also selected by `self`
    pub fn covers(&self, other: &NamespacePattern) -> bool {
        match (self, other) {
            (NamespacePattern::Exact(a), NamespacePattern::Exact(b)) => a == b,
            (NamespacePattern::Exact(_), NamespacePattern::Subtree(_)) => false,
            (NamespacePattern::Subtree(_), other) => self.matches(other.base()),
        }
    }

    /// The narrower of two overlapping patterns, `None` if they are disjoint
    pub fn intersect(&self, other: &NamespacePattern) -> Option<NamespacePattern> {
        if self.covers(other) {
            Some(other.clone())
        } else if other.covers(self) {
            Some(self.clone())
        } else {
            None
        }
    }
}

impl fmt::Display for NamespacePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespacePattern::Exact(ns) => f.write_str(ns),
            NamespacePattern::Subtree(base) => write!(f, "{base}.*"),
        }
    }
}

impl Serialize for NamespacePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Compiled resource glob
#[derive(Debug, Clone)]
pub struct ResourcePattern {
    pattern: String,
    matcher: GlobMatcher,
}

impl ResourcePattern {
    pub fn parse(pattern: &str) -> Result<Self, ModuleError> {
        let glob = Glob::new(pattern).map_err(|e| {
            ModuleError::MalformedDescriptor(format!("invalid resource pattern {pattern}: {e}"))
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }

    /// Whether some path could match both globs
    ///
    /// Conservative: compares the literal text before the first and after the
    /// last glob metacharacter. A `false` answer is exact; a `true` answer may
    /// cover globs that share no path.
    pub fn may_overlap(&self, other: &ResourcePattern) -> bool {
        let (a_prefix, a_suffix) = literal_ends(&self.pattern);
        let (b_prefix, b_suffix) = literal_ends(&other.pattern);
        (a_prefix.starts_with(b_prefix) || b_prefix.starts_with(a_prefix))
            && (a_suffix.ends_with(b_suffix) || b_suffix.ends_with(a_suffix))
    }
}

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}', '\\'];

/// Literal head and tail of a glob
///
/// Separators next to a wildcard are dropped since `**/` also matches an
/// empty directory prefix.
fn literal_ends(pattern: &str) -> (&str, &str) {
    match (pattern.find(GLOB_META), pattern.rfind(GLOB_META)) {
        (Some(first), Some(last)) => (
            pattern[..first].trim_end_matches('/'),
            pattern[last + 1..].trim_start_matches('/'),
        ),
        // no wildcard: the glob is a literal path
        _ => (pattern, pattern),
    }
}

impl PartialEq for ResourcePattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for ResourcePattern {}

impl PartialOrd for ResourcePattern {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourcePattern {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.pattern.cmp(&other.pattern)
    }
}

impl Serialize for ResourcePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pattern)
    }
}

/// A set of type names, namespace patterns and resource globs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SymbolRules {
    types: BTreeSet<String>,
    namespaces: BTreeSet<NamespacePattern>,
    resources: BTreeSet<ResourcePattern>,
}

impl SymbolRules {
    pub fn new<T, N, R>(types: T, namespaces: N, resources: R) -> Result<Self, ModuleError>
    where
        T: IntoIterator,
        T::Item: Into<String>,
        N: IntoIterator,
        N::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        let resources = resources
            .into_iter()
            .map(|r| ResourcePattern::parse(r.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self {
            types: types.into_iter().map(Into::into).collect(),
            namespaces: namespaces
                .into_iter()
                .map(|n| NamespacePattern::parse(n.as_ref()))
                .collect(),
            resources,
        })
    }

    pub fn types(&self) -> &BTreeSet<String> {
        &self.types
    }

    pub fn namespaces(&self) -> &BTreeSet<NamespacePattern> {
        &self.namespaces
    }

    pub fn resources(&self) -> &BTreeSet<ResourcePattern> {
        &self.resources
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.namespaces.is_empty() && self.resources.is_empty()
    }

    pub fn matches_type(&self, type_name: &str) -> bool {
        if self.types.contains(type_name) {
            return true;
        }
        let namespace = namespace_of(type_name);
        self.namespaces.iter().any(|p| p.matches(namespace))
    }

    pub fn matches_resource(&self, path: &str) -> bool {
        self.resources.iter().any(|p| p.matches(path))
    }

    pub fn matches(&self, symbol: &Symbol) -> bool {
        match symbol {
            Symbol::Type(name) => self.matches_type(name),
            Symbol::Resource(path) => self.matches_resource(path),
        }
    }

    fn covers_namespace(&self, pattern: &NamespacePattern) -> bool {
        self.namespaces.iter().any(|p| p.covers(pattern))
    }

    /// What a peer exporting `self` grants to a module with `imports` and `denies`
    pub fn grant(&self, imports: &SymbolRules, denies: &SymbolRules) -> Grant {
        // Single types may come from either side: an exported type the module
        // imports by namespace, or an imported type inside an exported namespace.
        let types = self
            .types
            .iter()
            .chain(imports.types.iter())
            .filter(|t| self.matches_type(t) && imports.matches_type(t) && !denies.matches_type(t))
            .cloned()
            .collect();

        let namespaces = self
            .namespaces
            .iter()
            .flat_map(|e| imports.namespaces.iter().filter_map(move |i| e.intersect(i)))
            .filter(|ns| !denies.covers_namespace(ns))
            .collect();

        // Globs have no closed-form intersection, so keep both sides and
        // match each path against the pair.
        let resources = self
            .resources
            .iter()
            .flat_map(|e| {
                imports
                    .resources
                    .iter()
                    .filter(move |i| e.may_overlap(i))
                    .map(move |i| ResourceGrant {
                        export: e.clone(),
                        import: i.clone(),
                    })
            })
            // a deny glob identical to either side removes every path of the pair
            .filter(|pair| {
                !denies.resources.contains(&pair.export) && !denies.resources.contains(&pair.import)
            })
            .collect();

        Grant {
            types,
            namespaces,
            resources,
        }
    }
}

/// An exported glob paired with the import glob it overlaps
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ResourceGrant {
    export: ResourcePattern,
    import: ResourcePattern,
}

impl ResourceGrant {
    pub fn export(&self) -> &ResourcePattern {
        &self.export
    }

    pub fn import(&self) -> &ResourcePattern {
        &self.import
    }

    pub fn admits(&self, path: &str) -> bool {
        self.export.matches(path) && self.import.matches(path)
    }
}

/// Symbols a peer group admits for one consuming module
///
/// Deny rules are not part of the grant; the isolation context applies them
/// again at lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Grant {
    types: BTreeSet<String>,
    namespaces: BTreeSet<NamespacePattern>,
    resources: BTreeSet<ResourceGrant>,
}

impl Grant {
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.namespaces.is_empty() && self.resources.is_empty()
    }

    pub fn types(&self) -> &BTreeSet<String> {
        &self.types
    }

    pub fn namespaces(&self) -> &BTreeSet<NamespacePattern> {
        &self.namespaces
    }

    pub fn resources(&self) -> &BTreeSet<ResourceGrant> {
        &self.resources
    }

    pub fn admits(&self, symbol: &Symbol) -> bool {
        match symbol {
            Symbol::Type(name) => {
                self.types.contains(name)
                    || self
                        .namespaces
                        .iter()
                        .any(|p| p.matches(namespace_of(name)))
            }
            Symbol::Resource(path) => self.resources.iter().any(|r| r.admits(path)),
        }
    }
}
