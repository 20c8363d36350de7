//! Peer ordering
//!
//! Plugins contribute symbol groups to a module's isolation context in a
//! deterministic order: `(priority asc, name asc, version asc)`.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::module::registry::descriptor::ModuleDescriptor;

/// Compare two version strings component-wise
///
/// Components are split on `.`, `-` and `+`. Two numeric components compare
/// numerically, anything else lexicographically. A version that is a prefix of
/// another sorts first.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = a.split(['.', '-', '+']).collect();
    let right: Vec<&str> = b.split(['.', '-', '+']).collect();

    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => l.cmp(r),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

/// Total order used for peer contribution
pub fn peer_order(a: &ModuleDescriptor, b: &ModuleDescriptor) -> Ordering {
    a.priority()
        .cmp(&b.priority())
        .then_with(|| a.name().cmp(b.name()))
        .then_with(|| compare_versions(a.version(), b.version()))
}

/// Sort a copied snapshot of plugin descriptors into peer order
///
/// Non-plugin descriptors are dropped. Pure: the result depends only on the
/// input set, never on its order.
pub fn order_peers(snapshot: Vec<Arc<ModuleDescriptor>>) -> Vec<Arc<ModuleDescriptor>> {
    let mut peers: Vec<_> = snapshot.into_iter().filter(|d| d.is_plugin()).collect();
    peers.sort_by(|a, b| peer_order(a, b));
    peers
}
