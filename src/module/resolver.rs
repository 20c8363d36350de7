//! Resolution builder
//!
//! Builds a module's [`IsolationContext`]: its own code first, then the grants
//! of each ordered peer, then the shared base.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::module::isolation::{
    Grant, GroupOwner, IsolationContext, SharedBase, SymbolGroup, Visibility,
};
use crate::module::registry::descriptor::ModuleDescriptor;

/// Stateless builder of isolation contexts
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionBuilder;

impl ResolutionBuilder {
    /// What `peer` grants to `module`, or `None` when it contributes nothing
    pub fn grant(module: &ModuleDescriptor, peer: &ModuleDescriptor) -> Option<Grant> {
        if !peer.is_plugin() || peer.id() == module.id() {
            return None;
        }
        let grant = peer.exports().grant(module.imports(), module.denies());
        (!grant.is_empty()).then_some(grant)
    }

    /// Build the isolation context of `descriptor`
    ///
    /// `peers` must already be in peer order. Satisfiability is not checked
    /// here; a missing symbol surfaces only when it is required.
    pub fn resolve(
        descriptor: &ModuleDescriptor,
        peers: &[Arc<ModuleDescriptor>],
        shared_base: &SharedBase,
    ) -> IsolationContext {
        let mut groups = Vec::with_capacity(peers.len() + 2);
        groups.push(SymbolGroup::new(
            GroupOwner::SelfModule(descriptor.id().clone()),
            descriptor.code_paths().clone(),
            Visibility::All,
        ));

        for peer in peers {
            match Self::grant(descriptor, peer) {
                Some(grant) => {
                    trace!("{} grants {:?} to {}", peer.id(), grant, descriptor.id());
                    groups.push(SymbolGroup::new(
                        GroupOwner::Peer(peer.id().clone()),
                        peer.code_paths().clone(),
                        Visibility::Granted(grant),
                    ));
                }
                None => trace!("{} contributes nothing to {}", peer.id(), descriptor.id()),
            }
        }

        groups.push(SymbolGroup::new(
            GroupOwner::SharedBase,
            shared_base.code_paths().clone(),
            Visibility::AllExceptDenied,
        ));

        debug!(
            "Resolved {} with {} peer group(s)",
            descriptor.id(),
            groups.len() - 2
        );
        IsolationContext::new(descriptor.id().clone(), groups, descriptor.denies().clone())
    }
}
