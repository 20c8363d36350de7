//! Module manager for orchestrating all modules
//!
//! Drives each module through its lifecycle, invokes activators in dependency
//! order and keeps every module's isolation context current.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::KernelConfig;
use crate::module::api::ModuleContext;
use crate::module::isolation::{GroupOwner, IsolationContext, SharedBase};
use crate::module::registry::{order_peers, ModuleDependencies, ModuleDescriptor};
use crate::module::resolver::ResolutionBuilder;
use crate::module::traits::{ModuleError, ModuleId, ModuleKind, ModuleState};
use crate::services::ServiceRegistry;
use crate::utils::{read_lock, result_to_option, with_optional_timeout, with_read_lock, write_lock};

/// Serializable snapshot of one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleReport {
    pub id: ModuleId,
    pub priority: i32,
    pub state: ModuleState,
    pub last_error: Option<String>,
    /// Owners of the resolved groups, in resolution order
    pub groups: Vec<GroupOwner>,
    /// Id of the current (or last) activation
    pub instance_id: Option<Uuid>,
    /// Whether the module was removed from the live table
    pub archived: bool,
}

/// Outcome of [`ModuleManager::start_all`]
#[derive(Debug, Default)]
pub struct StartReport {
    pub started: Vec<ModuleId>,
    pub failed: Vec<(ModuleId, ModuleError)>,
}

impl StartReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of [`ModuleManager::stop_all`]
#[derive(Debug, Default)]
pub struct StopReport {
    pub stopped: Vec<ModuleId>,
    pub failed: Vec<(ModuleId, ModuleError)>,
}

/// Lifecycle settings of the manager
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub start_timeout: Option<Duration>,
    pub withdraw_services_on_stop: bool,
    /// Default timeout of `ServiceReference::wait_default`
    pub default_wait: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&KernelConfig::default())
    }
}

impl From<&KernelConfig> for ManagerSettings {
    fn from(config: &KernelConfig) -> Self {
        Self {
            start_timeout: config.lifecycle.start_timeout(),
            withdraw_services_on_stop: config.lifecycle.withdraw_services_on_stop,
            default_wait: config.services.default_wait_timeout(),
        }
    }
}

/// Mutable part of a managed module; only touched in short critical sections
struct ModuleStatus {
    state: ModuleState,
    context: Arc<IsolationContext>,
    last_error: Option<String>,
    activation: Option<ModuleContext>,
}

/// Managed module instance
struct ManagedModule {
    descriptor: Arc<ModuleDescriptor>,
    status: RwLock<ModuleStatus>,
    /// Serializes transitions of this module; held across activator calls
    transition: Mutex<()>,
}

impl ManagedModule {
    fn state(&self) -> ModuleState {
        with_read_lock(&self.status, |s| s.state)
    }

    fn set_state(&self, next: ModuleState) {
        let mut status = write_lock(&self.status);
        debug_assert!(
            status.state.can_transition_to(next),
            "illegal transition {} -> {}",
            status.state,
            next
        );
        status.state = next;
    }

    fn report(&self, archived: bool) -> ModuleReport {
        let status = read_lock(&self.status);
        ModuleReport {
            id: self.descriptor.id().clone(),
            priority: self.descriptor.priority(),
            state: status.state,
            last_error: status.last_error.clone(),
            groups: status
                .context
                .groups()
                .iter()
                .map(|g| g.owner().clone())
                .collect(),
            instance_id: status.activation.as_ref().map(ModuleContext::instance_id),
            archived,
        }
    }
}

/// Module manager coordinates all registered modules
pub struct ModuleManager {
    /// Registered modules; held only for snapshot/insert sections
    modules: RwLock<BTreeMap<ModuleId, Arc<ManagedModule>>>,
    /// Reports of replaced or unregistered modules
    archived: RwLock<Vec<ModuleReport>>,
    services: Arc<ServiceRegistry>,
    shared_base: SharedBase,
    settings: ManagerSettings,
}

impl ModuleManager {
    /// Create a new module manager
    pub fn new(services: Arc<ServiceRegistry>, shared_base: SharedBase) -> Self {
        Self::with_settings(services, shared_base, ManagerSettings::default())
    }

    /// Create a new module manager with explicit lifecycle settings
    pub fn with_settings(
        services: Arc<ServiceRegistry>,
        shared_base: SharedBase,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            modules: RwLock::new(BTreeMap::new()),
            archived: RwLock::new(Vec::new()),
            services,
            shared_base,
            settings,
        }
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn shared_base(&self) -> &SharedBase {
        &self.shared_base
    }

    /// Register a descriptor and resolve its isolation context
    ///
    /// A non-terminal module with the same identity makes this fail with
    /// [`ModuleError::AlreadyRegistered`]; a terminal one is archived and
    /// replaced.
    pub fn register(&self, descriptor: ModuleDescriptor) -> Result<ModuleId, ModuleError> {
        let descriptor = Arc::new(descriptor);
        let id = descriptor.id().clone();
        debug!("Module {} is {}", id, ModuleState::Created);

        let peers = self.ordered_peers();
        let context = ResolutionBuilder::resolve(&descriptor, &peers, &self.shared_base);
        let managed = Arc::new(ManagedModule {
            descriptor,
            status: RwLock::new(ModuleStatus {
                state: ModuleState::Resolved,
                context: Arc::new(context),
                last_error: None,
                activation: None,
            }),
            transition: Mutex::new(()),
        });

        let replaced = {
            let mut modules = write_lock(&self.modules);
            if let Some(existing) = modules.get(&id) {
                if !existing.state().is_terminal() {
                    return Err(ModuleError::AlreadyRegistered(id));
                }
            }
            modules.insert(id.clone(), managed)
        };
        if let Some(old) = replaced {
            info!("Replacing terminal module {}", id);
            write_lock(&self.archived).push(old.report(true));
        }

        info!("Registered module {} ({})", id, ModuleState::Resolved);
        Ok(id)
    }

    /// Start a resolved module
    ///
    /// Every plugin contributing a group to the module must be `Activated`.
    /// An activator error, panic or timeout leaves the module `Broken` and
    /// withdraws its services.
    pub async fn start(&self, id: &ModuleId) -> Result<(), ModuleError> {
        let module = self.get(id)?;
        let _transition = module.transition.lock().await;

        let state = module.state();
        if state != ModuleState::Resolved {
            return Err(ModuleError::InvalidTransition {
                module: id.clone(),
                from: state,
                to: ModuleState::Starting,
            });
        }

        let peers = self.ordered_peers();
        let context = Arc::new(ResolutionBuilder::resolve(
            &module.descriptor,
            &peers,
            &self.shared_base,
        ));
        // Plugins importing from each other cannot all wait for one another;
        // inside such a cycle a resolved or starting peer is good enough.
        let cycle = if module.descriptor.is_plugin() {
            ModuleDependencies::resolve(&peers)
                .cycle_of(id)
                .map(<[ModuleId]>::to_vec)
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        for peer in context.peers() {
            let peer_state = self.state(peer).unwrap_or(ModuleState::Stopped);
            let in_cycle = cycle.contains(peer)
                && matches!(peer_state, ModuleState::Resolved | ModuleState::Starting);
            if peer_state != ModuleState::Activated && !in_cycle {
                warn!(
                    "Cannot start {}: dependency {} is {}",
                    id, peer, peer_state
                );
                return Err(ModuleError::DependencyNotActive {
                    module: id.clone(),
                    dependency: peer.clone(),
                    state: peer_state,
                });
            }
        }

        let activation = ModuleContext::new(
            Arc::clone(&context),
            Arc::clone(&self.services),
            self.settings.default_wait,
        );
        {
            let mut status = write_lock(&module.status);
            status.context = context;
            status.state = ModuleState::Starting;
            status.activation = Some(activation.clone());
        }
        info!("Starting module {} (instance {})", id, activation.instance_id());

        match self.run_start(&module, &activation).await {
            Ok(()) => {
                module.set_state(ModuleState::Activated);
                info!("Module {} activated", id);
                Ok(())
            }
            Err(reason) => {
                self.mark_broken(&module, reason.clone());
                Err(ModuleError::StartFailed {
                    module: id.clone(),
                    reason,
                })
            }
        }
    }

    async fn run_start(&self, module: &ManagedModule, activation: &ModuleContext) -> Result<(), String> {
        let Some(activator) = module.descriptor.activator().cloned() else {
            return Ok(());
        };

        let task_context = activation.clone();
        let mut handle = tokio::spawn(async move { activator.start(&task_context).await });
        match with_optional_timeout(&mut handle, self.settings.start_timeout).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join_error)) => Err(format!("activator panicked: {}", join_error)),
            Err(_) => {
                handle.abort();
                Err(format!(
                    "activator did not start within {:?}",
                    self.settings.start_timeout.unwrap_or_default()
                ))
            }
        }
    }

    fn mark_broken(&self, module: &ManagedModule, reason: String) {
        let id = module.descriptor.id();
        {
            let mut status = write_lock(&module.status);
            status.state = ModuleState::Broken;
            status.last_error = Some(reason.clone());
        }
        let withdrawn = self.services.withdraw_all_owned_by(id);
        error!(
            "Module {} is broken: {} ({} service(s) withdrawn)",
            id, reason, withdrawn
        );
    }

    /// Report a runtime failure of an activated module
    ///
    /// The module becomes `Broken`, its services are withdrawn and it no
    /// longer takes part in peer ordering.
    pub async fn report_failure(&self, id: &ModuleId, reason: impl Into<String>) -> Result<(), ModuleError> {
        let module = self.get(id)?;
        let _transition = module.transition.lock().await;

        let state = module.state();
        if state != ModuleState::Activated {
            return Err(ModuleError::InvalidTransition {
                module: id.clone(),
                from: state,
                to: ModuleState::Broken,
            });
        }
        self.mark_broken(&module, reason.into());
        Ok(())
    }

    /// Stop an activated module
    ///
    /// The activator's `stop` is best-effort: its errors and panics are
    /// logged, never propagated.
    pub async fn stop(&self, id: &ModuleId) -> Result<(), ModuleError> {
        let module = self.get(id)?;
        let _transition = module.transition.lock().await;

        let state = module.state();
        if state != ModuleState::Activated {
            return Err(ModuleError::InvalidTransition {
                module: id.clone(),
                from: state,
                to: ModuleState::Stopping,
            });
        }
        module.set_state(ModuleState::Stopping);
        info!("Stopping module {}", id);

        let activation = with_read_lock(&module.status, |s| s.activation.clone());
        if let (Some(activator), Some(activation)) =
            (module.descriptor.activator().cloned(), activation)
        {
            let handle = tokio::spawn(async move { activator.stop(&activation).await });
            if let Some(outcome) =
                result_to_option(handle.await, &format!("Module {} panicked while stopping", id))
            {
                result_to_option(outcome, &format!("Module {} failed to stop cleanly", id));
            }
        }

        if self.settings.withdraw_services_on_stop {
            let withdrawn = self.services.withdraw_all_owned_by(id);
            debug!("Withdrew {} service(s) of stopped module {}", withdrawn, id);
        }
        module.set_state(ModuleState::Stopped);
        info!("Module {} stopped", id);
        Ok(())
    }

    /// Start every resolved module in dependency order
    ///
    /// Members of an import cycle start one after another in peer order. One
    /// module's failure never aborts the others.
    pub async fn start_all(&self) -> StartReport {
        let candidates = self.descriptors_in(ModuleState::Resolved);
        let resolution = ModuleDependencies::resolve(&candidates);
        let mut report = StartReport::default();

        for id in resolution.load_order {
            match self.start(&id).await {
                Ok(()) => report.started.push(id),
                Err(e) => {
                    warn!("Failed to start module {}: {}", id, e);
                    report.failed.push((id, e));
                }
            }
        }

        info!(
            "Started {} module(s), {} failed",
            report.started.len(),
            report.failed.len()
        );
        report
    }

    /// Stop every activated module, dependents before their providers
    pub async fn stop_all(&self) -> StopReport {
        let candidates = self.descriptors_in(ModuleState::Activated);
        let order = ModuleDependencies::resolve(&candidates).load_order;
        let mut report = StopReport::default();

        for id in order.into_iter().rev() {
            match self.stop(&id).await {
                Ok(()) => report.stopped.push(id),
                Err(e) => {
                    warn!("Error stopping module {}: {}", id, e);
                    report.failed.push((id, e));
                }
            }
        }
        report
    }

    /// Rebuild a resolved module's context against the current peers
    pub async fn refresh(&self, id: &ModuleId) -> Result<Arc<IsolationContext>, ModuleError> {
        let module = self.get(id)?;
        let _transition = module.transition.lock().await;

        let state = module.state();
        if state != ModuleState::Resolved {
            return Err(ModuleError::InvalidTransition {
                module: id.clone(),
                from: state,
                to: ModuleState::Resolved,
            });
        }

        let peers = self.ordered_peers();
        let context = Arc::new(ResolutionBuilder::resolve(
            &module.descriptor,
            &peers,
            &self.shared_base,
        ));
        write_lock(&module.status).context = Arc::clone(&context);
        debug!("Refreshed isolation context of {}", id);
        Ok(context)
    }

    /// Remove a module that is not running, archiving its report
    pub async fn unregister(&self, id: &ModuleId) -> Result<ModuleReport, ModuleError> {
        let module = self.get(id)?;
        let _transition = module.transition.lock().await;

        let state = module.state();
        if matches!(
            state,
            ModuleState::Starting | ModuleState::Activated | ModuleState::Stopping
        ) {
            return Err(ModuleError::OperationError(format!(
                "module {} is {}; stop it before unregistering",
                id, state
            )));
        }

        {
            let mut modules = write_lock(&self.modules);
            // A concurrent register may have replaced a terminal entry
            if modules.get(id).is_some_and(|m| Arc::ptr_eq(m, &module)) {
                modules.remove(id);
            }
        }
        let report = module.report(true);
        write_lock(&self.archived).push(report.clone());
        info!("Unregistered module {}", id);
        Ok(report)
    }

    /// Plugins eligible as peers, in peer order
    ///
    /// Recomputed from a copied snapshot on every call.
    pub fn ordered_peers(&self) -> Vec<Arc<ModuleDescriptor>> {
        let snapshot: Vec<Arc<ModuleDescriptor>> = with_read_lock(&self.modules, |modules| {
            modules
                .values()
                .filter(|m| m.descriptor.kind() == ModuleKind::Plugin && !m.state().is_terminal())
                .map(|m| Arc::clone(&m.descriptor))
                .collect()
        });
        order_peers(snapshot)
    }

    pub fn state(&self, id: &ModuleId) -> Option<ModuleState> {
        with_read_lock(&self.modules, |modules| modules.get(id).map(|m| m.state()))
    }

    pub fn descriptor(&self, id: &ModuleId) -> Option<Arc<ModuleDescriptor>> {
        with_read_lock(&self.modules, |modules| {
            modules.get(id).map(|m| Arc::clone(&m.descriptor))
        })
    }

    pub fn isolation_context(&self, id: &ModuleId) -> Option<Arc<IsolationContext>> {
        let module = with_read_lock(&self.modules, |modules| modules.get(id).cloned())?;
        let context = with_read_lock(&module.status, |s| Arc::clone(&s.context));
        Some(context)
    }

    pub fn last_error(&self, id: &ModuleId) -> Option<String> {
        let module = with_read_lock(&self.modules, |modules| modules.get(id).cloned())?;
        with_read_lock(&module.status, |s| s.last_error.clone())
    }

    /// Ids of all registered modules
    pub fn list_modules(&self) -> Vec<ModuleId> {
        with_read_lock(&self.modules, |modules| modules.keys().cloned().collect())
    }

    /// Reports of archived modules followed by the live ones
    pub fn reports(&self) -> Vec<ModuleReport> {
        let mut reports = read_lock(&self.archived).clone();
        let live: Vec<Arc<ManagedModule>> =
            with_read_lock(&self.modules, |modules| modules.values().cloned().collect());
        reports.extend(live.iter().map(|m| m.report(false)));
        reports
    }

    fn get(&self, id: &ModuleId) -> Result<Arc<ManagedModule>, ModuleError> {
        with_read_lock(&self.modules, |modules| modules.get(id).cloned())
            .ok_or_else(|| ModuleError::ModuleNotFound(id.clone()))
    }

    fn descriptors_in(&self, state: ModuleState) -> Vec<Arc<ModuleDescriptor>> {
        with_read_lock(&self.modules, |modules| {
            modules
                .values()
                .filter(|m| m.state() == state)
                .map(|m| Arc::clone(&m.descriptor))
                .collect()
        })
    }
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager")
            .field("modules", &self.list_modules())
            .field("settings", &self.settings)
            .finish()
    }
}
