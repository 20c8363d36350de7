//! Module context
//!
//! The handle passed to a module's activator. It is the only way module code
//! reaches the service registry.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::module::isolation::{IsolationContext, Symbol, SymbolGroup};
use crate::module::traits::{ModuleError, ModuleId};
use crate::services::{ServiceError, ServiceRegistrationInfo, ServiceRegistry};

/// Context handed to [`ModuleActivator`](crate::module::traits::ModuleActivator)
#[derive(Clone)]
pub struct ModuleContext {
    module: ModuleId,
    /// Unique per activation
    instance_id: Uuid,
    isolation: Arc<IsolationContext>,
    services: Arc<ServiceRegistry>,
    default_wait: Duration,
}

impl ModuleContext {
    pub fn new(
        isolation: Arc<IsolationContext>,
        services: Arc<ServiceRegistry>,
        default_wait: Duration,
    ) -> Self {
        Self {
            module: isolation.module().clone(),
            instance_id: Uuid::new_v4(),
            isolation,
            services,
            default_wait,
        }
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn isolation(&self) -> &Arc<IsolationContext> {
        &self.isolation
    }

    /// Resolve a symbol this module must be able to see
    pub fn require_symbol(&self, symbol: &Symbol) -> Result<&SymbolGroup, ModuleError> {
        self.isolation.require(symbol)
    }

    /// Publish a capability owned by this module
    pub fn publish<T>(&self, instance: Arc<T>, qualifier: Option<&str>) -> ServiceRegistrationInfo
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services.publish(qualifier, instance, &self.module)
    }

    /// Reference a capability, published or not yet published
    pub fn reference_service<T>(&self, qualifier: Option<&str>) -> ServiceReference<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        ServiceReference {
            services: Arc::clone(&self.services),
            qualifier: qualifier.map(str::to_string),
            default_wait: self.default_wait,
            _capability: PhantomData,
        }
    }

    /// Withdraw a capability this module published
    pub fn withdraw<T>(&self, qualifier: Option<&str>) -> Result<bool, ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services.withdraw::<T>(qualifier, &self.module)
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("module", &self.module)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

/// Lazily resolved handle to a capability `T`
pub struct ServiceReference<T: ?Sized> {
    services: Arc<ServiceRegistry>,
    qualifier: Option<String>,
    default_wait: Duration,
    _capability: PhantomData<fn() -> Arc<T>>,
}

impl<T> ServiceReference<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Current registration, if any
    pub fn get(&self) -> Option<Arc<T>> {
        self.services.lookup::<T>(self.qualifier.as_deref())
    }

    pub async fn wait(&self, timeout: Duration) -> Result<Arc<T>, ServiceError> {
        self.services
            .lookup_with_wait::<T>(self.qualifier.as_deref(), timeout)
            .await
    }

    /// Wait using the configured default timeout
    pub async fn wait_default(&self) -> Result<Arc<T>, ServiceError> {
        self.wait(self.default_wait).await
    }

    pub async fn wait_cancellable(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Arc<T>, ServiceError> {
        self.services
            .lookup_with_wait_cancellable::<T>(self.qualifier.as_deref(), timeout, cancel)
            .await
    }
}

impl<T: ?Sized> Clone for ServiceReference<T> {
    fn clone(&self) -> Self {
        Self {
            services: Arc::clone(&self.services),
            qualifier: self.qualifier.clone(),
            default_wait: self.default_wait,
            _capability: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ServiceReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("capability", &std::any::type_name::<T>())
            .field("qualifier", &self.qualifier)
            .finish()
    }
}
