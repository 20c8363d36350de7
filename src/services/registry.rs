//! Service registry implementation
//!
//! One table behind a `std::sync::RwLock`; critical sections never await.
//! Every change bumps a `watch` generation counter so waiting lookups re-check
//! without holding any lock while suspended.

use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::module::traits::ModuleId;
use crate::services::ServiceError;
use crate::utils::{read_lock, write_lock};

/// Default upper bound between two re-checks of a waiting lookup
pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Registry key: capability type plus optional qualifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    capability: TypeId,
    capability_name: &'static str,
    qualifier: Option<String>,
}

impl ServiceKey {
    pub fn of<T: ?Sized + 'static>(qualifier: Option<&str>) -> Self {
        Self {
            capability: TypeId::of::<T>(),
            capability_name: std::any::type_name::<T>(),
            qualifier: qualifier.map(str::to_string),
        }
    }

    pub fn capability_name(&self) -> &'static str {
        self.capability_name
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}[{}]", self.capability_name, q),
            None => f.write_str(self.capability_name),
        }
    }
}

/// Metadata of one visible registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRegistrationInfo {
    pub capability: &'static str,
    pub qualifier: Option<String>,
    pub owner: ModuleId,
    /// Monotonic publish counter; later publishes carry larger values
    pub sequence: u64,
    #[serde(skip)]
    pub published_at: Instant,
}

struct Registration {
    info: ServiceRegistrationInfo,
    /// Always an `Arc<T>` for the key's capability `T`
    instance: Arc<dyn Any + Send + Sync>,
}

/// Process-wide table of published capabilities
pub struct ServiceRegistry {
    entries: RwLock<HashMap<ServiceKey, Registration>>,
    sequence: AtomicU64,
    generation: watch::Sender<u64>,
    recheck_interval: Duration,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::with_recheck_interval(DEFAULT_RECHECK_INTERVAL)
    }

    pub fn with_recheck_interval(recheck_interval: Duration) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            entries: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            generation,
            recheck_interval,
        }
    }

    pub fn recheck_interval(&self) -> Duration {
        self.recheck_interval
    }

    /// Publish `instance` under `(T, qualifier)`
    ///
    /// Replaces any existing registration for the key. Visible to every lookup
    /// that starts after this returns.
    pub fn publish<T>(
        &self,
        qualifier: Option<&str>,
        instance: Arc<T>,
        owner: &ModuleId,
    ) -> ServiceRegistrationInfo
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<T>(qualifier);
        let instance: Arc<dyn Any + Send + Sync> = Arc::new(instance);

        let (info, replaced) = {
            let mut entries = write_lock(&self.entries);
            // Numbered under the lock so a replacement always carries a larger sequence
            let info = ServiceRegistrationInfo {
                capability: key.capability_name,
                qualifier: key.qualifier.clone(),
                owner: owner.clone(),
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
                published_at: Instant::now(),
            };
            let registration = Registration {
                info: info.clone(),
                instance,
            };
            (info, entries.insert(key.clone(), registration))
        };
        match replaced {
            Some(old) => debug!(
                "Service {} republished by {} (was {})",
                key, owner, old.info.owner
            ),
            None => debug!("Service {} published by {}", key, owner),
        }
        self.notify();
        info
    }

    /// Non-blocking lookup
    pub fn lookup<T>(&self, qualifier: Option<&str>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<T>(qualifier);
        let entries = read_lock(&self.entries);
        entries
            .get(&key)
            .and_then(|r| r.instance.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// Lookup, waiting up to `timeout` for the service to be published
    ///
    /// Suspends only the calling task. Re-checks on every registry change and
    /// at least every recheck interval. A timeout too large to represent as a
    /// deadline waits until the service appears.
    pub async fn lookup_with_wait<T>(
        &self,
        qualifier: Option<&str>,
        timeout: Duration,
    ) -> Result<Arc<T>, ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.wait_for::<T>(qualifier, timeout, None).await
    }

    /// Like [`lookup_with_wait`](Self::lookup_with_wait), but gives up with
    /// [`ServiceError::Cancelled`] once `cancel` fires
    pub async fn lookup_with_wait_cancellable<T>(
        &self,
        qualifier: Option<&str>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Arc<T>, ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.wait_for::<T>(qualifier, timeout, Some(cancel)).await
    }

    async fn wait_for<T>(
        &self,
        qualifier: Option<&str>,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Arc<T>, ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let started = tokio::time::Instant::now();
        let deadline = started.checked_add(timeout);
        let mut changes = self.generation.subscribe();

        loop {
            // Mark the current generation seen before looking, so a publish
            // racing with the lookup still wakes us.
            let generation = *changes.borrow_and_update();
            if let Some(found) = self.lookup::<T>(qualifier) {
                return Ok(found);
            }

            let now = tokio::time::Instant::now();
            let remaining = match deadline {
                Some(deadline) if now >= deadline => {
                    return Err(ServiceError::ServiceNotAvailable {
                        service: ServiceKey::of::<T>(qualifier).to_string(),
                        waited: now - started,
                    });
                }
                Some(deadline) => deadline - now,
                None => self.recheck_interval,
            };
            trace!(
                "Waiting for {} (generation {})",
                ServiceKey::of::<T>(qualifier),
                generation
            );

            let pause = remaining.min(self.recheck_interval);
            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(ServiceError::Cancelled {
                                service: ServiceKey::of::<T>(qualifier).to_string(),
                            });
                        }
                        _ = tokio::time::timeout(pause, changes.changed()) => {}
                    }
                }
                None => {
                    let _ = tokio::time::timeout(pause, changes.changed()).await;
                }
            }
        }
    }

    /// Remove the registration for `(T, qualifier)`
    ///
    /// Only the current owner may withdraw. Returns `Ok(false)` when nothing
    /// is registered under the key.
    pub fn withdraw<T>(&self, qualifier: Option<&str>, owner: &ModuleId) -> Result<bool, ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<T>(qualifier);
        {
            let mut entries = write_lock(&self.entries);
            let current = entries.get(&key).map(|r| r.info.owner.clone());
            match current {
                None => return Ok(false),
                Some(current) if &current != owner => {
                    return Err(ServiceError::UnauthorizedWithdraw {
                        service: key.to_string(),
                        owner: current,
                        requester: owner.clone(),
                    });
                }
                Some(_) => {
                    entries.remove(&key);
                }
            }
        }
        debug!("Service {} withdrawn by {}", key, owner);
        self.notify();
        Ok(true)
    }

    /// Remove every registration owned by `owner`; returns how many were removed
    pub fn withdraw_all_owned_by(&self, owner: &ModuleId) -> usize {
        let removed = {
            let mut entries = write_lock(&self.entries);
            let before = entries.len();
            entries.retain(|_, r| &r.info.owner != owner);
            before - entries.len()
        };
        if removed > 0 {
            debug!("Withdrew {} service(s) owned by {}", removed, owner);
            self.notify();
        }
        removed
    }

    /// Snapshot of every visible registration, in publish order
    pub fn registrations(&self) -> Vec<ServiceRegistrationInfo> {
        let mut infos: Vec<_> = read_lock(&self.entries)
            .values()
            .map(|r| r.info.clone())
            .collect();
        infos.sort_by_key(|i| i.sequence);
        infos
    }

    pub fn len(&self) -> usize {
        read_lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self) {
        self.generation.send_modify(|g| *g = g.wrapping_add(1));
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.len())
            .field("recheck_interval", &self.recheck_interval)
            .finish()
    }
}
