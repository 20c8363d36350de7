//! Lock utilities
//!
//! Helpers for short, synchronous critical sections over `std::sync` locks.
//! A poisoned lock is recovered rather than propagated as a panic.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Acquire a read guard, recovering from poisoning
pub fn read_lock<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!("Recovering poisoned lock (read)");
        poisoned.into_inner()
    })
}

/// Acquire a write guard, recovering from poisoning
pub fn write_lock<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!("Recovering poisoned lock (write)");
        poisoned.into_inner()
    })
}

/// Execute a closure with a read lock, automatically releasing it
///
/// # Example
/// ```rust
/// use modhost::utils::with_read_lock;
/// use std::sync::RwLock;
///
/// let table = RwLock::new(vec![1, 2, 3]);
/// let len = with_read_lock(&table, |t| t.len());
/// assert_eq!(len, 3);
/// ```
pub fn with_read_lock<T, F, R>(rwlock: &RwLock<T>, f: F) -> R
where
    F: FnOnce(&T) -> R,
{
    let guard = read_lock(rwlock);
    f(&guard)
}
