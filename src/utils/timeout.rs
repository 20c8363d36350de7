//! Timeout utilities
//!
//! Timeout wrappers for operations that might hang, such as a module's
//! activator.

use std::time::Duration;
use tokio::time::{error::Elapsed, timeout};

/// Execute operation with an optional timeout
///
/// `None` awaits the operation without a bound.
pub async fn with_optional_timeout<F, T>(
    operation: F,
    duration: Option<Duration>,
) -> Result<T, Elapsed>
where
    F: std::future::Future<Output = T>,
{
    match duration {
        Some(d) => timeout(d, operation).await,
        None => Ok(operation.await),
    }
}
