//! Error handling utilities for graceful degradation
//!
//! Helpers for best-effort operations whose failure is logged, not propagated.

use tracing::warn;

/// Convert a Result to an Option, logging the error
///
/// # Example
/// ```rust
/// use modhost::utils::result_to_option;
///
/// assert_eq!(result_to_option("42".parse::<u32>(), "Failed to parse"), Some(42));
/// assert_eq!(result_to_option("x".parse::<u32>(), "Failed to parse"), None);
/// ```
pub fn result_to_option<T, E>(result: Result<T, E>, context: &str) -> Option<T>
where
    E: std::fmt::Display,
{
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {}", context, e);
            None
        }
    }
}
