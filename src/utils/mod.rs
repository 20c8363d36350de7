//! Utility modules for fault tolerance and logging

pub mod error;
pub mod lock;
pub mod logging;
pub mod timeout;

// Re-export commonly used items
pub use error::result_to_option;
pub use lock::{read_lock, with_read_lock, write_lock};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use logging::{init_logging, init_logging_from_config};
pub use timeout::with_optional_timeout;
