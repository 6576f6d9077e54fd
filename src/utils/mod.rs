//! Utilities module for logging and error handling
//!
//! - Structured logging with tracing
//! - Error handling types

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{AgroDetectError, Result};
pub use logging::{init_logging, LogConfig, LogLevel};

/// Format a duration in milliseconds for log lines
pub fn format_millis(duration: std::time::Duration) -> String {
    format!("{:.1}ms", duration.as_secs_f64() * 1000.0)
}
