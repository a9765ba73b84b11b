//! # Loggers
//!
//! `tracing` subscriber setup shared by the binaries.

/// Console + JSON file subscriber with old-log cleanup.
pub mod logger_setup;

pub use logger_setup::{cleanup_old_logs, setup_logging, LoggerError};
