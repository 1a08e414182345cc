//! Logging and diagnostics

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogGuard, LoggingError};
