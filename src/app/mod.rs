//! Application module
//!
//! Configuration loading, logging setup and fatal error reporting for the
//! binary.

pub mod config;
pub mod error_handling;
pub mod logging;

pub use config::AppConfig;
pub use error_handling::handle_fatal_error;
pub use logging::{init_logging, init_tracing};
