//! # Renovate Playground
//!
//! Runs the Renovate dependency-update tool in dry-run mode against one
//! repository and streams its progress to a browser or terminal client.
//!
//! ## Modules
//!
//! - `app` - Configuration loading, logging and fatal error reporting
//! - `subprocess` - Spawning and terminating the external tool
//! - `pipeline` - Line framing and classification of tool output
//! - `run` - Request validation, single-run admission and the run controller
//! - `transport` - Server-sent event encoding, frame decoding and the HTTP client
//! - `deps` - Aggregation of dependency upgrade candidates
//! - `server` - The HTTP API
pub mod app;
pub mod deps;
pub mod error;
pub mod pipeline;
pub mod run;
pub mod server;
pub mod subprocess;
pub mod transport;

pub use error::{Error, Result};
