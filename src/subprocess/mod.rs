//! External tool process management

pub mod builder;
pub mod error;
pub mod runner;

pub use builder::ProcessCommandBuilder;
pub use error::ProcessError;
pub use runner::{spawn_streaming, ExitStatus, ProcessCommand, ToolProcess};
