//! Tool runs: request validation, single-run admission and the controller
//! that drives one subprocess from spawn to terminal event.

pub mod admission;
pub mod controller;
pub mod error;
pub mod exit;
pub mod request;
pub mod settings;
pub mod workspace;

pub use admission::{AdmissionGate, AdmissionToken};
pub use controller::{RunController, RunStream, ALREADY_RUNNING_MESSAGE, COMPLETE_MESSAGE};
pub use error::{RunError, ValidationError};
pub use exit::ExitPolicy;
pub use request::{RunRequest, RunRequestBody};
pub use settings::ToolSettings;
pub use workspace::RunWorkspace;
