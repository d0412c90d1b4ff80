//! Error handling utilities

use tracing::error;

use crate::error::Error;
use crate::transport::ClientError;

/// Exit code for bad arguments, configuration or rejected requests.
const ARGUMENT_ERROR: i32 = 2;
const GENERAL_ERROR: i32 = 1;

/// Print a fatal error and exit.
///
/// The error chain is shown in verbose mode.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);
    eprintln!("Error: {error}");

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code(&error))
}

fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<Error>() {
        Some(Error::Config(_) | Error::Toml(_) | Error::Validation(_)) => ARGUMENT_ERROR,
        Some(Error::Client(ClientError::Status { status, .. })) if *status == 400 => ARGUMENT_ERROR,
        _ => GENERAL_ERROR,
    }
}
