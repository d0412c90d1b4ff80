use crate::subprocess::ProcessError;

/// Rejection of a malformed run request. Raised before any run state changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("GitHub token is required")]
    MissingCredential,

    #[error("Repository URL is required")]
    MissingRepository,

    #[error("Configuration is required")]
    MissingConfig,

    #[error("Invalid JSON configuration provided")]
    InvalidConfig(String),
}

/// Failure of an admitted run. Always terminal for the event stream.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to prepare run workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Failed to write run configuration: {0}")]
    ConfigWrite(#[from] serde_json::Error),

    #[error("Failed to start the update tool: {0}")]
    Spawn(#[source] ProcessError),

    #[error("Failed to read tool {stream}: {source}")]
    Output {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for the update tool: {0}")]
    Wait(#[source] ProcessError),
}
