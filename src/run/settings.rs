use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::request::RunRequest;
use super::workspace::RunWorkspace;
use crate::subprocess::{ProcessCommand, ProcessCommandBuilder};

/// How the external update tool is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Executable name or path, resolved through `PATH`.
    pub program: String,
    pub args: Vec<String>,
    pub platform: String,
    pub log_level: String,
    /// Time between SIGTERM and SIGKILL when a run is cancelled.
    #[serde(with = "humantime_serde")]
    pub termination_grace: Duration,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            program: "renovate".to_string(),
            args: Vec::new(),
            platform: "github".to_string(),
            log_level: "debug".to_string(),
            termination_grace: Duration::from_secs(2),
        }
    }
}

impl ToolSettings {
    /// Command for one run: credential and workspace go through the
    /// environment, the workspace is the working directory.
    pub fn command(&self, request: &RunRequest, workspace: &RunWorkspace) -> ProcessCommand {
        let config_path = workspace.config_path().to_string_lossy();
        let base_dir = workspace.path().to_string_lossy();

        ProcessCommandBuilder::new(&self.program)
            .args(&self.args)
            .secret_env("RENOVATE_TOKEN", request.credential())
            .secret_env("GITHUB_COM_TOKEN", request.credential())
            .env("RENOVATE_PLATFORM", &self.platform)
            .env("RENOVATE_CONFIG_FILE", &config_path)
            .env("RENOVATE_BASE_DIR", &base_dir)
            .env("LOG_LEVEL", &self.log_level)
            .env("LOG_FORMAT", "json")
            .env("RENOVATE_DRY_RUN", "true")
            .current_dir(workspace.path())
            .build()
    }
}
