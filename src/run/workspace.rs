use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::error::RunError;

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Private scratch directory for one run, holding the generated tool config.
///
/// The directory is removed by [`RunWorkspace::release`], or on drop if the
/// run unwinds before reaching it.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
    config_path: PathBuf,
}

impl RunWorkspace {
    pub fn create() -> Result<Self, RunError> {
        let dir = tempfile::Builder::new()
            .prefix("renovate-")
            .tempdir()
            .map_err(RunError::Workspace)?;
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        tracing::debug!("Created run workspace at {}", dir.path().display());
        Ok(Self { dir, config_path })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Write the tool configuration as pretty-printed JSON.
    pub fn write_config(&self, config: &serde_json::Value) -> Result<(), RunError> {
        let contents = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.config_path, contents).map_err(RunError::Workspace)?;
        Ok(())
    }

    /// Remove the directory. Failures are logged, never raised.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::debug!("Removed run workspace {}", path.display()),
            Err(e) => tracing::warn!("Failed to remove run workspace {}: {}", path.display(), e),
        }
    }
}
