//! Application configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables. Command-line flags are applied last by the binary.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{Error, Result};
use crate::run::{ExitPolicy, ToolSettings};

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Verbosity level for logging, from the command line only
    #[serde(skip)]
    pub verbose: u8,
    pub host: String,
    pub port: u16,
    /// Browser origin allowed to call the API
    pub cors_origin: String,
    pub tool: ToolSettings,
    pub exit_policy: ExitPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            host: "0.0.0.0".to_string(),
            port: 3333,
            cors_origin: "http://localhost:4200".to_string(),
            tool: ToolSettings::default(),
            exit_policy: ExitPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Load defaults, overlay `path` when given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.merge_env_vars();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn merge_env_vars(&mut self) {
        self.merge_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn merge_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }

        if let Some(port) = lookup("PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT value: {}", port),
            }
        }

        if let Some(origin) = lookup("CORS_ORIGIN") {
            self.cors_origin = origin;
        }

        if let Some(program) = lookup("PLAYGROUND_TOOL") {
            self.tool.program = program;
        }

        if let Some(args) = lookup("PLAYGROUND_TOOL_ARGS") {
            self.tool.args = args.split_whitespace().map(str::to_string).collect();
        }

        if let Some(platform) = lookup("PLAYGROUND_PLATFORM") {
            self.tool.platform = platform;
        }

        if let Some(max) = lookup("PLAYGROUND_MAX_NON_FATAL_EXIT") {
            match max.parse::<i32>() {
                Ok(max) => self.exit_policy.max_non_fatal_code = max,
                Err(_) => tracing::warn!(
                    "Ignoring invalid PLAYGROUND_MAX_NON_FATAL_EXIT value: {}",
                    max
                ),
            }
        }
    }

    /// Resolve `host:port` to a listen address. `host` may be an IP literal
    /// or a name such as `localhost`.
    pub async fn socket_addr(&self) -> Result<SocketAddr> {
        let invalid = |reason: String| {
            Error::Config(format!("Invalid listen address {}:{}: {}", self.host, self.port, reason))
        };

        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("host did not resolve".to_string()))
    }

    /// Get the log level string based on verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            2 => "trace",
            _ => "trace,hyper=debug,tower=debug",
        }
    }
}
