//! Validated run requests

use super::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const GITHUB_PREFIXES: [&str; 2] = ["https://github.com/", "http://github.com/"];

/// Request body as accepted over HTTP. Every field is optional here so that
/// missing fields map to specific validation errors.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RunRequestBody {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub config: Option<Value>,
}

/// A run request whose three fields have been checked. Immutable.
#[derive(Clone)]
pub struct RunRequest {
    credential: String,
    repository: String,
    config: Map<String, Value>,
}

impl RunRequest {
    /// Validate the three request fields.
    ///
    /// `config` may be a JSON object or a string holding one.
    pub fn new(
        credential: impl Into<String>,
        repository: impl Into<String>,
        config: Value,
    ) -> Result<Self, ValidationError> {
        let credential = credential.into();
        let repository = repository.into();

        if credential.trim().is_empty() {
            return Err(ValidationError::MissingCredential);
        }
        let config = parse_config(config)?;
        if repository.trim().is_empty() {
            return Err(ValidationError::MissingRepository);
        }

        Ok(Self {
            credential,
            repository: repository.trim().to_string(),
            config,
        })
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// Repository reference in `owner/name` form.
    pub fn repository_slug(&self) -> String {
        let mut slug = self.repository.as_str();
        for prefix in GITHUB_PREFIXES {
            if let Some(rest) = slug.strip_prefix(prefix) {
                slug = rest;
                break;
            }
        }
        let slug = slug.trim_end_matches('/');
        slug.strip_suffix(".git").unwrap_or(slug).to_string()
    }

    /// Configuration handed to the tool: the caller's document with the target
    /// repository and dry-run mode forced.
    pub fn tool_config(&self) -> Value {
        let mut config = self.config.clone();
        config.insert(
            "repositories".to_string(),
            Value::Array(vec![Value::String(self.repository_slug())]),
        );
        config.insert("dryRun".to_string(), Value::Bool(true));
        Value::Object(config)
    }
}

impl fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRequest")
            .field("credential", &"<redacted>")
            .field("repository", &self.repository)
            .field("config_keys", &self.config.len())
            .finish()
    }
}

impl TryFrom<RunRequestBody> for RunRequest {
    type Error = ValidationError;

    fn try_from(body: RunRequestBody) -> Result<Self, Self::Error> {
        let credential = body
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or(ValidationError::MissingCredential)?;
        let config = body
            .config
            .filter(|c| !c.is_null())
            .ok_or(ValidationError::MissingConfig)?;
        let repository = body
            .repository
            .filter(|r| !r.trim().is_empty())
            .ok_or(ValidationError::MissingRepository)?;
        RunRequest::new(credential, repository, config)
    }
}

fn parse_config(config: Value) -> Result<Map<String, Value>, ValidationError> {
    match config {
        Value::Null => Err(ValidationError::MissingConfig),
        Value::Object(map) => Ok(map),
        Value::String(text) if text.trim().is_empty() => Err(ValidationError::MissingConfig),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ValidationError::InvalidConfig(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
            Err(e) => Err(ValidationError::InvalidConfig(e.to_string())),
        },
        other => Err(ValidationError::InvalidConfig(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
