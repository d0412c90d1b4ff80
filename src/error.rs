use thiserror::Error;

use crate::run::{RunError, ValidationError};
use crate::subprocess::ProcessError;
use crate::transport::{ClientError, DecodeError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Config(s)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
