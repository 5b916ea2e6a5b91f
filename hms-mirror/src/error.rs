use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Retry error: {0}")]
    Retry(String),

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("{0}")]
    Dispatch(String),

    #[error("Connection error ({environment}): {reason}")]
    Connection { environment: String, reason: String },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
