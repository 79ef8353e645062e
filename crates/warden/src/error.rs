use thiserror::Error;

/// Error type for the Warden service and binary, aggregating the policy
/// engine's errors with configuration and I/O failures.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("policy error: {0}")]
    Policy(#[from] warden_policy::PolicyError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for WardenError {
    fn from(e: serde_json::Error) -> Self {
        WardenError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for WardenError {
    fn from(e: toml::de::Error) -> Self {
        WardenError::Config(format!("TOML parse error: {}", e))
    }
}

pub type WardenResult<T> = Result<T, WardenError>;
