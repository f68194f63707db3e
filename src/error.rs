use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Invalid source reference '{0}': expected scheme://bucket/path")]
    InvalidSourceRef(String),

    #[error("Override references unknown field(s): {}", .0.join(", "))]
    UnknownOverrideField(Vec<String>),

    #[error("Invalid override payload: {0}")]
    InvalidOverride(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid layout data: {0}")]
    InvalidLayout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Oracle call timed out after {0:?}")]
    OracleTimeout(Duration),

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("{service} rejected the request (status {status}): {message}")]
    RequestRejected {
        service: String,
        status: u16,
        message: String,
    },

    #[error("Unknown mapping id(s): {} ({applied} valid id(s) applied)", .ids.join(", "))]
    UnknownMappings { ids: Vec<String>, applied: usize },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[cfg(feature = "gcp")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl MappingError {
    /// Transport-class failures: the caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            MappingError::Transport(_)
            | MappingError::OracleTimeout(_)
            | MappingError::OracleUnavailable(_) => true,
            #[cfg(feature = "gcp")]
            MappingError::Http(_) => true,
            _ => false,
        }
    }

    /// Ids a batch review operation could not resolve, if this is that error.
    pub fn unresolved_ids(&self) -> Option<&[String]> {
        match self {
            MappingError::UnknownMappings { ids, .. } => Some(ids),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MappingError>;
