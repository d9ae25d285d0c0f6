// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`KvStore`](crate::store::KvStore) backend.
///
/// Store failures are never recovered locally: every ledger write has to land
/// for the counts to stay honest, so callers propagate these unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Key {key} holds a value of the wrong type")]
    WrongType { key: String },
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from decoding compressed job arguments.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Compressed payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Failed to inflate compressed payload: {0}")]
    Inflate(#[from] std::io::Error),

    #[error("Inflated payload is not a JSON argument list: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed compressed envelope: {0}")]
    Envelope(String),
}

/// Errors from the execution queue used by `retry`.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Failed to enqueue {class_name}: {message}")]
    Enqueue { class_name: String, message: String },

    #[error("Queue store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from loading or validating [`HistorySettings`](crate::config::HistorySettings).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid setting `{field}`: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Top-level error for ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Argument codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
