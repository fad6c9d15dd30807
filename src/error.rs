use std::io;
use thiserror::Error;

/// Failure of a durable store operation.
///
/// Never fatal: reads that fail are treated as a cache miss and writes that
/// fail are logged and dropped by the callers in [`crate::view`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("value for '{key}' is {size} bytes, over the {limit} byte quota")]
    QuotaExceeded { key: String, size: usize, limit: usize },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("background store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failure to obtain the remote dataset.
#[derive(Debug, Error)]
pub enum FetchError {
    #[cfg(feature = "web")]
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("dataset endpoint answered with status {0}")]
    Status(u16),

    #[error("dataset payload could not be parsed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("failed to load dataset: {0}")]
    Fetch(#[from] FetchError),

    #[error("the dataset is not loaded yet")]
    NotReady,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
