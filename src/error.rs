//! Typed errors for the storage and assistant boundaries.
//!
//! Startup code wraps these in `anyhow`; background paths log and drop them.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(thiserror::Error, Debug)]
pub enum AssistantError {
    #[error("assistant api key is not configured (set GOOGLE_API_KEY or [assistant] api_key)")]
    MissingApiKey,

    #[error("completion api error: {status} {body}")]
    Api { status: u16, body: String },

    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("assistant is disabled")]
    Disabled,
}
