// src/error.rs

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("perception engine failed: {0}")]
    Perception(String),

    #[error("head `{head}` failed: {reason}")]
    Head { head: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("evidence encoding failed: {0}")]
    Encoding(String),

    #[error("evidence store unavailable: {0}")]
    Unavailable(String),
}
