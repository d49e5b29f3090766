use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad caller input. Never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Embedding, generation or index backend failed. Safe to retry at the caller's discretion.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Generation output did not match the requested structure. `raw` keeps the output for repair.
    #[error("Parse failed: {message}")]
    Parse { message: String, raw: String },

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn backend(err: impl Display) -> Self {
        Self::BackendUnavailable(err.to_string())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn parse(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Parse { message: message.into(), raw: raw.into() }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Raw generation output attached to a parse failure.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::Parse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
