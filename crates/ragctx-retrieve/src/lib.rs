//! Query-time context assembly: retrieval, scope filtering, image
//! cross-references and prompt formatting.
use thiserror::Error;

use ragctx_core::Error;

pub mod format;
pub mod retriever;
pub mod scope;

pub use format::{format_context, ContextTemplate, FormattedContext};
pub use retriever::{Retrieval, Retriever};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("query embedding failed: {0}")]
    Embedding(#[source] Error),

    #[error("index lookup failed: {0}")]
    Index(#[source] Error),
}

impl RetrievalError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidQuery(_) => false,
            Self::Embedding(e) | Self::Index(e) => e.is_retryable(),
        }
    }
}

impl From<RetrievalError> for Error {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::InvalidQuery(msg) => Error::Validation(msg),
            RetrievalError::Embedding(e) | RetrievalError::Index(e) => e,
        }
    }
}
