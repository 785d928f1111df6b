//! Error taxonomy for the extraction and search core.
//!
//! The first four variants are surfaced verbatim to callers. The rest wrap
//! storage and encoding failures from snapshot persistence.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Raw content had no usable text or a malformed source URI.
    #[error("normalization failed: {0}")]
    Normalization(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Errors caused by caller input rather than by the index itself.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            Error::Normalization(_) | Error::InvalidDocument(_) | Error::InvalidQuery(_)
        )
    }
}
