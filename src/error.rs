use chrono::NaiveDateTime;
use thiserror::Error;

use crate::data::source::SourceRef;

/// Errors raised by the reader, loader and preprocessing layers.
#[derive(Error, Debug)]
pub enum McsError {
    /// The file (or URL) does not exist.
    #[error("{0} not found")]
    NotFound(SourceRef),

    /// The file exists but its contents do not match the product layout.
    #[error("{source_ref}: {reason}")]
    Format { source_ref: SourceRef, reason: String },

    #[error("request for {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("column '{0}' not present")]
    MissingColumn(String),

    #[error("cannot combine record sets with different columns")]
    SchemaMismatch,

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("invalid file stamp '{0}'")]
    InvalidStamp(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl McsError {
    pub fn format(source_ref: &SourceRef, reason: impl Into<String>) -> Self {
        McsError::Format {
            source_ref: source_ref.clone(),
            reason: reason.into(),
        }
    }

    /// Whether the error means the file could not be reached at all.
    pub fn is_not_found(&self) -> bool {
        matches!(self, McsError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, McsError>;
