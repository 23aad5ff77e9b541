//! Error types for rangeprobe-media.

use std::io;
use thiserror::Error;

/// Result type for rangeprobe-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for rangeprobe-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The source identifier is not accepted by the byte source.
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// The transport returned no payload.
    #[error("Empty body: {0}")]
    EmptyBody(String),

    /// The transport did not report a total length.
    #[error("Length unavailable: {0}")]
    LengthUnavailable(String),

    /// The source ended before the bytes a structure demanded.
    #[error("Truncated source at offset {offset}: need {needed} bytes, have {available}")]
    TruncatedSource {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// The prefix did not match any supported container grammar.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A box or element declared a size inconsistent with its bounds.
    #[error("Malformed structure at offset {offset}: {reason}")]
    MalformedStructure { offset: u64, reason: String },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HTTP transport error.
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid parse options.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Copyable classification of an [`Error`], used to report why a field is
/// unavailable without holding on to the error itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidSource,
    EmptyBody,
    LengthUnavailable,
    TruncatedSource,
    UnsupportedFormat,
    MalformedStructure,
    Io,
    Http,
    Config,
}

impl Error {
    /// Create an invalid source error.
    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Self::InvalidSource(msg.into())
    }

    /// Create an unsupported format error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Create a malformed structure error.
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Self::MalformedStructure {
            offset,
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSource(_) => ErrorKind::InvalidSource,
            Self::EmptyBody(_) => ErrorKind::EmptyBody,
            Self::LengthUnavailable(_) => ErrorKind::LengthUnavailable,
            Self::TruncatedSource { .. } => ErrorKind::TruncatedSource,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::MalformedStructure { .. } => ErrorKind::MalformedStructure,
            Self::Io(_) => ErrorKind::Io,
            #[cfg(feature = "http")]
            Self::Http(_) => ErrorKind::Http,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether the error only invalidates the subtree being decoded.
    ///
    /// Everything else aborts the whole session.
    pub fn is_subtree_local(&self) -> bool {
        matches!(
            self,
            Self::TruncatedSource { .. } | Self::MalformedStructure { .. }
        )
    }
}
