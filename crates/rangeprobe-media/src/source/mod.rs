//! Byte sources.
//!
//! A [`ByteSource`] hands out byte windows of one logical resource. The parse
//! engine never assumes anything about the transport: local files, HTTP
//! resources and in-memory buffers all look the same through this trait.

mod file;
#[cfg(feature = "http")]
mod http;
mod memory;

pub use file::FileSource;
#[cfg(feature = "http")]
pub use http::{HttpOptions, HttpSource};
pub use memory::{FetchLog, MemorySource};

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Stream of byte chunks returned by [`ByteSource::read`].
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// A window of a byte source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteRange {
    /// `start..=end_inclusive`.
    Bounded { start: u64, end_inclusive: u64 },
    /// Everything from `start` to the end of the resource.
    From { start: u64 },
}

impl ByteRange {
    /// Create a bounded range. Returns `None` when `start > end_inclusive`.
    pub fn bounded(start: u64, end_inclusive: u64) -> Option<Self> {
        (start <= end_inclusive).then_some(Self::Bounded {
            start,
            end_inclusive,
        })
    }

    /// Create an unbounded range starting at `start`.
    pub fn starting_at(start: u64) -> Self {
        Self::From { start }
    }

    pub fn start(&self) -> u64 {
        match *self {
            Self::Bounded { start, .. } | Self::From { start } => start,
        }
    }

    pub fn end_inclusive(&self) -> Option<u64> {
        match *self {
            Self::Bounded { end_inclusive, .. } => Some(end_inclusive),
            Self::From { .. } => None,
        }
    }

    /// Number of bytes covered, if bounded.
    pub fn len(&self) -> Option<u64> {
        match *self {
            Self::Bounded {
                start,
                end_inclusive,
            } => Some(end_inclusive - start + 1),
            Self::From { .. } => None,
        }
    }

    /// Value for an HTTP `Range` header.
    pub fn header_value(&self) -> String {
        match *self {
            Self::Bounded {
                start,
                end_inclusive,
            } => format!("bytes={start}-{end_inclusive}"),
            Self::From { start } => format!("bytes={start}-"),
        }
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Bounded {
                start,
                end_inclusive,
            } => write!(f, "{start}..={end_inclusive}"),
            Self::From { start } => write!(f, "{start}.."),
        }
    }
}

/// A pluggable provider of bytes for one resource.
///
/// Implementations must be safe to share across threads (`Send + Sync`) so
/// that sessions over distinct sources can run on any runtime worker.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Human-readable name identifying this source implementation.
    fn name(&self) -> &'static str;

    /// Read `range`, or the whole resource when `range` is `None`.
    ///
    /// The returned stream yields the bytes of the window in order and ends
    /// when the window (or the resource) ends.
    async fn read(&self, range: Option<ByteRange>) -> Result<ByteStream>;

    /// Total length of the resource in bytes.
    async fn length(&self) -> Result<u64>;
}

#[async_trait]
impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn read(&self, range: Option<ByteRange>) -> Result<ByteStream> {
        (**self).read(range).await
    }

    async fn length(&self) -> Result<u64> {
        (**self).length().await
    }
}

#[async_trait]
impl<S: ByteSource + ?Sized> ByteSource for std::sync::Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn read(&self, range: Option<ByteRange>) -> Result<ByteStream> {
        (**self).read(range).await
    }

    async fn length(&self) -> Result<u64> {
        (**self).length().await
    }
}

/// Whether `identifier` names an HTTP(S) resource.
pub fn is_url(identifier: &str) -> bool {
    identifier.starts_with("http://") || identifier.starts_with("https://")
}

/// Open the source matching `identifier`: HTTP(S) URLs go over the network,
/// everything else is treated as a local path.
#[cfg(feature = "http")]
pub fn open(identifier: &str, http: &HttpOptions) -> Result<Box<dyn ByteSource>> {
    if is_url(identifier) {
        Ok(Box::new(HttpSource::with_options(identifier, http)?))
    } else {
        Ok(Box::new(FileSource::new(identifier)?))
    }
}
