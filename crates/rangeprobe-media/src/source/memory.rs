//! In-memory byte source with fetch accounting.

use super::{ByteRange, ByteSource, ByteStream};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared record of the reads issued against a [`MemorySource`].
#[derive(Debug, Clone, Default)]
pub struct FetchLog {
    reads: Arc<Mutex<Vec<Option<ByteRange>>>>,
}

impl FetchLog {
    /// Number of `read` calls so far.
    pub fn count(&self) -> usize {
        self.reads.lock().len()
    }

    /// Every requested range, in call order.
    pub fn ranges(&self) -> Vec<Option<ByteRange>> {
        self.reads.lock().clone()
    }

    fn record(&self, range: Option<ByteRange>) {
        self.reads.lock().push(range);
    }
}

/// A byte source over an owned buffer.
///
/// Every read is recorded in a [`FetchLog`], which makes this the stub of
/// choice for asserting how many fetches a parse issues.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    chunk_size: Option<usize>,
    hide_length: bool,
    log: FetchLog,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            chunk_size: None,
            hide_length: false,
            log: FetchLog::default(),
        }
    }

    /// Deliver each read as several stream items of at most `chunk_size` bytes.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size.max(1));
        self
    }

    /// Make [`ByteSource::length`] fail with [`Error::LengthUnavailable`].
    pub fn without_length(mut self) -> Self {
        self.hide_length = true;
        self
    }

    /// Handle to the read log, shared with clones of this source.
    pub fn fetch_log(&self) -> FetchLog {
        self.log.clone()
    }

    fn window(&self, range: Option<ByteRange>) -> Bytes {
        let len = self.data.len() as u64;
        let Some(range) = range else {
            return self.data.clone();
        };

        let start = range.start().min(len);
        let end = range
            .end_inclusive()
            .map(|e| e.saturating_add(1).min(len))
            .unwrap_or(len);
        self.data.slice(start as usize..end.max(start) as usize)
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, range: Option<ByteRange>) -> Result<ByteStream> {
        self.log.record(range);
        let window = self.window(range);

        let chunks: Vec<Result<Bytes>> = match self.chunk_size {
            Some(size) => {
                let mut chunks = Vec::new();
                let mut rest = window;
                while !rest.is_empty() {
                    let take = size.min(rest.len());
                    chunks.push(Ok(rest.split_to(take)));
                }
                chunks
            }
            None if window.is_empty() => Vec::new(),
            None => vec![Ok(window)],
        };

        Ok(stream::iter(chunks).boxed())
    }

    async fn length(&self) -> Result<u64> {
        if self.hide_length {
            return Err(Error::LengthUnavailable(
                "memory source configured without length".to_string(),
            ));
        }
        Ok(self.data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn read_all(source: &MemorySource, range: Option<ByteRange>) -> Vec<Bytes> {
        source.read(range).await.unwrap().try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn test_window_clamping() {
        let source = MemorySource::new(&b"abcdefgh"[..]);

        let chunks = read_all(&source, ByteRange::bounded(6, 100)).await;
        assert_eq!(chunks.concat(), b"gh");

        let chunks = read_all(&source, Some(ByteRange::starting_at(20))).await;
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_chunked_delivery() {
        let source = MemorySource::new(&b"abcdefgh"[..]).with_chunk_size(3);
        let chunks = read_all(&source, None).await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), b"abcdefgh");
    }

    #[tokio::test]
    async fn test_fetch_log_is_shared() {
        let source = MemorySource::new(vec![0u8; 16]);
        let log = source.fetch_log();

        read_all(&source, ByteRange::bounded(0, 3)).await;
        read_all(&source.clone(), None).await;

        assert_eq!(log.count(), 2);
        assert_eq!(log.ranges()[0], ByteRange::bounded(0, 3));
        assert_eq!(log.ranges()[1], None);
    }

    #[tokio::test]
    async fn test_hidden_length() {
        let source = MemorySource::new(vec![0u8; 4]).without_length();
        assert!(matches!(
            source.length().await,
            Err(Error::LengthUnavailable(_))
        ));
    }
}
