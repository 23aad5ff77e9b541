//! Buffered, selectively seekable cursor over a [`ByteSource`].
//!
//! The cursor keeps exactly one contiguous window of fetched bytes. Reads
//! inside the window are served from memory; a read that runs past the
//! window issues one new fetch starting where the window ends. Skipping
//! forward only moves the position, so skipped payloads are never requested.

use crate::source::{ByteRange, ByteSource, ByteStream};
use crate::{Error, Result};
use bytes::{Buf, Bytes, BytesMut};
use futures::StreamExt;

/// Default amortization block for range fetches (64 KiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024;

/// Sequential cursor with range-fetch buffering.
pub struct RangeCursor<S> {
    source: S,
    position: u64,
    /// Total length reported by the source, if any.
    length: Option<u64>,
    /// End of data discovered by a fetch that ran dry (unknown length only).
    discovered_end: Option<u64>,
    window_start: u64,
    window: BytesMut,
    /// Open response continuing the window at `window_end()`.
    live: Option<ByteStream>,
    /// Exclusive end of the live response, `None` when unbounded.
    live_end: Option<u64>,
    block_size: u64,
    fetches: u64,
    bytes_fetched: u64,
}

impl<S: ByteSource> RangeCursor<S> {
    /// Create a cursor at offset 0.
    pub fn new(source: S, length: Option<u64>, block_size: u64) -> Self {
        Self {
            source,
            position: 0,
            length,
            discovered_end: None,
            window_start: 0,
            window: BytesMut::new(),
            live: None,
            live_end: None,
            block_size: block_size.max(1),
            fetches: 0,
            bytes_fetched: 0,
        }
    }

    /// Current absolute offset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total length as reported by the source.
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Number of range fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches
    }

    /// Number of bytes received from the source so far.
    pub fn bytes_fetched(&self) -> u64 {
        self.bytes_fetched
    }

    fn window_end(&self) -> u64 {
        self.window_start + self.window.len() as u64
    }

    fn known_end(&self) -> Option<u64> {
        self.length.or(self.discovered_end)
    }

    fn reset_window(&mut self, at: u64) {
        self.window.clear();
        self.window_start = at;
        self.live = None;
        self.live_end = None;
    }

    /// Move to an absolute offset.
    ///
    /// Seeking within the window (or to its end) keeps the buffered bytes;
    /// anything else discards the window and the open response.
    pub fn seek(&mut self, offset: u64) {
        if offset < self.window_start || offset > self.window_end() {
            self.reset_window(offset);
        }
        self.position = offset;
    }

    /// Advance the position by `n` bytes without fetching them.
    pub fn skip(&mut self, n: u64) {
        self.seek(self.position.saturating_add(n));
    }

    /// Make `[position, position + n)` available in the window.
    pub async fn ensure(&mut self, n: u64) -> Result<()> {
        let end = self
            .position
            .checked_add(n)
            .ok_or_else(|| Error::malformed(self.position, "read extends past u64 range"))?;

        if self.position >= self.window_start && end <= self.window_end() {
            return Ok(());
        }

        if let Some(known) = self.known_end() {
            if end > known {
                return Err(Error::TruncatedSource {
                    offset: self.position,
                    needed: n,
                    available: known.saturating_sub(self.position),
                });
            }
        }

        // Keep only the part of the window at or after the position.
        if self.position < self.window_start || self.position > self.window_end() {
            self.reset_window(self.position);
        } else {
            let drop = (self.position - self.window_start) as usize;
            self.window.advance(drop);
            self.window_start = self.position;
        }

        while self.window_end() < end {
            if self.live.is_none() {
                self.open_fetch(end).await?;
            }
            let Some(live) = self.live.as_mut() else {
                break;
            };

            match live.next().await {
                Some(Ok(chunk)) => {
                    self.bytes_fetched += chunk.len() as u64;
                    self.window.extend_from_slice(&chunk);
                }
                Some(Err(e)) => {
                    self.live = None;
                    self.live_end = None;
                    return Err(e);
                }
                None => {
                    let completed = self
                        .live_end
                        .is_some_and(|live_end| self.window_end() >= live_end);
                    self.live = None;
                    self.live_end = None;
                    if completed {
                        continue;
                    }

                    let available = self.window_end();
                    if self.length.is_none() {
                        self.discovered_end = Some(available);
                    }
                    tracing::debug!(
                        "{} source ran dry at {} (wanted up to {})",
                        self.source.name(),
                        available,
                        end
                    );
                    return Err(Error::TruncatedSource {
                        offset: self.position,
                        needed: n,
                        available: available.saturating_sub(self.position),
                    });
                }
            }
        }

        Ok(())
    }

    /// Issue one fetch starting at the window end, covering at least `need_end`.
    async fn open_fetch(&mut self, need_end: u64) -> Result<()> {
        let start = self.window_end();
        let range = match self.length {
            Some(length) => {
                let end = need_end
                    .max(start.saturating_add(self.block_size))
                    .min(length);
                let Some(range) = end.checked_sub(1).and_then(|last| ByteRange::bounded(start, last))
                else {
                    return Err(Error::TruncatedSource {
                        offset: self.position,
                        needed: need_end - self.position,
                        available: length.saturating_sub(self.position),
                    });
                };
                range
            }
            None => ByteRange::starting_at(start),
        };

        self.fetches += 1;
        tracing::debug!(
            "{} fetch #{}: {}",
            self.source.name(),
            self.fetches,
            range
        );

        let stream = self.source.read(Some(range)).await?;
        self.live = Some(stream);
        self.live_end = range.end_inclusive().map(|last| last + 1);
        Ok(())
    }

    /// Read `n` bytes and advance.
    pub async fn read_bytes(&mut self, n: u64) -> Result<Bytes> {
        self.ensure(n).await?;
        let from = (self.position - self.window_start) as usize;
        let bytes = Bytes::copy_from_slice(&self.window[from..from + n as usize]);
        self.position += n;
        Ok(bytes)
    }

    /// Read a fixed-size array and advance.
    pub async fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.ensure(N as u64).await?;
        let from = (self.position - self.window_start) as usize;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.window[from..from + N]);
        self.position += N as u64;
        Ok(out)
    }

    pub async fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>().await?[0])
    }

    pub async fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array().await?))
    }

    pub async fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array().await?))
    }

    /// Return up to `n` bytes at the position without advancing.
    ///
    /// Unlike [`RangeCursor::ensure`], running into the end of the source is
    /// not an error; the shorter prefix is returned.
    pub async fn peek_up_to(&mut self, n: u64) -> Result<Bytes> {
        let n = match self.ensure(n).await {
            Ok(()) => n,
            Err(Error::TruncatedSource { available, .. }) => {
                self.ensure(available).await?;
                available
            }
            Err(e) => return Err(e),
        };
        let from = (self.position - self.window_start) as usize;
        Ok(Bytes::copy_from_slice(&self.window[from..from + n as usize]))
    }

    /// Whether the position is at or past the end of the source.
    ///
    /// With an unknown length this probes for one more byte.
    pub async fn is_exhausted(&mut self) -> Result<bool> {
        if let Some(end) = self.known_end() {
            return Ok(self.position >= end);
        }
        match self.ensure(1).await {
            Ok(()) => Ok(false),
            Err(Error::TruncatedSource { .. }) => Ok(true),
            Err(e) => Err(e),
        }
    }
}

impl<S> std::fmt::Debug for RangeCursor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeCursor")
            .field("position", &self.position)
            .field("length", &self.length)
            .field("window_start", &self.window_start)
            .field("window_len", &self.window.len())
            .field("fetches", &self.fetches)
            .finish()
    }
}
