//! One-shot parse session: dispatch, decode, aggregate.

use crate::aggregator::Aggregator;
use crate::cursor::RangeCursor;
use crate::format::{self, Container};
use crate::request::{ParseOptions, ParseRequest};
use crate::result::ParseResult;
use crate::source::{ByteSource, MemorySource};
use crate::tree::StructureTree;
use crate::{mkv, mp4, Error, Result};
use bytes::Bytes;
use serde::Serialize;

/// Lifecycle of a session. States are never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Dispatching,
    Decoding(Container),
    PartiallyResolved,
    FullyResolved,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Dispatching => write!(f, "dispatching"),
            SessionState::Decoding(container) => write!(f, "decoding {}", container),
            SessionState::PartiallyResolved => write!(f, "partially resolved"),
            SessionState::FullyResolved => write!(f, "fully resolved"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Owns the source, cursor and aggregator for a single parse.
///
/// ```no_run
/// # async fn run() -> rangeprobe_media::Result<()> {
/// use rangeprobe_media::{FieldName, ParseOptions, ParseRequest, ParseSession};
/// use rangeprobe_media::source::FileSource;
///
/// let request = ParseRequest::new().with(FieldName::DurationInSeconds);
/// let session = ParseSession::open(FileSource::new("clip.mp4")?, ParseOptions::new(request)).await?;
/// let result = session.run().await?;
/// println!("{:?}", result.duration_in_seconds);
/// # Ok(())
/// # }
/// ```
pub struct ParseSession<S> {
    cursor: RangeCursor<S>,
    options: ParseOptions,
    state: SessionState,
    source_name: &'static str,
}

impl<S: ByteSource> ParseSession<S> {
    /// Validate the options and ask the source for its length.
    ///
    /// A source that cannot report its length is still usable; the cursor
    /// then discovers the end of the resource by reading past it.
    pub async fn open(source: S, options: ParseOptions) -> Result<Self> {
        options.validate()?;

        let source_name = source.name();
        let length = match source.length().await {
            Ok(length) => Some(length),
            Err(Error::LengthUnavailable(reason)) => {
                tracing::debug!("{} source has no known length: {}", source_name, reason);
                None
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(
            "opened {} source, length {:?}, fields {:?}",
            source_name,
            length,
            options.request.fields()
        );
        Ok(Self {
            cursor: RangeCursor::new(source, length, options.block_size),
            options,
            state: SessionState::Dispatching,
            source_name,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!("session {} -> {}", self.state, next);
        self.state = next;
    }

    /// Drive the session to completion.
    pub async fn run(mut self) -> Result<ParseResult> {
        match self.drive().await {
            Ok(result) => {
                tracing::info!(
                    "{} source {} after {} fetch(es), {} bytes",
                    self.source_name,
                    result.stats.state,
                    result.stats.fetches,
                    result.stats.bytes_fetched
                );
                Ok(result)
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                tracing::debug!("session failed: {}", e);
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<ParseResult> {
        let mut agg = Aggregator::new(
            self.options.request.clone(),
            self.options.dimension_policy,
        );
        let mut tree = StructureTree::new();

        let container = format::dispatch(&mut self.cursor).await?;
        agg.set_container(container);
        self.transition(SessionState::Decoding(container));

        let max_leaf_size = self.options.max_leaf_size;
        match container {
            Container::IsoBmff => {
                mp4::decode(&mut self.cursor, &mut tree, &mut agg, max_leaf_size).await?
            }
            Container::Matroska => {
                mkv::decode(&mut self.cursor, &mut tree, &mut agg, max_leaf_size).await?
            }
        }

        let result = agg.finish(&tree, self.cursor.fetch_count(), self.cursor.bytes_fetched());
        self.transition(result.stats.state);
        Ok(result)
    }
}

/// Parse `source` for the fields in `options`.
pub async fn parse_media<S: ByteSource>(source: S, options: ParseOptions) -> Result<ParseResult> {
    ParseSession::open(source, options).await?.run().await
}

/// Parse an in-memory buffer with default options.
pub async fn probe_bytes(bytes: impl Into<Bytes>, request: ParseRequest) -> Result<ParseResult> {
    parse_media(MemorySource::new(bytes), ParseOptions::new(request)).await
}
