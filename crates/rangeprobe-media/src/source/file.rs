//! Local file byte source.

use super::{ByteRange, ByteSource, ByteStream};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Reads windows of a local file with seek + bounded read.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Create a source from an identifier.
    ///
    /// Accepts plain paths and `file://` URLs. Identifiers carrying any other
    /// scheme are rejected with [`Error::InvalidSource`].
    pub fn new(identifier: impl AsRef<str>) -> Result<Self> {
        let identifier = identifier.as_ref();
        let path = identifier.strip_prefix("file://").unwrap_or(identifier);

        if path.is_empty() {
            return Err(Error::invalid_source("empty file path"));
        }
        if path.contains("://") {
            return Err(Error::invalid_source(format!(
                "{identifier} is not a local path. Use an HTTP source for URLs."
            )));
        }

        Ok(Self::from_path(path))
    }

    /// Create a source from a path without validation.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<tokio::fs::File> {
        tokio::fs::File::open(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::invalid_source(format!("no such file: {}", self.path.display()))
            } else {
                Error::Io(e)
            }
        })
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn read(&self, range: Option<ByteRange>) -> Result<ByteStream> {
        let mut file = self.open().await?;

        let reader: Box<dyn AsyncRead + Send + Unpin> = match range {
            None => Box::new(file),
            Some(range) => {
                file.seek(SeekFrom::Start(range.start())).await?;
                match range.len() {
                    Some(len) => Box::new(file.take(len)),
                    None => Box::new(file),
                }
            }
        };

        Ok(ReaderStream::new(reader).map_err(Error::from).boxed())
    }

    async fn length(&self) -> Result<u64> {
        let metadata = tokio::fs::metadata(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::invalid_source(format!("no such file: {}", self.path.display()))
            } else {
                Error::Io(e)
            }
        })?;
        Ok(metadata.len())
    }
}
