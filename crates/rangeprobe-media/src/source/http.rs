//! HTTP byte source using `Range` and `HEAD` requests.

use super::{is_url, ByteRange, ByteSource, ByteStream};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{future, stream, StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, RANGE, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default request timeout for range and length requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport settings for [`HttpSource`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    /// Per-request timeout in seconds. `0` disables the timeout.
    pub timeout_secs: u64,
    /// Value for the `User-Agent` header.
    pub user_agent: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            user_agent: concat!("rangeprobe/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Reads windows of a remote resource over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: Url,
    client: Client,
    user_agent: String,
}

impl HttpSource {
    /// Create a source with default transport settings.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_options(url, &HttpOptions::default())
    }

    /// Create a source.
    ///
    /// The identifier must start with `http://` or `https://`; anything else
    /// is rejected with [`Error::InvalidSource`] before a request is made.
    pub fn with_options(url: &str, options: &HttpOptions) -> Result<Self> {
        if !is_url(url) {
            return Err(Error::invalid_source(format!(
                "{url} is not a URL - needs to start with http:// or https://. \
                 Use a file source to read a local file."
            )));
        }
        let parsed = Url::parse(url).map_err(|e| Error::invalid_source(format!("{url}: {e}")))?;

        let mut builder = Client::builder();
        if options.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(options.timeout_secs));
        }
        let client = builder.build()?;

        Ok(Self {
            url: parsed,
            client,
            user_agent: options.user_agent.clone(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ByteSource for HttpSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn read(&self, range: Option<ByteRange>) -> Result<ByteStream> {
        let mut request = self
            .client
            .get(self.url.clone())
            .header(USER_AGENT, &self.user_agent);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = request.send().await?;

        // Range starts past the end of the resource.
        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            tracing::debug!("{} answered 416 for {:?}", self.url, range);
            return Ok(stream::empty().boxed());
        }
        let response = response.error_for_status()?;

        let wanted = range.and_then(|r| r.len()).unwrap_or(1);
        if wanted > 0 && response.content_length() == Some(0) {
            return Err(Error::EmptyBody(format!("{} returned no body", self.url)));
        }

        let status = response.status();
        let body = response.bytes_stream().map_err(Error::from);

        match range {
            Some(range) if status != StatusCode::PARTIAL_CONTENT => {
                tracing::debug!(
                    "{} ignored Range header; slicing full body to {}",
                    self.url,
                    range
                );
                Ok(slice_stream(body, range.start(), range.len()))
            }
            _ => Ok(body.boxed()),
        }
    }

    async fn length(&self) -> Result<u64> {
        let response = self
            .client
            .head(self.url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?
            .error_for_status()?;

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            // Some servers answer HEAD with a zero length they never computed.
            .filter(|&len| len > 0)
            .ok_or_else(|| {
                Error::LengthUnavailable(format!("{} sent no content-length", self.url))
            })
    }
}

/// Drop the first `skip` bytes of `body` and stop after `take` bytes.
fn slice_stream<S>(body: S, skip: u64, take: Option<u64>) -> ByteStream
where
    S: futures::Stream<Item = Result<bytes::Bytes>> + Send + 'static,
{
    body.scan((skip, take), |(skip, remaining), chunk| {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return future::ready(Some(Err(e))),
        };
        if *remaining == Some(0) {
            return future::ready(None);
        }

        let mut chunk = chunk;
        let drop = (*skip).min(chunk.len() as u64) as usize;
        *skip -= drop as u64;
        let _ = chunk.split_to(drop);

        if let Some(left) = remaining {
            let keep = (*left).min(chunk.len() as u64) as usize;
            chunk.truncate(keep);
            *left -= keep as u64;
        }
        future::ready(Some(Ok(chunk)))
    })
    .try_filter(|chunk| future::ready(!chunk.is_empty()))
    .boxed()
}
