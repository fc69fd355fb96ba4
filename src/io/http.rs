use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderName, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::ReadAt;
use crate::error::{ArchiveError, Result};

/// Request timeout for every HEAD and ranged GET.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retries allowed for connect and timeout failures within one read.
const MAX_RETRY: u32 = 10;

/// Back-off step; the n-th retry waits n steps.
const RETRY_STEP: Duration = Duration::from_millis(500);

/// Random access to a file behind an HTTP server that honours `Range`.
///
/// Each instance owns its own client, so dropping it releases every
/// connection it opened.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl HttpRangeReader {
    /// Send a HEAD request to learn the size and check `Range` support.
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let size = probe(&client, &url).await?;
        debug!(%url, size, "opened remote archive");

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
            max_retry: MAX_RETRY,
        })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// One ranged GET for `start..=end`, retried on connect and timeout
    /// errors with a linear back-off.
    async fn fetch_range(&self, start: u64, end: u64) -> Result<Response> {
        let range = format!("bytes={}-{}", start, end);
        let mut attempt = 0;

        loop {
            match self.client.get(&self.url).header(RANGE, &range).send().await {
                Ok(resp) if resp.status() == StatusCode::PARTIAL_CONTENT => return Ok(resp),
                Ok(resp) => {
                    return Err(ArchiveError::Transport(format!(
                        "GET {} ({}) answered {}",
                        self.url,
                        range,
                        resp.status()
                    )));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    attempt += 1;
                    if attempt >= self.max_retry {
                        return Err(ArchiveError::Transport(format!(
                            "giving up on {} after {} attempts: {}",
                            self.url, attempt, e
                        )));
                    }
                    warn!(url = %self.url, %range, "retry {}/{}: {}", attempt, self.max_retry, e);
                    tokio::time::sleep(RETRY_STEP * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Size of the resource at `url`, refusing servers without byte ranges.
async fn probe(client: &Client, url: &str) -> Result<u64> {
    let resp = client.head(url).send().await?;
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ArchiveError::NotFound(url.to_string()));
    }
    if !status.is_success() {
        return Err(ArchiveError::Transport(format!("HEAD {} answered {}", url, status)));
    }

    let header = |name: HeaderName| resp.headers().get(name).and_then(|v| v.to_str().ok());

    if !header(ACCEPT_RANGES).is_some_and(|v| v.contains("bytes")) {
        return Err(ArchiveError::Transport(format!(
            "{} does not support Range requests",
            url
        )));
    }

    header(CONTENT_LENGTH)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ArchiveError::Transport(format!("{} did not return Content-Length", url)))
}

impl Drop for HttpRangeReader {
    fn drop(&mut self) {
        debug!(
            url = %self.url,
            transferred = self.transferred_bytes(),
            "closed remote archive"
        );
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = (offset + buf.len() as u64 - 1).min(self.size - 1);
        let wanted = (end - offset + 1) as usize;
        let mut received = 0;

        // A server may answer with less than asked; keep asking for the rest
        while received < wanted {
            let resp = self.fetch_range(offset + received as u64, end).await?;
            let bytes = resp.bytes().await?;
            if bytes.is_empty() {
                return Err(ArchiveError::Transport(format!(
                    "GET {} returned no data at offset {}",
                    self.url,
                    offset + received as u64
                )));
            }

            let n = bytes.len().min(wanted - received);
            buf[received..received + n].copy_from_slice(&bytes[..n]);
            received += n;
            self.transferred_bytes.fetch_add(n as u64, Ordering::Relaxed);
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
