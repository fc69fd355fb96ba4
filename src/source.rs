//! Archive access behind one interface, whatever the archive lives on.
//!
//! A [`LocalArchive`] reads a seekable file with positional reads; a
//! [`RemoteArchive`] issues one HTTP `Range` request per structure it needs.
//! Which one is used is decided once, from the shape of the
//! [`ArchiveLocation`].
//!
//! Opening a source is not free (a remote open costs a HEAD request and a
//! central directory fetch), but a source is also never shared between
//! requests: callers open one, use it, and drop it.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::io::{HttpRangeReader, LocalFileReader, ReadAt};
use crate::zip::ZipArchive;

/// Where an archive lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArchiveLocation {
    Local(PathBuf),
    Remote(String),
}

impl ArchiveLocation {
    /// Classify user input: `http(s)://host/...` is remote, anything else
    /// is taken as a local path.
    pub fn parse(input: &str) -> Self {
        if is_url(input) {
            ArchiveLocation::Remote(input.to_string())
        } else {
            ArchiveLocation::Local(PathBuf::from(input))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ArchiveLocation::Remote(_))
    }

    pub fn as_local(&self) -> Option<&Path> {
        match self {
            ArchiveLocation::Local(path) => Some(path),
            ArchiveLocation::Remote(_) => None,
        }
    }
}

impl fmt::Display for ArchiveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveLocation::Local(path) => write!(f, "{}", path.display()),
            ArchiveLocation::Remote(url) => f.write_str(url),
        }
    }
}

/// True for absolute `http`/`https` URLs with a host.
pub fn is_url(input: &str) -> bool {
    match url::Url::parse(input) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Read access to the entries of one opened archive.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Every stored name in archive order; directories end with `/`.
    fn entry_names(&self) -> Vec<String>;

    /// Decode the named entry into memory.
    ///
    /// Fails with `NotFound` if absent, `Decryption` on a missing or wrong
    /// password, `Io`/`Transport` if the bytes cannot be fetched.
    async fn read_entry(&self, name: &str) -> Result<Vec<u8>>;

    /// Key used for encrypted entries. Plain entries ignore it.
    fn set_password(&mut self, password: &str);
}

#[async_trait]
impl<R: ReadAt + 'static> ArchiveSource for ZipArchive<R> {
    fn entry_names(&self) -> Vec<String> {
        self.entries().iter().map(|e| e.file_name.clone()).collect()
    }

    async fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        self.read_by_name(name).await
    }

    fn set_password(&mut self, password: &str) {
        ZipArchive::set_password(self, password.as_bytes());
    }
}

/// ZIP archive on the local filesystem
pub type LocalArchive = ZipArchive<LocalFileReader>;

/// ZIP archive behind an HTTP server that honours `Range`
pub type RemoteArchive = ZipArchive<HttpRangeReader>;

impl LocalArchive {
    pub async fn open_path(path: &Path) -> Result<Self> {
        let reader = LocalFileReader::new(path)?;
        ZipArchive::open(Arc::new(reader)).await
    }
}

impl RemoteArchive {
    pub async fn open_url(url: &str) -> Result<Self> {
        let reader = HttpRangeReader::new(url.to_string()).await?;
        ZipArchive::open(Arc::new(reader)).await
    }
}

/// Open a brand-new source for `location`.
pub async fn open_source(location: &ArchiveLocation) -> Result<Box<dyn ArchiveSource>> {
    debug!(%location, "opening archive");
    Ok(match location {
        ArchiveLocation::Local(path) => Box::new(LocalArchive::open_path(path).await?),
        ArchiveLocation::Remote(url) => Box::new(RemoteArchive::open_url(url).await?),
    })
}
