//! Reading entry content.
//!
//! Every read opens its own archive handle and drops it before returning,
//! whatever the outcome. Handles are never shared between reads, so any
//! number of reads may run against the same archive at once; the price is
//! one file open (or one HEAD request plus a central directory fetch) per
//! read.

use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};
use crate::registry::ArchiveRegistry;
use crate::source::{ArchiveSource, open_source};
use crate::thumbnail;
use crate::tree::is_system_file;

impl ArchiveRegistry {
    /// A newly opened handle with the remembered password applied, or
    /// `None` if the archive is unknown or cannot be opened. The caller
    /// owns it; dropping it releases the file or connection.
    pub async fn open_fresh_handle(&self, id: &str) -> Option<Box<dyn ArchiveSource>> {
        match self.open_fresh(id).await {
            Ok(source) => Some(source),
            Err(e) => {
                warn!(%id, "cannot open archive: {}", e);
                None
            }
        }
    }

    async fn open_fresh(&self, id: &str) -> Result<Box<dyn ArchiveSource>> {
        let (location, password) = self
            .open_params(id)
            .ok_or_else(|| ArchiveError::NotFound(format!("archive {}", id)))?;

        let mut source = open_source(&location).await?;
        if let Some(password) = password {
            source.set_password(&password);
        }
        Ok(source)
    }

    /// Bytes of the entry at `path`, read through a fresh handle.
    pub async fn read_entry(&self, id: &str, path: &str) -> Result<Vec<u8>> {
        let path = path.trim_start_matches('/');
        let source = self.open_fresh(id).await?;
        let result = source.read_entry(path).await;
        drop(source);

        match &result {
            Ok(data) => debug!(%id, path, bytes = data.len(), "read entry"),
            Err(e) => debug!(%id, path, "read failed: {}", e),
        }
        result
    }

    /// JPEG thumbnail of the image at `path`.
    ///
    /// Sizes outside the allow-list fall back to the default. Metadata
    /// files and content that does not decode as an image are reported as
    /// `NotFound`.
    pub async fn read_thumbnail(&self, id: &str, path: &str, size: u32) -> Result<Vec<u8>> {
        if path.split('/').any(is_system_file) {
            return Err(ArchiveError::NotFound(path.to_string()));
        }

        let size = thumbnail::normalize_size(size);
        let data = self.read_entry(id, path).await?;

        thumbnail::render_thumbnail(&data, size).map_err(|e| {
            debug!(%id, path, "thumbnail failed: {}", e);
            ArchiveError::NotFound(format!("{}: not a decodable image", path))
        })
    }
}
