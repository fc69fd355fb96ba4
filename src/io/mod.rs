mod http;
mod local;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;

use crate::error::Result;
use async_trait::async_trait;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Fill `buf` with the bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is only shorter than the
    /// buffer when the source ends first.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}
