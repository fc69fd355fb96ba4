//! # zipbrowse
//!
//! Browse ZIP archives without extracting them, whether they sit on the
//! local disk or behind an HTTP server that honours `Range` requests.
//!
//! An [`ArchiveRegistry`] holds every archive the process knows about.
//! Each one gets a stable 12-character ID and, once opened (or unlocked
//! with its password), a cached [`DirectoryTree`] that answers listing,
//! search and preview queries without touching the archive again. Entry
//! content is always read through a freshly opened handle, so concurrent
//! reads never share state.
//!
//! ## Features
//!
//! - Local files via positional reads, remote files via HTTP Range requests
//! - ZIP64, STORED and DEFLATE
//! - ZipCrypto and WinZip AES (AE-1/AE-2) encrypted entries
//! - Case-insensitive search, folder previews and JPEG thumbnails
//! - A JSON user store for front ends that need logins
//!
//! ## Example
//!
//! ```no_run
//! use zipbrowse::{ArchiveRegistry, SearchKind};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = ArchiveRegistry::new();
//!     let ids = registry.initialize(&["https://example.com/photos.zip"]).await;
//!     let id = &ids[0];
//!
//!     if registry.ensure_loaded(id).await {
//!         for hit in registry.search(id, "beach", SearchKind::Images) {
//!             println!("{}", hit.path);
//!         }
//!         let bytes = registry.read_entry(id, "readme.txt").await;
//!         println!("{:?}", bytes.map(|b| b.len()));
//!     }
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
mod fetch;
pub mod io;
pub mod logging;
pub mod lookup;
pub mod registry;
pub mod source;
pub mod thumbnail;
pub mod tree;
pub mod users;
pub mod zip;

pub use error::{ArchiveError, Result};
pub use crate::io::{HttpRangeReader, LocalFileReader, ReadAt};
pub use lookup::{DirItem, SearchKind, SearchResult, SortBy, SortOrder};
pub use registry::{ArchiveInfo, ArchiveRegistry};
pub use source::{ArchiveLocation, ArchiveSource, LocalArchive, RemoteArchive};
pub use tree::{DirectoryTree, TreeNode};
pub use crate::zip::{ZipArchive, ZipFileEntry};
