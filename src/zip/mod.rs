//! ZIP archive parsing and decoding.
//!
//! This module reads ZIP archives through any [`ReadAt`](crate::io::ReadAt)
//! source, supporting both the standard format and ZIP64 extensions.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`crypto`]: ZipCrypto and WinZip AES decryption
//! - [`archive`]: Entry lookup and decoding for callers
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The EOCD is read first (from the end of the file), then the Central
//! Directory, which allows listing files without reading the entire
//! archive. Each entry is later fetched with a single ranged read.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED and DEFLATE compression methods
//! - Traditional PKWARE encryption and WinZip AES (AE-1, AE-2)
//!
//! ## Limitations
//!
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods
//! - Entries are decoded into memory

mod archive;
mod crypto;
mod parser;
mod structures;

pub use archive::ZipArchive;
pub use parser::ZipParser;
pub use structures::*;
