//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. If ZIP64, read the ZIP64 EOCD for large file support
//! 3. Read the Central Directory to get metadata for all files
//! 4. For reading an entry, read its Local File Header and data
//!
//! This approach is efficient for HTTP Range requests, as we only
//! need to fetch the file's tail to list contents.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::error::{ArchiveError, Result};
use crate::io::ReadAt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// ZIP64 extended information extra field
const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Low-level ZIP file parser.
///
/// Generic over the reader type to support both local files and HTTP
/// sources. Typically used through [`ZipArchive`](super::ZipArchive)
/// rather than directly.
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Read exactly `buf.len()` bytes at `offset`, failing on a short read.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.reader.read_at(offset, buf).await?;
        if n < buf.len() {
            return Err(ArchiveError::Format(format!(
                "unexpected end of archive at offset {} ({} of {} bytes)",
                offset,
                n,
                buf.len()
            )));
        }
        Ok(())
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature.
    ///
    /// Returns the EOCD record and its offset in the file.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        // Optimization: First try the simple case where there's no comment.
        if self.size >= EndOfCentralDirectory::SIZE as u64 {
            let offset = self.size - EndOfCentralDirectory::SIZE as u64;
            let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
            self.read_exact_at(offset, &mut buf).await?;

            // Check for signature and zero-length comment
            let comment_len = &buf[EndOfCentralDirectory::COMMENT_LEN_OFFSET..];
            if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && comment_len == b"\x00\x00" {
                let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
                return Ok((eocd, offset));
            }
        }

        // The EOCD could be earlier if there's a ZIP comment.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.read_exact_at(search_start, &mut buf).await?;

        // Search backwards for EOCD signature (PK\x05\x06)
        for i in (0..buf.len().saturating_sub(EndOfCentralDirectory::SIZE - 1)).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                // The comment length field must match the remaining bytes.
                let at = i + EndOfCentralDirectory::COMMENT_LEN_OFFSET;
                let comment_len = u16::from_le_bytes([buf[at], buf[at + 1]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        Err(ArchiveError::Format("not a valid ZIP file".into()))
    }

    /// Read the ZIP64 End of Central Directory record.
    ///
    /// Called when the regular EOCD has fields saturated to 0xFFFF or
    /// 0xFFFFFFFF.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        // The ZIP64 EOCD Locator is located immediately before the regular EOCD
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE as u64)
            .ok_or_else(|| ArchiveError::Format("missing ZIP64 locator".into()))?;
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.read_exact_at(locator_offset, &mut locator_buf).await?;

        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// List all entries in the ZIP archive.
    ///
    /// Reads the EOCD, then fetches the whole Central Directory in one
    /// read and parses every header in it.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        // Get Central Directory info, using ZIP64 if needed
        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset.saturating_add(cd_size) > self.size {
            return Err(ArchiveError::Format(
                "central directory lies outside the archive".into(),
            ));
        }

        // Read the entire Central Directory in one request
        // (efficient for HTTP as it's a single Range request)
        let mut cd_data = vec![0u8; cd_size as usize];
        self.read_exact_at(cd_offset, &mut cd_data).await?;

        let capacity = total_entries.min(cd_size / CDFH_MIN_SIZE as u64) as usize;
        let mut entries = Vec::with_capacity(capacity);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..total_entries {
            let entry = Self::parse_cdfh(&mut cursor).map_err(|e| match e {
                ArchiveError::Io(e) => {
                    ArchiveError::Format(format!("truncated central directory: {}", e))
                }
                other => other,
            })?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Parse a Central Directory File Header from a cursor.
    fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
        // Read and verify the signature (PK\x01\x02)
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            return Err(ArchiveError::Format(
                "invalid Central Directory File Header".into(),
            ));
        }

        // Read fixed-size header fields
        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let _last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        // Read the variable-length file name
        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        // Use lossy conversion to handle non-UTF8 filenames gracefully
        let file_name = String::from_utf8_lossy(&file_name_bytes).to_string();

        // Directory entries end with '/'
        let is_directory = file_name.ends_with('/');

        let extra_field_end = cursor.position() + extra_field_length as u64;
        let mut aes = None;

        while cursor.position() + 4 <= extra_field_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()? as u64;
            let field_start = cursor.position();
            let field_end = (field_start + field_size).min(extra_field_end);

            match header_id {
                ZIP64_EXTRA_ID => {
                    // Fields are present only if the header field is saturated
                    if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                        uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                    }
                    if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                        compressed_size = cursor.read_u64::<LittleEndian>()?;
                    }
                    if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                        lfh_offset = cursor.read_u64::<LittleEndian>()?;
                    }
                }
                AesExtraField::HEADER_ID => {
                    let field = cursor
                        .get_ref()
                        .get(field_start as usize..field_end as usize)
                        .ok_or_else(|| ArchiveError::Format("truncated extra field".into()))?;
                    aes = Some(AesExtraField::from_bytes(field)?);
                }
                _ => {}
            }

            cursor.set_position(field_end);
        }

        // Skip past the extra field and the file comment (we don't use it)
        cursor.set_position(extra_field_end + file_comment_length as u64);

        Ok(ZipFileEntry {
            file_name,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
            last_mod_time,
            is_directory,
            aes,
        })
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The Local File Header has variable-length fields (filename, extra
    /// field) that may differ from the Central Directory entry, so the
    /// header is read to find where the data begins.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.read_exact_at(entry.lfh_offset, &mut lfh_buf).await?;

        // Verify LFH signature (PK\x03\x04)
        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(ArchiveError::Format(format!(
                "invalid Local File Header for {}",
                entry.file_name
            )));
        }

        // Read the variable field lengths from fixed positions in LFH
        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // Offset to filename length field

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        // Data starts after: LFH (30 bytes) + filename + extra field
        Ok(entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
    }

    /// Read the raw (still compressed, possibly encrypted) bytes of an entry.
    pub async fn read_raw(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let data_offset = self.get_data_offset(entry).await?;
        if data_offset.saturating_add(entry.compressed_size) > self.size {
            return Err(ArchiveError::Format(format!(
                "data for {} lies outside the archive",
                entry.file_name
            )));
        }

        let mut buf = vec![0u8; entry.compressed_size as usize];
        self.read_exact_at(data_offset, &mut buf).await?;
        Ok(buf)
    }
}
