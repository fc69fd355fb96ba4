use flate2::read::DeflateDecoder;
use std::io::Read;
use std::sync::Arc;
use tracing::trace;

use crate::error::{ArchiveError, Result};
use crate::io::ReadAt;

use super::crypto;
use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Upper bound on the buffer reserved up front for an inflated entry.
///
/// The central directory size is only a hint; a lying header must not
/// make us allocate gigabytes before decoding a single byte.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// An opened ZIP archive: the central directory plus the means to decode
/// individual entries from the underlying reader.
pub struct ZipArchive<R: ReadAt> {
    parser: ZipParser<R>,
    entries: Vec<ZipFileEntry>,
    password: Option<Vec<u8>>,
}

impl<R: ReadAt> ZipArchive<R> {
    /// Open an archive by reading its central directory.
    pub async fn open(reader: Arc<R>) -> Result<Self> {
        let parser = ZipParser::new(reader);
        let entries = parser.list_files().await?;
        trace!(entries = entries.len(), "read central directory");
        Ok(Self {
            parser,
            entries,
            password: None,
        })
    }

    /// All entries in central directory order
    pub fn entries(&self) -> &[ZipFileEntry] {
        &self.entries
    }

    /// Look up an entry by its exact stored name
    pub fn find(&self, name: &str) -> Option<&ZipFileEntry> {
        self.entries.iter().find(|e| e.file_name == name)
    }

    /// Password used for encrypted entries; ignored for plain ones.
    pub fn set_password(&mut self, password: &[u8]) {
        self.password = Some(password.to_vec());
    }

    pub fn is_encrypted(&self) -> bool {
        self.entries.iter().any(|e| e.is_encrypted())
    }

    /// Read and decode the entry stored under `name`.
    pub async fn read_by_name(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find(name)
            .ok_or_else(|| ArchiveError::NotFound(name.to_string()))?;
        self.read(entry).await
    }

    /// Read an entry into memory, decrypting and inflating as needed.
    ///
    /// Directory entries yield no bytes. The result is checked against the
    /// stored size and, where the format keeps one, the CRC-32. A failed
    /// check on an encrypted entry is reported as a decryption failure.
    pub async fn read(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        if entry.is_directory {
            return Ok(Vec::new());
        }

        let raw = self.parser.read_raw(entry).await?;
        let encrypted = entry.is_encrypted();

        let compressed = if encrypted {
            self.decrypt(entry, &raw)?
        } else if entry.compression_method == CompressionMethod::Aes {
            return Err(ArchiveError::Format(format!(
                "{} uses AES without the encryption flag",
                entry.file_name
            )));
        } else {
            raw
        };

        let data = match decompress(entry, compressed) {
            Err(ArchiveError::Format(reason)) if encrypted => {
                return Err(ArchiveError::Decryption(format!(
                    "{}: {}",
                    entry.file_name, reason
                )));
            }
            other => other?,
        };

        if let Err(reason) = verify(entry, &data) {
            return Err(if encrypted {
                ArchiveError::Decryption(format!("{}: {}", entry.file_name, reason))
            } else {
                ArchiveError::Format(format!("{}: {}", entry.file_name, reason))
            });
        }

        Ok(data)
    }

    fn decrypt(&self, entry: &ZipFileEntry, raw: &[u8]) -> Result<Vec<u8>> {
        let password = self.password.as_deref().ok_or_else(|| {
            ArchiveError::Decryption(format!(
                "{} is encrypted and no password was given",
                entry.file_name
            ))
        })?;

        match entry.aes {
            Some(aes) => crypto::decrypt_aes(raw, password, aes.strength),
            None if entry.compression_method == CompressionMethod::Aes => Err(
                ArchiveError::Format(format!("{} is missing its AES extra field", entry.file_name)),
            ),
            None => {
                let check_byte = if entry.has_data_descriptor() {
                    (entry.last_mod_time >> 8) as u8
                } else {
                    (entry.crc32 >> 24) as u8
                };
                crypto::decrypt_zipcrypto(raw, password, check_byte)
            }
        }
    }
}

fn decompress(entry: &ZipFileEntry, data: Vec<u8>) -> Result<Vec<u8>> {
    match entry.effective_method() {
        CompressionMethod::Stored => Ok(data),
        CompressionMethod::Deflate => {
            let limit = entry.uncompressed_size;
            let mut out = Vec::with_capacity(limit.min(MAX_PREALLOC) as usize);
            // One byte past the declared size is enough to detect a mismatch
            DeflateDecoder::new(data.as_slice())
                .take(limit.saturating_add(1))
                .read_to_end(&mut out)
                .map_err(|e| ArchiveError::Format(format!("deflate stream: {}", e)))?;
            Ok(out)
        }
        other => Err(ArchiveError::Unsupported(format!(
            "compression method {} for {}",
            other.as_u16(),
            entry.file_name
        ))),
    }
}

fn verify(entry: &ZipFileEntry, data: &[u8]) -> std::result::Result<(), String> {
    if data.len() as u64 != entry.uncompressed_size {
        return Err(format!(
            "size mismatch (expected {}, got {})",
            entry.uncompressed_size,
            data.len()
        ));
    }

    // AE-2 deliberately zeroes the CRC; the HMAC already authenticated it
    let crc_stored = !matches!(entry.aes, Some(aes) if aes.vendor_version == 2);
    if crc_stored && crc32fast::hash(data) != entry.crc32 {
        return Err("CRC-32 mismatch".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::{Cursor, Write};
    use zip::unstable::write::FileOptionsExt;
    use zip::write::SimpleFileOptions;
    use zip::{AesMode, CompressionMethod as Method, ZipWriter};

    struct MemoryReader(Vec<u8>);

    #[async_trait]
    impl ReadAt for MemoryReader {
        async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
            let start = (offset as usize).min(self.0.len());
            let n = buf.len().min(self.0.len() - start);
            buf[..n].copy_from_slice(&self.0[start..start + n]);
            Ok(n)
        }

        fn size(&self) -> u64 {
            self.0.len() as u64
        }
    }

    fn build(files: &[(&str, &[u8])], options: SimpleFileOptions) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            if name.ends_with('/') {
                writer
                    .add_directory(name.to_string(), SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer.start_file(name.to_string(), options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    async fn open(bytes: Vec<u8>) -> ZipArchive<MemoryReader> {
        ZipArchive::open(Arc::new(MemoryReader(bytes))).await.unwrap()
    }

    #[tokio::test]
    async fn reads_stored_and_deflated_entries() {
        let text = b"lorem ipsum dolor sit amet ".repeat(50);
        for method in [Method::Stored, Method::Deflated] {
            let options = SimpleFileOptions::default().compression_method(method);
            let archive = open(build(&[("docs/", b""), ("docs/a.txt", &text)], options)).await;

            let names: Vec<_> = archive.entries().iter().map(|e| e.file_name.as_str()).collect();
            assert_eq!(names, ["docs/", "docs/a.txt"]);
            assert_eq!(archive.read_by_name("docs/a.txt").await.unwrap(), text);
            assert!(archive.read_by_name("docs/").await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn zero_byte_entry_reads_empty() {
        let archive = open(build(&[("empty.bin", b"")], SimpleFileOptions::default())).await;
        assert!(archive.read_by_name("empty.bin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_entry_is_not_found() {
        let archive = open(build(&[("a.txt", b"a")], SimpleFileOptions::default())).await;
        let err = archive.read_by_name("b.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn aes_entry_needs_the_right_password() {
        let options = SimpleFileOptions::default()
            .compression_method(Method::Deflated)
            .with_aes_encryption(AesMode::Aes256, "hunter2");
        let mut archive = open(build(&[("secret.txt", b"top secret")], options)).await;
        assert!(archive.is_encrypted());

        let err = archive.read_by_name("secret.txt").await.unwrap_err();
        assert!(matches!(err, ArchiveError::Decryption(_)));

        archive.set_password(b"wrong");
        let err = archive.read_by_name("secret.txt").await.unwrap_err();
        assert!(matches!(err, ArchiveError::Decryption(_)));

        archive.set_password(b"hunter2");
        assert_eq!(archive.read_by_name("secret.txt").await.unwrap(), b"top secret");
    }

    #[tokio::test]
    async fn password_is_ignored_for_plain_entries() {
        let mut archive = open(build(&[("a.txt", b"plain")], SimpleFileOptions::default())).await;
        archive.set_password(b"anything");
        assert_eq!(archive.read_by_name("a.txt").await.unwrap(), b"plain");
    }

    #[tokio::test]
    async fn truncated_aes_extra_field_is_a_format_error() {
        let options = SimpleFileOptions::default().with_aes_encryption(AesMode::Aes256, "hunter2");
        let mut bytes = build(&[("secret.txt", b"top secret")], options);

        // Shrink the central directory size so the trailing 0x9901 field is cut short
        let cd_size_at = bytes.len() - 22 + 12;
        let cd_size = u32::from_le_bytes(bytes[cd_size_at..cd_size_at + 4].try_into().unwrap());
        bytes[cd_size_at..cd_size_at + 4].copy_from_slice(&(cd_size - 3).to_le_bytes());

        let result = ZipArchive::open(Arc::new(MemoryReader(bytes))).await;
        assert!(matches!(result, Err(ArchiveError::Format(_))));
    }

    #[tokio::test]
    async fn zipcrypto_entries_need_the_right_password() {
        for method in [Method::Stored, Method::Deflated] {
            let options = SimpleFileOptions::default()
                .compression_method(method)
                .with_deprecated_encryption(b"hunter2");
            let text = b"legacy encryption ".repeat(20);
            let mut archive = open(build(&[("old.txt", &text)], options)).await;

            let entry = archive.find("old.txt").unwrap();
            assert!(entry.is_encrypted());
            assert!(entry.aes.is_none());

            let err = archive.read_by_name("old.txt").await.unwrap_err();
            assert!(matches!(err, ArchiveError::Decryption(_)));

            archive.set_password(b"hunter3");
            let err = archive.read_by_name("old.txt").await.unwrap_err();
            assert!(matches!(err, ArchiveError::Decryption(_)));

            archive.set_password(b"hunter2");
            assert_eq!(archive.read_by_name("old.txt").await.unwrap(), text);
        }
    }

    #[tokio::test]
    async fn garbage_is_not_a_zip() {
        let result = ZipArchive::open(Arc::new(MemoryReader(b"definitely not a zip".to_vec()))).await;
        assert!(matches!(result, Err(ArchiveError::Format(_))));
    }
}
