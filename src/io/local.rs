use super::ReadAt;
use crate::error::{ArchiveError, Result};
use async_trait::async_trait;
use std::path::Path;

/// Local file reader with random access support
pub struct LocalFileReader {
    file: std::fs::File,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ArchiveError::NotFound(path.display().to_string()),
            _ => ArchiveError::Io(e),
        })?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }

    #[cfg(unix)]
    fn pread(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn pread(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        // seek_read moves the cursor, but every read here passes its own offset
        use std::os::windows::fs::FileExt;
        self.file.seek_read(buf, offset)
    }

    #[cfg(not(any(unix, windows)))]
    fn pread(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        // Positional reads may come back short; keep going until EOF
        let mut received = 0;
        while received < buf.len() {
            match self.pread(offset + received as u64, &mut buf[received..]) {
                Ok(0) => break,
                Ok(n) => received += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_at_offsets_and_stops_at_eof() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();

        let reader = LocalFileReader::new(file.path()).unwrap();
        assert_eq!(reader.size(), 10);

        let mut buf = [0u8; 4];
        assert_eq!(reader.read_at(3, &mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"3456");

        let mut tail = [0u8; 8];
        assert_eq!(reader.read_at(6, &mut tail).await.unwrap(), 4);
        assert_eq!(&tail[..4], b"6789");
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFileReader::new(&dir.path().join("absent.zip"))
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }
}
