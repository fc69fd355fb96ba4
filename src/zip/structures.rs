use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{ArchiveError, Result};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    /// WinZip AES marker; the real method lives in the 0x9901 extra field
    Aes,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            99 => CompressionMethod::Aes,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Aes => 99,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Key size of a WinZip AES entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesStrength {
    Aes128,
    Aes192,
    Aes256,
}

impl AesStrength {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AesStrength::Aes128),
            2 => Some(AesStrength::Aes192),
            3 => Some(AesStrength::Aes256),
            _ => None,
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            AesStrength::Aes128 => 16,
            AesStrength::Aes192 => 24,
            AesStrength::Aes256 => 32,
        }
    }

    pub fn salt_len(&self) -> usize {
        self.key_len() / 2
    }
}

/// WinZip AES extra field (header ID 0x9901) - 7 bytes of data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesExtraField {
    /// 1 for AE-1 (CRC stored), 2 for AE-2 (CRC zeroed)
    pub vendor_version: u16,
    pub strength: AesStrength,
    /// Method applied to the plaintext before encryption
    pub compression_method: CompressionMethod,
}

impl AesExtraField {
    pub const HEADER_ID: u16 = 0x9901;
    pub const SIZE: usize = 7;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ArchiveError::Format("truncated AES extra field".into()));
        }

        let mut cursor = Cursor::new(data);
        let vendor_version = cursor.read_u16::<LittleEndian>()?;
        let mut vendor_id = [0u8; 2];
        std::io::Read::read_exact(&mut cursor, &mut vendor_id)?;
        if &vendor_id != b"AE" {
            return Err(ArchiveError::Format("invalid AES vendor ID".into()));
        }
        let strength = cursor.read_u8()?;
        let strength = AesStrength::from_u8(strength)
            .ok_or_else(|| ArchiveError::Unsupported(format!("AES strength {}", strength)))?;
        let method = cursor.read_u16::<LittleEndian>()?;

        Ok(Self {
            vendor_version,
            strength,
            compression_method: CompressionMethod::from_u16(method),
        })
    }
}

/// Check the 4-byte signature and minimum length of a fixed record.
fn record<'a>(
    data: &'a [u8],
    signature: &[u8],
    min_len: usize,
    what: &str,
) -> Result<Cursor<&'a [u8]>> {
    if data.len() < min_len || &data[..4] != signature {
        return Err(ArchiveError::Format(format!("invalid {}", what)));
    }
    Ok(Cursor::new(&data[4..]))
}

/// Saturated 16/32-bit field: the real value lives in the ZIP64 record
const U16_SATURATED: u16 = 0xFFFF;
const U32_SATURATED: u32 = 0xFFFF_FFFF;

/// End of Central Directory record (22 bytes plus comment).
///
/// Only the fields needed to find the central directory are kept.
pub struct EndOfCentralDirectory {
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    saturated: bool,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;
    /// Offset of the comment length field
    pub const COMMENT_LEN_OFFSET: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = record(data, Self::SIGNATURE, Self::SIZE, "End of Central Directory")?;
        // disk number, disk holding the central directory
        cursor.set_position(4);
        let disk_entries = cursor.read_u16::<LittleEndian>()?;
        let total_entries = cursor.read_u16::<LittleEndian>()?;
        let cd_size = cursor.read_u32::<LittleEndian>()?;
        let cd_offset = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            total_entries,
            cd_size,
            cd_offset,
            saturated: disk_entries == U16_SATURATED
                || total_entries == U16_SATURATED
                || cd_size == U32_SATURATED
                || cd_offset == U32_SATURATED,
        })
    }

    /// True when a field overflowed and the ZIP64 record must be read
    pub fn is_zip64(&self) -> bool {
        self.saturated
    }
}

/// Points at the ZIP64 End of Central Directory (20 bytes, just before the EOCD)
pub struct Zip64EOCDLocator {
    pub eocd64_offset: u64,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = record(data, Self::SIGNATURE, Self::SIZE, "ZIP64 locator")?;
        cursor.set_position(4);
        Ok(Self {
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory (56 bytes minimum)
pub struct Zip64EOCD {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor =
            record(data, Self::SIGNATURE, Self::MIN_SIZE, "ZIP64 End of Central Directory")?;
        // record size, versions, disk numbers, entries on this disk
        cursor.set_position(28);
        Ok(Self {
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// General purpose flag: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;
/// General purpose flag: sizes and CRC follow the data in a descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    /// DOS time; its high byte is the ZipCrypto check byte when a data
    /// descriptor is used
    pub last_mod_time: u16,
    pub is_directory: bool,
    pub aes: Option<AesExtraField>,
}

impl ZipFileEntry {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// The method applied to the plaintext, looking through the AES wrapper.
    pub fn effective_method(&self) -> CompressionMethod {
        match (self.compression_method, self.aes) {
            (CompressionMethod::Aes, Some(aes)) => aes.compression_method,
            (method, _) => method,
        }
    }
}
