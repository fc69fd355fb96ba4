//! Entry decryption.
//!
//! Two schemes are found in the wild:
//!
//! - Traditional PKWARE encryption ("ZipCrypto"): a byte-wise stream cipher
//!   keyed by three CRC-driven registers. Every entry starts with a 12-byte
//!   header whose last byte must match the high byte of the CRC (or of the
//!   modification time when a data descriptor is used).
//! - WinZip AES (AE-1/AE-2): `salt | verifier(2) | ciphertext | hmac(10)`,
//!   keys derived with PBKDF2-HMAC-SHA1 (1000 rounds), AES in CTR mode with
//!   a little-endian counter starting at 1.

use aes::{Aes128, Aes192, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{ArchiveError, Result};

use super::structures::AesStrength;

/// Length of the ZipCrypto encryption header
pub const ZIPCRYPTO_HEADER_LEN: usize = 12;

const AES_VERIFIER_LEN: usize = 2;
const AES_MAC_LEN: usize = 10;
const AES_PBKDF2_ROUNDS: u32 = 1000;

/// One raw CRC-32 step as the PKWARE key schedule uses it: the register
/// is neither inverted on entry nor on exit, so `crc32fast`'s own
/// inversions are undone around it.
fn crc32_update(crc: u32, byte: u8) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(!crc);
    hasher.update(&[byte]);
    !hasher.finalize()
}

/// Key registers of the traditional PKWARE cipher
#[derive(Clone)]
struct ZipCryptoKeys {
    k0: u32,
    k1: u32,
    k2: u32,
}

impl ZipCryptoKeys {
    fn new(password: &[u8]) -> Self {
        let mut keys = Self {
            k0: 0x1234_5678,
            k1: 0x2345_6789,
            k2: 0x3456_7890,
        };
        for &b in password {
            keys.update(b);
        }
        keys
    }

    fn update(&mut self, byte: u8) {
        self.k0 = crc32_update(self.k0, byte);
        self.k1 = self
            .k1
            .wrapping_add(self.k0 & 0xFF)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.k2 = crc32_update(self.k2, (self.k1 >> 24) as u8);
    }

    fn stream_byte(&self) -> u8 {
        let temp = (self.k2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let plain = cipher ^ self.stream_byte();
        self.update(plain);
        plain
    }

    #[cfg(test)]
    fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let cipher = plain ^ self.stream_byte();
        self.update(plain);
        cipher
    }
}

/// Decrypt a ZipCrypto entry body (header included) and check the
/// password against the header's check byte.
pub fn decrypt_zipcrypto(data: &[u8], password: &[u8], check_byte: u8) -> Result<Vec<u8>> {
    if data.len() < ZIPCRYPTO_HEADER_LEN {
        return Err(ArchiveError::Format(
            "encrypted entry shorter than its header".into(),
        ));
    }

    let mut keys = ZipCryptoKeys::new(password);
    let mut header = [0u8; ZIPCRYPTO_HEADER_LEN];
    for (out, &b) in header.iter_mut().zip(&data[..ZIPCRYPTO_HEADER_LEN]) {
        *out = keys.decrypt_byte(b);
    }

    if header[ZIPCRYPTO_HEADER_LEN - 1] != check_byte {
        return Err(ArchiveError::Decryption("incorrect password".into()));
    }

    Ok(data[ZIPCRYPTO_HEADER_LEN..]
        .iter()
        .map(|&b| keys.decrypt_byte(b))
        .collect())
}

/// Decrypt a WinZip AES entry body, verifying both the password verifier
/// and the authentication code.
pub fn decrypt_aes(data: &[u8], password: &[u8], strength: AesStrength) -> Result<Vec<u8>> {
    let key_len = strength.key_len();
    let salt_len = strength.salt_len();

    if data.len() < salt_len + AES_VERIFIER_LEN + AES_MAC_LEN {
        return Err(ArchiveError::Format(
            "AES entry shorter than its framing".into(),
        ));
    }

    let (salt, rest) = data.split_at(salt_len);
    let (verifier, rest) = rest.split_at(AES_VERIFIER_LEN);
    let (ciphertext, mac) = rest.split_at(rest.len() - AES_MAC_LEN);

    // encryption key | authentication key | password verifier
    let mut derived = vec![0u8; 2 * key_len + AES_VERIFIER_LEN];
    pbkdf2::pbkdf2_hmac::<Sha1>(password, salt, AES_PBKDF2_ROUNDS, &mut derived);

    if &derived[2 * key_len..] != verifier {
        return Err(ArchiveError::Decryption("incorrect password".into()));
    }

    let mut authenticator = <Hmac<Sha1> as Mac>::new_from_slice(&derived[key_len..2 * key_len])
        .map_err(|e| ArchiveError::Decryption(e.to_string()))?;
    authenticator.update(ciphertext);
    let tag = authenticator.finalize().into_bytes();
    if &tag[..AES_MAC_LEN] != mac {
        return Err(ArchiveError::Decryption(
            "authentication code mismatch".into(),
        ));
    }

    let mut plain = ciphertext.to_vec();
    apply_aes_ctr(strength, &derived[..key_len], &mut plain)?;
    Ok(plain)
}

fn apply_aes_ctr(strength: AesStrength, key: &[u8], buf: &mut [u8]) -> Result<()> {
    match strength {
        AesStrength::Aes128 => keystream::<ctr::Ctr128LE<Aes128>>(key, buf),
        AesStrength::Aes192 => keystream::<ctr::Ctr128LE<Aes192>>(key, buf),
        AesStrength::Aes256 => keystream::<ctr::Ctr128LE<Aes256>>(key, buf),
    }
}

fn keystream<C: KeyIvInit + StreamCipher>(key: &[u8], buf: &mut [u8]) -> Result<()> {
    let iv = 1u128.to_le_bytes();
    let mut cipher =
        C::new_from_slices(key, &iv).map_err(|e| ArchiveError::Decryption(e.to_string()))?;
    cipher.apply_keystream(buf);
    Ok(())
}
