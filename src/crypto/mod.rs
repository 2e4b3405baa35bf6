//! Authenticated encryption at rest: AES-256-GCM with a random 96-bit
//! nonce and a 128-bit tag, the way the teacher's `crypto::file_encryption`
//! module builds its AEAD primitive, generalized from file-at-a-time
//! encryption to the record framing storage engines need.
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use rand::TryRngCore;
use rand::rngs::OsRng;
use std::io::{self, Read, Write};

use crate::errors::{MinileafError, Result};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// A 256-bit AEAD key.
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.unwrap_err().fill_bytes(&mut bytes);
        Self(bytes)
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Encrypt `plaintext`, returning `nonce ‖ ciphertext ‖ tag`.
///
/// # Errors
/// Returns an error if the underlying AEAD cipher rejects the key.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.unwrap_err().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| MinileafError::Crypto(format!("encrypt: {e}")))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `nonce ‖ ciphertext ‖ tag` blob produced by [`encrypt`].
///
/// # Errors
/// Returns [`MinileafError::CorruptedCiphertext`] if the blob is too short
/// to contain a nonce, or if the authentication tag does not match.
pub fn decrypt(key: &EncryptionKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN {
        return Err(MinileafError::CorruptedCiphertext);
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher.decrypt(nonce, ciphertext).map_err(|_| MinileafError::CorruptedCiphertext)
}

/// Write `[u32 length][length bytes of blob]`, the framing every on-disk
/// record uses so a single record can be read (and, when encrypted,
/// decrypted) independently of its neighbors.
///
/// # Errors
/// Returns an error if the underlying writer fails, or if `blob` exceeds
/// `u32::MAX` bytes.
pub fn write_framed<W: Write>(writer: &mut W, blob: &[u8]) -> io::Result<()> {
    let len = u32::try_from(blob.len()).map_err(io::Error::other)?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(blob)
}

/// Read one `[u32 length][length bytes]` frame. Returns `Ok(None)` at a
/// clean EOF between frames.
///
/// # Errors
/// Returns an error for a truncated frame (EOF mid-length or mid-payload).
pub fn read_framed<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plaintext() {
        let key = EncryptionKey::generate();
        let ct = encrypt(&key, b"hello world").unwrap();
        let pt = decrypt(&key, &ct).unwrap();
        assert_eq!(pt, b"hello world");
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let key = EncryptionKey::generate();
        let mut ct = encrypt(&key, b"secret").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xff;
        let err = decrypt(&key, &ct).unwrap_err();
        assert!(matches!(err, MinileafError::CorruptedCiphertext));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let key_a = EncryptionKey::generate();
        let key_b = EncryptionKey::generate();
        let ct = encrypt(&key_a, b"secret").unwrap();
        assert!(decrypt(&key_b, &ct).is_err());
    }

    #[test]
    fn frame_round_trips_a_single_record() {
        let mut buf = Vec::new();
        write_framed(&mut buf, b"abc").unwrap();
        write_framed(&mut buf, b"defgh").unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(read_framed(&mut cursor).unwrap(), Some(b"abc".to_vec()));
        assert_eq!(read_framed(&mut cursor).unwrap(), Some(b"defgh".to_vec()));
        assert_eq!(read_framed(&mut cursor).unwrap(), None);
    }
}
