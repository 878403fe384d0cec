//! [`EncryptionKey`]: the 256-bit secret behind every token, and its public [`KeyId`].

use aes_gcm_siv::aead::OsRng;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine as _,
};
use hmac::{
    digest::{generic_array::GenericArray, KeyInit},
    Hmac, Mac,
};
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::{KEY_ID_LEN, KEY_LEN};

type HmacSha256 = Hmac<Sha256>;

const KEY_ID_LABEL: &[u8] = b"lumi-fieldstore/key-id/v1";
const HMAC_BLOCK_LEN: usize = 64;

/// Errors produced while parsing key material.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The encoded key is not valid base64 in either alphabet.
    #[error("encryption key is not valid base64")]
    InvalidEncoding,

    /// The decoded key material has an unexpected length.
    #[error("encryption key has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

/// Non-secret fingerprint of an [`EncryptionKey`].
///
/// Embedded in every token and safe to log.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId(pub [u8; KEY_ID_LEN]);

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyId({self})")
    }
}

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// The memory is overwritten with zeroes on drop to minimise the window
/// during which plaintext key material lives in RAM.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
    id: KeyId,
}

impl EncryptionKey {
    /// Generate a fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        use aes_gcm_siv::aead::rand_core::RngCore;
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut *bytes);
        Self::from_array(&bytes)
    }

    /// Build a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidLength`] if the slice is not [`KEY_LEN`] bytes.
    pub fn from_bytes(key_bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: &[u8; KEY_LEN] = key_bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(key_bytes.len()))?;
        Ok(Self::from_array(bytes))
    }

    /// Parse a base64-encoded key.
    ///
    /// The URL-safe alphabet (the shape of a Fernet key) is tried first, then
    /// the standard alphabet. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidEncoding`] or [`KeyError::InvalidLength`].
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let encoded = encoded.trim();
        let decoded = URL_SAFE
            .decode(encoded)
            .or_else(|_| STANDARD.decode(encoded))
            .map(Zeroizing::new)
            .map_err(|_| KeyError::InvalidEncoding)?;
        Self::from_bytes(&decoded)
    }

    /// Encode the key for storage in an environment variable or secret store.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(URL_SAFE.encode(self.bytes))
    }

    /// Public fingerprint of this key.
    pub fn id(&self) -> KeyId {
        self.id
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.bytes
    }

    fn from_array(bytes: &[u8; KEY_LEN]) -> Self {
        Self {
            bytes: *bytes,
            id: derive_key_id(bytes),
        }
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        write!(f, "EncryptionKey([REDACTED], id={})", self.id)
    }
}

fn derive_key_id(bytes: &[u8; KEY_LEN]) -> KeyId {
    // HMAC zero-pads keys shorter than the block size, so this is plain HMAC-SHA256.
    let mut block = Zeroizing::new([0u8; HMAC_BLOCK_LEN]);
    block[..KEY_LEN].copy_from_slice(bytes);
    let mut mac = <HmacSha256 as KeyInit>::new(GenericArray::from_slice(&block[..]));
    mac.update(KEY_ID_LABEL);
    let tag = mac.finalize().into_bytes();

    let mut id = [0u8; KEY_ID_LEN];
    id.copy_from_slice(&tag[..KEY_ID_LEN]);
    KeyId(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let a = EncryptionKey::generate();
        let b = EncryptionKey::generate();
        assert_ne!(a.expose(), b.expose());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn base64_round_trip_preserves_key_and_id() {
        let key = EncryptionKey::generate();
        let encoded = key.to_base64();
        assert_eq!(encoded.len(), 44);
        let decoded = EncryptionKey::from_base64(&encoded).unwrap();
        assert_eq!(decoded.expose(), key.expose());
        assert_eq!(decoded.id(), key.id());
    }

    #[test]
    fn accepts_standard_alphabet_and_whitespace() {
        let raw = [0xFBu8; KEY_LEN];
        let encoded = format!("  {}\n", STANDARD.encode(raw));
        let key = EncryptionKey::from_base64(&encoded).unwrap();
        assert_eq!(key.expose(), &raw[..]);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            EncryptionKey::from_bytes(&[0u8; 16]),
            Err(KeyError::InvalidLength(16))
        ));
        let short = URL_SAFE.encode([1u8; 31]);
        assert!(matches!(
            EncryptionKey::from_base64(&short),
            Err(KeyError::InvalidLength(31))
        ));
    }

    #[test]
    fn rejects_non_base64() {
        assert!(matches!(
            EncryptionKey::from_base64("not a key!"),
            Err(KeyError::InvalidEncoding)
        ));
    }

    #[test]
    fn key_id_is_deterministic() {
        let a = EncryptionKey::from_bytes(&[7u8; KEY_LEN]).unwrap();
        let b = EncryptionKey::from_bytes(&[7u8; KEY_LEN]).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id().to_string().len(), KEY_ID_LEN * 2);
    }

    #[test]
    fn key_redacted_in_debug() {
        let key = EncryptionKey::from_bytes(&[0xFFu8; KEY_LEN]).unwrap();
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains(&*key.to_base64()));
    }
}
