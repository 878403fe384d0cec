//! AES-256-GCM-SIV sealing and opening of individual field values.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-resistant.
//! A fresh random nonce is still drawn for every call, so sealing the same
//! plaintext twice yields two different tokens. Encrypted attributes are
//! therefore never comparable by token and never queryable.
//!
//! The token header (version, key id, timestamp) is bound as associated data:
//! editing any header byte fails authentication.

use aes_gcm_siv::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256GcmSiv, Nonce,
};
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the authentication tag appended to the ciphertext.
pub const TAG_LEN: usize = 16;

/// Byte length of the key id embedded in every token.
pub const KEY_ID_LEN: usize = 4;

/// Version byte at the start of every token.
pub const TOKEN_VERSION: u8 = 1;

/// `version(1) | key_id(4) | issued_at(8)`.
pub const HEADER_LEN: usize = 1 + KEY_ID_LEN + 8;

/// Shortest possible token: header, nonce and tag around an empty plaintext.
pub const MIN_TOKEN_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

/// Largest plaintext accepted for a single field.
pub const MAX_PLAINTEXT_LEN: usize = 64 * 1024;

/// A parsed token.
///
/// The byte representation is
/// `version | key_id | issued_at (u64 BE) | nonce | ciphertext+tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedToken {
    /// Id of the key the token was sealed under.
    pub key_id: [u8; KEY_ID_LEN],
    /// Unix timestamp (seconds) at which the token was sealed.
    pub issued_at: u64,
    /// Raw nonce bytes.
    pub nonce: [u8; NONCE_LEN],
    /// Raw ciphertext + authentication tag bytes.
    pub ciphertext: Vec<u8>,
}

impl SealedToken {
    fn header(&self) -> [u8; HEADER_LEN] {
        header_bytes(self.key_id, self.issued_at)
    }

    /// Encode this token to its canonical byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.header());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse a token back into a [`SealedToken`].
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidFormat`] if the bytes are too short to be
    /// a token, or [`CipherError::UnsupportedVersion`] for an unknown version byte.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        let (&version, rest) = bytes.split_first().ok_or(CipherError::InvalidFormat)?;
        if version != TOKEN_VERSION {
            return Err(CipherError::UnsupportedVersion(version));
        }
        if bytes.len() < MIN_TOKEN_LEN {
            return Err(CipherError::InvalidFormat);
        }

        let (key_id_bytes, rest) = rest.split_at(KEY_ID_LEN);
        let (ts_bytes, rest) = rest.split_at(8);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let mut key_id = [0u8; KEY_ID_LEN];
        key_id.copy_from_slice(key_id_bytes);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(ts_bytes);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);

        Ok(Self {
            key_id,
            issued_at: u64::from_be_bytes(ts),
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// The plaintext exceeds [`MAX_PLAINTEXT_LEN`].
    #[error("plaintext of {0} bytes exceeds the {MAX_PLAINTEXT_LEN} byte limit")]
    PayloadTooLarge(usize),

    /// AES-GCM-SIV encryption or decryption failed.
    #[error("aead operation failed")]
    AeadFailure,

    /// The token bytes do not match the expected layout.
    #[error("invalid token format")]
    InvalidFormat,

    /// The token was produced by an unknown format version.
    #[error("unsupported token version {0}")]
    UnsupportedVersion(u8),
}

/// Seal a plaintext field value using AES-256-GCM-SIV.
///
/// A random 96-bit nonce is generated per call via the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CipherError::PayloadTooLarge`] if `plaintext` exceeds
/// [`MAX_PLAINTEXT_LEN`], [`CipherError::InvalidKeyLength`] if `key` is not
/// [`KEY_LEN`] bytes, and [`CipherError::AeadFailure`] on an internal AEAD error.
pub fn seal(
    plaintext: &[u8],
    key: &[u8],
    key_id: [u8; KEY_ID_LEN],
    issued_at: u64,
) -> Result<SealedToken, CipherError> {
    if plaintext.len() > MAX_PLAINTEXT_LEN {
        return Err(CipherError::PayloadTooLarge(plaintext.len()));
    }
    let cipher = build_cipher(key)?;

    use aes_gcm_siv::aead::rand_core::RngCore;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let header = header_bytes(key_id, issued_at);
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &header,
            },
        )
        .map_err(|_| CipherError::AeadFailure)?;

    Ok(SealedToken {
        key_id,
        issued_at,
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Open a [`SealedToken`] back to plaintext bytes.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
/// Returns [`CipherError::AeadFailure`] if authentication fails (wrong key or tampered data).
pub fn open(token: &SealedToken, key: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = build_cipher(key)?;
    let header = token.header();
    cipher
        .decrypt(
            Nonce::from_slice(&token.nonce),
            Payload {
                msg: token.ciphertext.as_ref(),
                aad: &header,
            },
        )
        .map_err(|_| CipherError::AeadFailure)
}

fn header_bytes(key_id: [u8; KEY_ID_LEN], issued_at: u64) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = TOKEN_VERSION;
    header[1..1 + KEY_ID_LEN].copy_from_slice(&key_id);
    header[1 + KEY_ID_LEN..].copy_from_slice(&issued_at.to_be_bytes());
    header
}

fn build_cipher(key: &[u8]) -> Result<Aes256GcmSiv, CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength);
    }
    Aes256GcmSiv::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength)
}
