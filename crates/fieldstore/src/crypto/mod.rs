//! AES-256-GCM-SIV field encryption primitives.
//!
//! This module knows nothing about records, repositories or configuration.
//! It provides the low-level seal/open operations used by
//! [`EncryptedFieldStore`](crate::EncryptedFieldStore).
//!
//! # Token format
//!
//! ```text
//! version(1) | key_id(4) | issued_at_unix_secs(8, BE) | nonce(12) | ciphertext+tag
//! ```
//!
//! The version byte enables future algorithm migration without breaking
//! existing tokens. The key id lets rotation tell "sealed under another key"
//! apart from "corrupted" before any AEAD work is done.

pub mod cipher;

pub use cipher::{KEY_ID_LEN, KEY_LEN};
