//! [`EncryptedToken`]: the opaque bytes persisted in place of a plaintext value.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::cipher::SealedToken;
use crate::key::KeyId;

/// Opaque authenticated-encryption output stored in a binary column.
///
/// Two tokens for the same plaintext are never equal, so token equality says
/// nothing about plaintext equality. In text formats (JSON) the bytes are
/// written as unpadded URL-safe base64.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedToken(Vec<u8>);

impl EncryptedToken {
    /// Wrap bytes loaded from storage. No validation happens until decrypt.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Borrow the raw token bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the token, returning its bytes for persistence.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Id of the key the token claims to be sealed under, if the header parses.
    pub fn key_id(&self) -> Option<KeyId> {
        SealedToken::from_bytes(&self.0).ok().map(|t| KeyId(t.key_id))
    }
}

impl AsRef<[u8]> for EncryptedToken {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptedToken({} bytes)", self.0.len())
    }
}

impl Serialize for EncryptedToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for EncryptedToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map(Self)
            .map_err(|_| de::Error::custom("encrypted token is not valid base64url"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_contents() {
        let token = EncryptedToken::from_bytes(vec![1, 2, 3]);
        assert_eq!(format!("{token:?}"), "EncryptedToken(3 bytes)");
    }

    #[test]
    fn serialises_as_base64url() {
        let token = EncryptedToken::from_bytes(vec![0xFB, 0xFF]);
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"-_8\"");
        let back: EncryptedToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(serde_json::from_str::<EncryptedToken>("\"***\"").is_err());
    }

    #[test]
    fn key_id_absent_for_garbage() {
        assert!(EncryptedToken::from_bytes(vec![0u8; 3]).key_id().is_none());
    }
}
