//! Resolving a field encryption key from the environment or AWS Secrets Manager.
//!
//! # Security invariants
//!
//! - Inline key text is held in a zeroizing buffer until parsed.
//! - Key material is never logged; only the key id is.

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use fieldstore::{EncryptedFieldStore, EncryptionKey};
use tracing::info;
use zeroize::Zeroizing;

/// Where a key is loaded from.
pub enum KeySource {
    /// Base64 key text taken from an environment variable.
    Inline {
        /// Variable the key was read from, for error messages.
        var: &'static str,
        /// The key text.
        encoded: Zeroizing<String>,
    },
    /// A Secrets Manager secret holding the key.
    SecretsManager {
        /// Secret name or ARN.
        secret_id: String,
    },
}

impl KeySource {
    /// Pick the source from an inline key and a secret id. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if both are set.
    pub fn select(
        inline: Option<&str>,
        secret_id: Option<&str>,
        inline_var: &'static str,
        secret_var: &'static str,
    ) -> Result<Option<Self>> {
        let inline = inline.map(str::trim).filter(|s| !s.is_empty());
        let secret_id = secret_id.map(str::trim).filter(|s| !s.is_empty());
        match (inline, secret_id) {
            (Some(_), Some(_)) => anyhow::bail!("set only one of {inline_var} and {secret_var}"),
            (Some(encoded), None) => Ok(Some(Self::Inline {
                var: inline_var,
                encoded: Zeroizing::new(encoded.to_owned()),
            })),
            (None, Some(id)) => Ok(Some(Self::SecretsManager {
                secret_id: id.to_owned(),
            })),
            (None, None) => Ok(None),
        }
    }

    /// Load and parse the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret cannot be fetched or the key is invalid.
    pub async fn resolve(&self) -> Result<EncryptionKey> {
        let key = match self {
            Self::Inline { var, encoded } => EncryptionKey::from_base64(encoded)
                .with_context(|| format!("{var} does not hold a valid field encryption key"))?,
            Self::SecretsManager { secret_id } => fetch_secret(secret_id).await?,
        };
        info!(source = %self.describe(), key_id = %key.id(), "field encryption key loaded");
        Ok(key)
    }

    /// Resolve the key and wrap it in a store.
    ///
    /// # Errors
    ///
    /// See [`KeySource::resolve`].
    pub async fn store(&self) -> Result<EncryptedFieldStore> {
        Ok(EncryptedFieldStore::new(self.resolve().await?))
    }

    /// Non-secret description for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Inline { var, .. } => format!("env:{var}"),
            Self::SecretsManager { secret_id } => format!("secretsmanager:{secret_id}"),
        }
    }
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeySource({})", self.describe())
    }
}

/// Fetch a key from Secrets Manager using the default AWS credential chain.
async fn fetch_secret(secret_id: &str) -> Result<EncryptionKey> {
    let sdk = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let client = aws_sdk_secretsmanager::Client::new(&sdk);

    let secret = client
        .get_secret_value()
        .secret_id(secret_id)
        .send()
        .await
        .context("failed to fetch field encryption key from Secrets Manager")?;

    key_from_secret(secret.secret_string(), secret.secret_binary().map(AsRef::<[u8]>::as_ref))
        .with_context(|| format!("secret {secret_id} does not hold a valid field encryption key"))
}

/// Parse a key from a secret value: base64 text, or 32 raw bytes when stored as binary.
fn key_from_secret(text: Option<&str>, binary: Option<&[u8]>) -> Result<EncryptionKey> {
    match (text, binary) {
        (Some(text), _) => Ok(EncryptionKey::from_base64(text)?),
        (None, Some(bytes)) => Ok(EncryptionKey::from_bytes(bytes)?),
        (None, None) => anyhow::bail!("secret has no value"),
    }
}
