//! Configuration loading and validation for the keytool.
//!
//! All values are read from environment variables at startup. Which key
//! variables are required depends on the subcommand, so presence is checked
//! when a command asks for a key source rather than here.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::key_source::KeySource;

/// Active key, inline.
pub const KEY_ENV: &str = "FIELD_ENCRYPTION_KEY";
/// Active key, as a Secrets Manager secret id.
pub const SECRET_ID_ENV: &str = "FIELD_ENCRYPTION_SECRET_ID";
/// Retiring key, inline.
pub const OLD_KEY_ENV: &str = "FIELD_ENCRYPTION_OLD_KEY";
/// Retiring key, as a Secrets Manager secret id.
pub const OLD_SECRET_ID_ENV: &str = "FIELD_ENCRYPTION_OLD_SECRET_ID";

/// Validated keytool configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Base64 active key.
    #[serde(default)]
    pub field_encryption_key: Option<String>,

    /// Secrets Manager id holding the active key.
    #[serde(default)]
    pub field_encryption_secret_id: Option<String>,

    /// Base64 key being rotated away from.
    #[serde(default)]
    pub field_encryption_old_key: Option<String>,

    /// Secrets Manager id holding the key being rotated away from.
    #[serde(default)]
    pub field_encryption_old_secret_id: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the key settings conflict.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Where the active key comes from.
    ///
    /// # Errors
    ///
    /// Returns an error if neither active key variable is set.
    pub fn active_key_source(&self) -> Result<KeySource> {
        KeySource::select(
            self.field_encryption_key.as_deref(),
            self.field_encryption_secret_id.as_deref(),
            KEY_ENV,
            SECRET_ID_ENV,
        )?
        .with_context(|| {
            format!("{KEY_ENV} or {SECRET_ID_ENV} is required; run `lumi-keytool generate-key`")
        })
    }

    /// Where the retiring key comes from.
    ///
    /// # Errors
    ///
    /// Returns an error if neither old key variable is set.
    pub fn old_key_source(&self) -> Result<KeySource> {
        KeySource::select(
            self.field_encryption_old_key.as_deref(),
            self.field_encryption_old_secret_id.as_deref(),
            OLD_KEY_ENV,
            OLD_SECRET_ID_ENV,
        )?
        .with_context(|| format!("{OLD_KEY_ENV} or {OLD_SECRET_ID_ENV} is required for rotation"))
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.log_level, "LOG_LEVEL")?;
        ensure_not_both(
            &self.field_encryption_key,
            &self.field_encryption_secret_id,
            KEY_ENV,
            SECRET_ID_ENV,
        )?;
        ensure_not_both(
            &self.field_encryption_old_key,
            &self.field_encryption_old_secret_id,
            OLD_KEY_ENV,
            OLD_SECRET_ID_ENV,
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("field_encryption_key", &redact(&self.field_encryption_key))
            .field("field_encryption_secret_id", &self.field_encryption_secret_id)
            .field("field_encryption_old_key", &redact(&self.field_encryption_old_key))
            .field("field_encryption_old_secret_id", &self.field_encryption_old_secret_id)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

fn ensure_not_both(a: &Option<String>, b: &Option<String>, a_name: &str, b_name: &str) -> Result<()> {
    let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    if set(a) && set(b) {
        anyhow::bail!("set only one of {a_name} and {b_name}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            field_encryption_key: None,
            field_encryption_secret_id: None,
            field_encryption_old_key: None,
            field_encryption_old_secret_id: None,
            log_level: default_log_level(),
        }
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn no_key_is_valid_until_a_command_needs_one() {
        let cfg = base();
        assert!(cfg.validate().is_ok());
        let err = cfg.active_key_source().unwrap_err().to_string();
        assert!(err.contains(KEY_ENV));
        assert!(err.contains("generate-key"));
    }

    #[test]
    fn validate_rejects_both_active_sources() {
        let cfg = Config {
            field_encryption_key: Some("k".into()),
            field_encryption_secret_id: Some("prod/lumi/field-key".into()),
            ..base()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_log_level() {
        let cfg = Config {
            log_level: " ".into(),
            ..base()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn old_source_is_required_separately() {
        let cfg = Config {
            field_encryption_key: Some("k".into()),
            ..base()
        };
        assert!(cfg.active_key_source().is_ok());
        assert!(cfg.old_key_source().is_err());
    }

    #[test]
    fn debug_redacts_inline_keys() {
        let cfg = Config {
            field_encryption_key: Some("super-secret".into()),
            ..base()
        };
        assert!(!format!("{cfg:?}").contains("super-secret"));
    }
}
