//! `generate-key`: print a fresh key in the forms operators paste into config.

use std::io::Write;

use anyhow::Result;
use fieldstore::EncryptionKey;

use crate::config::KEY_ENV;

/// Generate a key and write the settings line, the `.env` line and warnings.
pub fn run(out: &mut impl Write) -> Result<()> {
    let key = EncryptionKey::generate();
    let encoded = key.to_base64();

    writeln!(out, "Generated field encryption key (id {}).", key.id())?;
    writeln!(out)?;
    writeln!(out, "Settings / environment:")?;
    writeln!(out, "    {KEY_ENV} = \"{}\"", encoded.as_str())?;
    writeln!(out)?;
    writeln!(out, ".env:")?;
    writeln!(out, "{KEY_ENV}={}", encoded.as_str())?;
    writeln!(out)?;
    writeln!(out, "WARNING: store this key in a secret manager. Values encrypted under it cannot be recovered without it.")?;
    writeln!(out, "WARNING: never commit this key to version control.")?;
    writeln!(out, "WARNING: when rotating, keep the previous key available as FIELD_ENCRYPTION_OLD_KEY until `lumi-keytool verify` is clean.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_line_holds_a_usable_key() {
        let mut out = Vec::new();
        run(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let line = text
            .lines()
            .find_map(|l| l.strip_prefix("FIELD_ENCRYPTION_KEY="))
            .unwrap();
        assert_eq!(line.len(), 44);
        let key = EncryptionKey::from_base64(line).unwrap();
        assert!(text.contains(&key.id().to_string()));
        assert!(text.contains("WARNING"));
    }

    #[test]
    fn each_run_generates_a_different_key() {
        let (mut a, mut b) = (Vec::new(), Vec::new());
        run(&mut a).unwrap();
        run(&mut b).unwrap();
        assert_ne!(a, b);
    }
}
