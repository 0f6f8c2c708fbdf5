//! Loading key material from the environment or from files.
//!
//! A key source is either `env:NAME` (read the variable `NAME`) or a path to
//! a file. The content is base64 text (standard or URL-safe, padding
//! optional). Public keys may also be given as an Ed25519 JWK
//! (`{"kty":"OKP","crv":"Ed25519","x":"..."}`).
//!
//! Seeds are returned in [`Zeroizing`] buffers and never logged.

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine as _,
};
use serde::Deserialize;
use std::{fmt, path::PathBuf, str::FromStr};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{Result, SealError};
use crate::signing::{PUBLIC_KEY_LEN, SEED_LEN};

/// Key files are tiny; anything larger is a mistake.
const MAX_KEY_FILE_BYTES: u64 = 16 * 1024;

/// Default variable for the signing seed.
pub const SEED_ENV: &str = "CFBK_SIGNING_SEED_BASE64";
/// Default variable for the verification key.
pub const PUBLIC_KEY_ENV: &str = "CFBK_PUBLIC_KEY_BASE64";

#[derive(Clone, PartialEq, Eq)]
pub enum KeySource {
    Env(String),
    File(PathBuf),
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env(name) => write!(f, "env:{name}"),
            Self::File(p) => write!(f, "{}", p.display()),
        }
    }
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for KeySource {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self> {
        match s.strip_prefix("env:") {
            Some("") => Err(SealError::Config("empty variable name in key source".into())),
            Some(name) => Ok(Self::Env(name.to_string())),
            None if s.is_empty() => Err(SealError::Config("empty key source".into())),
            None => Ok(Self::File(PathBuf::from(s))),
        }
    }
}

impl KeySource {
    /// Reads the raw text of the source.
    fn read_text(&self) -> Result<Zeroizing<String>> {
        match self {
            Self::Env(name) => std::env::var(name)
                .map(Zeroizing::new)
                .map_err(|_| SealError::Config(format!("environment variable {name} is not set"))),
            Self::File(path) => Ok(Zeroizing::new(crate::fs_guard::read_validated_string(
                path,
                MAX_KEY_FILE_BYTES,
            )?)),
        }
    }

    /// Loads a 32-byte signing seed.
    ///
    /// # Errors
    ///
    /// [`SealError::InvalidSeedLength`] if the decoded seed is not 32 bytes.
    pub fn load_seed(&self) -> Result<Zeroizing<Vec<u8>>> {
        let text = self.read_text()?;
        let seed = Zeroizing::new(decode_base64(text.trim())?);
        if seed.len() != SEED_LEN {
            return Err(SealError::InvalidSeedLength(seed.len()));
        }
        debug!(source = %self, "loaded signing seed");
        Ok(seed)
    }

    /// Loads a 32-byte Ed25519 public key from base64 text or a JWK.
    pub fn load_public_key(&self) -> Result<[u8; PUBLIC_KEY_LEN]> {
        let text = self.read_text()?;
        parse_public_key(text.trim())
    }
}

/// Parses base64 text or a JWK into a raw Ed25519 public key.
pub fn parse_public_key(text: &str) -> Result<[u8; PUBLIC_KEY_LEN]> {
    let bytes = if text.starts_with('{') {
        Jwk::parse(text)?.public_key_bytes()?
    } else {
        decode_base64(text)?
    };
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| SealError::InvalidKeyLength(len))
}

/// Accepts every base64 alphabet/padding combination in common use.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .or_else(|_| STANDARD_NO_PAD.decode(text))
        .or_else(|_| URL_SAFE.decode(text))
        .or_else(|_| URL_SAFE_NO_PAD.decode(text))
        .map_err(|_| SealError::Encoding("key material is not base64".into()))
}

/// The subset of an OKP JSON Web Key needed for Ed25519 verification.
#[derive(Debug, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
}

impl Jwk {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| SealError::Encoding(format!("public key JWK is malformed: {e}")))
    }

    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        if self.kty != "OKP" || self.crv != "Ed25519" {
            return Err(SealError::Encoding(format!(
                "unsupported JWK kty={} crv={}; expected OKP/Ed25519",
                self.kty, self.crv
            )));
        }
        URL_SAFE_NO_PAD
            .decode(self.x.trim_end_matches('='))
            .map_err(|_| SealError::Encoding("JWK x is not base64url".into()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::signing::KeyPair;
    use tempfile::TempDir;

    #[test]
    fn parses_sources() {
        assert_eq!(
            "env:MY_SEED".parse::<KeySource>().unwrap(),
            KeySource::Env("MY_SEED".into())
        );
        assert_eq!(
            "keys/seed.b64".parse::<KeySource>().unwrap(),
            KeySource::File("keys/seed.b64".into())
        );
        assert!("env:".parse::<KeySource>().is_err());
        assert!("".parse::<KeySource>().is_err());
    }

    #[test]
    fn loads_seed_from_file_with_newline() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("seed.b64");
        std::fs::write(&p, format!("{}\n", STANDARD.encode([5u8; 32]))).unwrap();
        let seed = KeySource::File(p).load_seed().unwrap();
        assert_eq!(seed.as_slice(), &[5u8; 32]);
    }

    #[test]
    fn short_seed_is_seed_length_error() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("seed.b64");
        std::fs::write(&p, STANDARD.encode([5u8; 16])).unwrap();
        assert!(matches!(
            KeySource::File(p).load_seed(),
            Err(SealError::InvalidSeedLength(16))
        ));
    }

    #[test]
    fn missing_env_var_is_config_error() {
        let src = KeySource::Env("ARTSEAL_TEST_DEFINITELY_UNSET_VAR".into());
        assert!(matches!(src.load_seed(), Err(SealError::Config(_))));
    }

    #[test]
    fn public_key_from_base64_variants() {
        let kp = KeyPair::from_seed(&[9u8; 32]).unwrap();
        for text in [
            STANDARD.encode(kp.public_key()),
            URL_SAFE_NO_PAD.encode(kp.public_key()),
        ] {
            assert_eq!(&parse_public_key(&text).unwrap(), kp.public_key());
        }
    }

    #[test]
    fn public_key_from_jwk() {
        let kp = KeyPair::from_seed(&[9u8; 32]).unwrap();
        let jwk = format!(
            r#"{{"kty":"OKP","crv":"Ed25519","x":"{}"}}"#,
            URL_SAFE_NO_PAD.encode(kp.public_key())
        );
        assert_eq!(&parse_public_key(&jwk).unwrap(), kp.public_key());
    }

    #[test]
    fn rejects_non_ed25519_jwk() {
        let jwk = r#"{"kty":"EC","crv":"P-256","x":"AAAA"}"#;
        assert!(matches!(parse_public_key(jwk), Err(SealError::Encoding(_))));
    }

    #[test]
    fn wrong_length_public_key() {
        assert!(matches!(
            parse_public_key(&STANDARD.encode([1u8; 31])),
            Err(SealError::InvalidKeyLength(31))
        ));
    }
}
