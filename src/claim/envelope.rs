//! Signed claim envelopes.
//!
//! The claim verifier depends only on [`EnvelopeVerifier`]: give it the
//! compact envelope text, get back the verified payload bytes. The shipped
//! implementation, [`CompactJwsVerifier`], handles JWS compact serialization
//! with `alg: "EdDSA"` over Ed25519 (RFC 8037).
//!
//! Every failure to open an envelope, whether malformed text, an unexpected
//! algorithm or a bad signature, is reported as
//! [`SealError::InvalidSignature`]. Nothing is returned unless the
//! signature verified.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;

use crate::error::{Result, SealError};
use crate::signing::{verify_with_key, DetachedSignature, KeyPair, PUBLIC_KEY_LEN};

/// Opens a signed envelope and returns its verified payload.
pub trait EnvelopeVerifier: Send + Sync {
    /// Short name for logs (e.g. `"jws-eddsa"`).
    fn scheme(&self) -> &'static str;

    /// Verifies `envelope` and returns the payload bytes.
    ///
    /// # Errors
    ///
    /// [`SealError::InvalidSignature`] for any envelope that does not verify.
    fn open(&self, envelope: &str) -> Result<Vec<u8>>;
}

#[derive(Deserialize)]
struct ProtectedHeader {
    alg: String,
    #[serde(default)]
    crit: Option<Vec<String>>,
}

/// JWS compact (`header.payload.signature`) verifier for EdDSA/Ed25519.
pub struct CompactJwsVerifier {
    public_key: [u8; PUBLIC_KEY_LEN],
}

impl std::fmt::Debug for CompactJwsVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CompactJwsVerifier({})",
            URL_SAFE_NO_PAD.encode(self.public_key)
        )
    }
}

impl CompactJwsVerifier {
    pub fn new(public_key: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self { public_key }
    }
}

fn invalid(reason: impl Into<String>) -> SealError {
    SealError::InvalidSignature(reason.into())
}

impl EnvelopeVerifier for CompactJwsVerifier {
    fn scheme(&self) -> &'static str {
        "jws-eddsa"
    }

    fn open(&self, envelope: &str) -> Result<Vec<u8>> {
        let mut parts = envelope.trim().split('.');
        let (Some(h64), Some(p64), Some(s64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("envelope must have exactly three segments"));
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(h64)
            .map_err(|_| invalid("protected header is not base64url"))?;
        let header: ProtectedHeader = serde_json::from_slice(&header_bytes)
            .map_err(|_| invalid("protected header is not valid JSON"))?;
        if header.alg != "EdDSA" {
            return Err(invalid(format!("unsupported alg {:?}", header.alg)));
        }
        if header.crit.is_some_and(|c| !c.is_empty()) {
            return Err(invalid("critical header parameters are not supported"));
        }

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(s64)
            .map_err(|_| invalid("signature is not base64url"))?;
        let sig = DetachedSignature::from_bytes(&sig_bytes)
            .map_err(|_| invalid(format!("signature is {} bytes", sig_bytes.len())))?;

        let signing_input = format!("{h64}.{p64}");
        if !verify_with_key(&self.public_key, signing_input.as_bytes(), &sig) {
            return Err(invalid("signature does not verify"));
        }

        URL_SAFE_NO_PAD
            .decode(p64)
            .map_err(|_| invalid("payload is not base64url"))
    }
}

/// Produces a compact EdDSA JWS over `payload`.
pub fn seal_compact(keypair: &KeyPair, payload: &[u8]) -> String {
    let h64 = URL_SAFE_NO_PAD.encode(br#"{"alg":"EdDSA"}"#);
    let p64 = URL_SAFE_NO_PAD.encode(payload);
    let signing_input = format!("{h64}.{p64}");
    let sig = keypair.sign(signing_input.as_bytes());
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(sig.as_bytes()))
}
