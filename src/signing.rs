//! Detached Ed25519 signatures over literal byte streams.
//!
//! Signing takes a 32-byte seed; verification takes a 32-byte public key.
//! Both operate on exactly the bytes they are given. Nothing here re-encodes
//! or canonicalizes its input, so callers must sign and verify the same file
//! bytes.
//!
//! ## Security
//!
//! Verification uses `verify_strict()`, which rejects weak public keys and
//! non-canonical signatures. A mismatch is reported as `Ok(false)`; only
//! malformed lengths are errors.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{Result, SealError};

pub const SEED_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SECRET_KEY_LEN: usize = 64;
pub const SIGNATURE_LEN: usize = 64;

/// Ed25519 key pair derived from a seed.
///
/// The seed and expanded secret are zeroed on drop and never printed.
pub struct KeyPair {
    seed: Zeroizing<[u8; SEED_LEN]>,
    public_key: [u8; PUBLIC_KEY_LEN],
    secret_key: Zeroizing<[u8; SECRET_KEY_LEN]>,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "KeyPair {{ public_key: {}, seed: [REDACTED] }}",
            hex::encode(self.public_key)
        )
    }
}

impl KeyPair {
    /// # Errors
    ///
    /// [`SealError::InvalidSeedLength`] unless `seed` is exactly 32 bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let seed: [u8; SEED_LEN] = seed
            .try_into()
            .map_err(|_| SealError::InvalidSeedLength(seed.len()))?;
        let sk = SigningKey::from_bytes(&seed);
        Ok(Self {
            seed: Zeroizing::new(seed),
            public_key: sk.verifying_key().to_bytes(),
            secret_key: Zeroizing::new(sk.to_keypair_bytes()),
        })
    }

    pub fn seed(&self) -> &[u8; SEED_LEN] {
        &self.seed
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_key
    }

    /// `seed || public_key`, the 64-byte form NaCl calls the secret key.
    pub fn secret_key(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.secret_key
    }

    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.public_key)
    }

    pub fn sign(&self, message: &[u8]) -> DetachedSignature {
        let sk = SigningKey::from_bytes(&self.seed);
        DetachedSignature(sk.sign(message).to_bytes())
    }
}

/// A 64-byte detached signature, transported as base64 text.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DetachedSignature([u8; SIGNATURE_LEN]);

impl std::fmt::Debug for DetachedSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DetachedSignature({})", self.to_base64())
    }
}

impl DetachedSignature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| SealError::InvalidSignatureLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Decodes signature-file text. Surrounding whitespace is ignored.
    pub fn from_base64(text: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| SealError::Encoding(format!("signature is not base64: {e}")))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

/// Signs `message` with the key derived from `seed`.
///
/// Deterministic: the same `(seed, message)` always yields the same signature.
pub fn sign(seed: &[u8], message: &[u8]) -> Result<DetachedSignature> {
    Ok(KeyPair::from_seed(seed)?.sign(message))
}

/// Checks a detached signature.
///
/// Returns `Ok(false)` for any signature that does not verify, including a
/// public key of the right length that is not a valid curve point.
///
/// # Errors
///
/// [`SealError::InvalidKeyLength`] / [`SealError::InvalidSignatureLength`]
/// for inputs of the wrong size.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    let pk: &[u8; PUBLIC_KEY_LEN] = public_key
        .try_into()
        .map_err(|_| SealError::InvalidKeyLength(public_key.len()))?;
    let sig = DetachedSignature::from_bytes(signature)?;
    Ok(verify_with_key(pk, message, &sig))
}

pub(crate) fn verify_with_key(
    public_key: &[u8; PUBLIC_KEY_LEN],
    message: &[u8],
    signature: &DetachedSignature,
) -> bool {
    let Ok(vk) = VerifyingKey::from_bytes(public_key) else {
        debug!("public key is not a valid Ed25519 point");
        return false;
    };
    let sig = Signature::from_bytes(&signature.0);
    vk.verify_strict(message, &sig).is_ok()
}
