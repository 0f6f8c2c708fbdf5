//! Approval-claim verification.
//!
//! A claim request carries a `header` and a `token` that must agree with each
//! other and with the configured subject, license and approval-token pattern
//! (the *structural* check), plus an optional signed envelope whose payload
//! must name the same artifact digest.
//!
//! The structural check gates everything: if it fails the envelope is never
//! opened. A request that passes without an envelope is reported as
//! [`ClaimStatus::StructuralOnly`], which callers must not treat as
//! cryptographically verified.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::SealConfig;
use crate::error::{Result, SealError};
use crate::hasher::Digest;

pub mod envelope;

pub use envelope::{CompactJwsVerifier, EnvelopeVerifier};

/// Largest claim request the CLI reads (1 MB).
pub const MAX_REQUEST_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub license: String,
    #[serde(alias = "subjectIdSha256")]
    pub subject_id_sha256: Digest,
    #[serde(alias = "artifactSha256")]
    pub artifact_sha256: Digest,
    #[serde(alias = "approvalToken")]
    pub approval_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(alias = "subjectIdSha256")]
    pub subject_id_sha256: Digest,
    #[serde(alias = "artifactSha256")]
    pub artifact_sha256: Digest,
    /// Claims the verifier does not interpret.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub header: Header,
    pub token: Token,
    /// Compact signed envelope.
    #[serde(default, alias = "signedEnvelope", skip_serializing_if = "Option::is_none")]
    pub jws: Option<String>,
}

impl ClaimRequest {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The signed envelope, if present. Blank strings count as absent.
    pub fn envelope(&self) -> Option<&str> {
        self.jws.as_deref().filter(|j| !j.trim().is_empty())
    }
}

/// How far verification got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    /// Header and token agree; no envelope was checked.
    StructuralOnly,
    /// Structural check passed and the signed envelope verified.
    CryptographicallyVerified,
}

/// Wire response: `{ ok, verified, error? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub ok: bool,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ClaimResponse {
    pub fn from_outcome(outcome: &Result<ClaimStatus>) -> Self {
        match outcome {
            Ok(status) => Self {
                ok: true,
                verified: *status == ClaimStatus::CryptographicallyVerified,
                error: None,
                detail: None,
            },
            Err(err) => Self {
                ok: false,
                verified: false,
                error: Some(error_kind(err).to_string()),
                detail: Some(err.to_string()),
            },
        }
    }
}

/// Stable machine-readable name for a claim failure.
pub fn error_kind(err: &SealError) -> &'static str {
    match err {
        SealError::StructuralMismatch(_) => "structural_mismatch",
        SealError::SignedClaimMismatch { .. } => "signed_claim_mismatch",
        SealError::InvalidSignature(_) => "invalid_signature",
        _ => "malformed_request",
    }
}

/// Checks claim requests against a configured subject and license.
pub struct ClaimVerifier {
    subject_id_sha256: Digest,
    license: String,
    approval_token: Regex,
    envelope: Option<Box<dyn EnvelopeVerifier>>,
}

impl std::fmt::Debug for ClaimVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimVerifier")
            .field("subject_id_sha256", &self.subject_id_sha256)
            .field("license", &self.license)
            .field("approval_token", &self.approval_token.as_str())
            .field("envelope", &self.envelope.as_ref().map(|e| e.scheme()))
            .finish()
    }
}

impl ClaimVerifier {
    /// # Errors
    ///
    /// [`SealError::Config`] if the approval-token pattern does not compile.
    pub fn new(config: &SealConfig) -> Result<Self> {
        Ok(Self {
            subject_id_sha256: config.subject_id_sha256,
            license: config.license.clone(),
            approval_token: config.approval_token_regex()?,
            envelope: None,
        })
    }

    #[must_use]
    pub fn with_envelope_verifier(mut self, verifier: impl EnvelopeVerifier + 'static) -> Self {
        self.envelope = Some(Box::new(verifier));
        self
    }

    /// First structural rule `header`/`token` break, if any.
    pub fn structural_violation(&self, header: &Header, token: &Token) -> Option<&'static str> {
        if header.license != self.license {
            return Some("license is not accepted");
        }
        if header.subject_id_sha256 != self.subject_id_sha256 {
            return Some("header subject does not match");
        }
        if token.subject_id_sha256 != self.subject_id_sha256 {
            return Some("token subject does not match");
        }
        if header.artifact_sha256 != token.artifact_sha256 {
            return Some("header and token artifact digests differ");
        }
        if !self.approval_token.is_match(&header.approval_token) {
            return Some("approval token does not match the required pattern");
        }
        None
    }

    /// Field-equality check only; no cryptography.
    pub fn verify_structural(&self, header: &Header, token: &Token) -> bool {
        self.structural_violation(header, token).is_none()
    }

    /// Opens `envelope` with `verifier` and checks its `artifact_sha256`
    /// against the header.
    ///
    /// # Errors
    ///
    /// - [`SealError::InvalidSignature`] if the envelope does not verify or
    ///   its payload is not a JSON object.
    /// - [`SealError::SignedClaimMismatch`] if the signed digest differs.
    pub fn verify_signed(
        &self,
        header: &Header,
        envelope: &str,
        verifier: &dyn EnvelopeVerifier,
    ) -> Result<()> {
        let payload = verifier.open(envelope)?;
        let claims: Map<String, Value> = serde_json::from_slice(&payload)
            .map_err(|_| SealError::InvalidSignature("payload is not a JSON object".into()))?;

        let signed = claims.get("artifact_sha256").and_then(Value::as_str);
        match signed.map(str::parse::<Digest>) {
            Some(Ok(d)) if d == header.artifact_sha256 => Ok(()),
            _ => Err(SealError::SignedClaimMismatch {
                signed: signed.unwrap_or("<absent>").to_string(),
                header: header.artifact_sha256.to_hex(),
            }),
        }
    }

    /// Structural gate, then the envelope if the request carries one.
    ///
    /// An envelope with no configured [`EnvelopeVerifier`] fails closed.
    pub fn verify(&self, request: &ClaimRequest) -> Result<ClaimStatus> {
        if let Some(reason) = self.structural_violation(&request.header, &request.token) {
            info!(reason, "claim failed structural check");
            return Err(SealError::StructuralMismatch(reason.to_string()));
        }
        let Some(jws) = request.envelope() else {
            return Ok(ClaimStatus::StructuralOnly);
        };
        let Some(verifier) = self.envelope.as_deref() else {
            return Err(SealError::InvalidSignature(
                "request carries a signed envelope but no verification key is configured".into(),
            ));
        };
        self.verify_signed(&request.header, jws, verifier)?;
        info!(scheme = verifier.scheme(), "claim cryptographically verified");
        Ok(ClaimStatus::CryptographicallyVerified)
    }

    /// Runs [`Self::verify`] and renders the wire response.
    pub fn respond(&self, request: &ClaimRequest) -> ClaimResponse {
        ClaimResponse::from_outcome(&self.verify(request))
    }
}
