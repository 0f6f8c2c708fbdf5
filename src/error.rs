//! Error types for artseal.
//!
//! Every failure the library can report is a [`SealError`]. Variants fall into
//! four exit classes (see [`SealError::exit_code`]) so the CLI can tell an I/O
//! problem apart from malformed input, a cryptographic failure, or a content
//! mismatch.
//!
//! Errors never carry key or seed bytes; length errors report only lengths.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for success.
pub const EXIT_OK: i32 = 0;
/// Exit code for I/O, configuration, missing root and empty manifest errors.
pub const EXIT_IO: i32 = 1;
/// Exit code for malformed input (lengths, encodings, unsafe paths).
pub const EXIT_MALFORMED: i32 = 2;
/// Exit code for cryptographic verification failure.
pub const EXIT_CRYPTO: i32 = 3;
/// Exit code for content or structural mismatches.
pub const EXIT_MISMATCH: i32 = 4;

/// Errors produced by artseal operations.
#[derive(Error, Debug)]
pub enum SealError {
    #[error("root directory does not exist: {}", path.display())]
    MissingRoot { path: PathBuf },

    #[error("no files recorded under {}; an empty manifest is never valid", root.display())]
    EmptyManifest { root: PathBuf },

    #[error("manifest digest mismatch: stored {stored}, recomputed {recomputed}")]
    ManifestDigestMismatch { stored: String, recomputed: String },

    #[error("manifest {field} mismatch: expected {expected}, found {found}")]
    IdentityMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },

    #[error("signing seed must be 32 bytes, got {0}")]
    InvalidSeedLength(usize),

    #[error("public key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("signature must be 64 bytes, got {0}")]
    InvalidSignatureLength(usize),

    #[error("structural claim mismatch: {0}")]
    StructuralMismatch(String),

    #[error("signed claim artifact_sha256 {signed} does not match header {header}")]
    SignedClaimMismatch { signed: String, header: String },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("refusing to follow symlink: {}", path.display())]
    SymlinkRejected { path: PathBuf },

    #[error("unsafe manifest path: {0}")]
    UnsafePath(String),

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("invalid encoding: {0}")]
    Encoding(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SealError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Maps the error to the CLI exit code for its class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingRoot { .. }
            | Self::EmptyManifest { .. }
            | Self::SymlinkRejected { .. }
            | Self::Config(_)
            | Self::Io { .. } => EXIT_IO,
            Self::InvalidSeedLength(_)
            | Self::InvalidKeyLength(_)
            | Self::InvalidSignatureLength(_)
            | Self::UnsafePath(_)
            | Self::MalformedManifest(_)
            | Self::Encoding(_)
            | Self::Json(_) => EXIT_MALFORMED,
            Self::InvalidSignature(_) => EXIT_CRYPTO,
            Self::ManifestDigestMismatch { .. }
            | Self::IdentityMismatch { .. }
            | Self::StructuralMismatch(_)
            | Self::SignedClaimMismatch { .. } => EXIT_MISMATCH,
        }
    }
}

/// Result alias for artseal operations.
pub type Result<T> = std::result::Result<T, SealError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_errors_report_lengths_only() {
        assert_eq!(
            SealError::InvalidSeedLength(31).to_string(),
            "signing seed must be 32 bytes, got 31"
        );
        assert_eq!(
            SealError::InvalidSignatureLength(63).to_string(),
            "signature must be 64 bytes, got 63"
        );
    }

    #[test]
    fn exit_codes_separate_crypto_from_structural() {
        assert_eq!(SealError::InvalidSignature("x".into()).exit_code(), EXIT_CRYPTO);
        assert_eq!(
            SealError::StructuralMismatch("x".into()).exit_code(),
            EXIT_MISMATCH
        );
        assert_eq!(SealError::InvalidKeyLength(3).exit_code(), EXIT_MALFORMED);
        assert_eq!(
            SealError::io("/x", std::io::Error::other("boom")).exit_code(),
            EXIT_IO
        );
    }

    #[test]
    fn seal_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SealError>();
    }
}
