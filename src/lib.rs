//! # artseal -- artifact integrity and authenticity
//!
//! artseal protects a deployed file tree and the artifacts inside it at
//! several independent checkpoints:
//!
//! - a deterministic, content-addressed **manifest** of the tree, with a
//!   single aggregate digest over the sorted `(path, sha256)` listing;
//! - **detached Ed25519 signatures** over the literal bytes of an artifact,
//!   derived from a caller-supplied 32-byte seed;
//! - **approval claims**: a header/token pair bound to a configured subject
//!   and artifact digest, optionally backed by a signed envelope.
//!
//! ## Security Properties
//!
//! - **`unsafe_code = "forbid"`** crate-wide.
//! - **No secret persistence**: seeds are read once, held in `Zeroizing`
//!   buffers, and never logged or written.
//! - **Never fails open**: a verifier that cannot complete reports failure.
//!   Structural-only claim success is reported separately from
//!   cryptographic verification.
//! - **Bounded inputs**: manifests, configs, keys and requests are read via
//!   [`fs_guard::read_validated`] (symlink refusal + size limit).
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`hasher`] | `Digest` type and the `ContentHasher` interface (SHA-256) |
//! | [`manifest`] | Manifest model, builder and verifier |
//! | [`signing`] | Detached Ed25519 sign/verify |
//! | [`keys`] | Seed and public-key loading (env, file, JWK) |
//! | [`claim`] | Structural + signed-envelope claim verification |
//! | [`config`] | Injected identity values and build policy |
//! | [`fs_guard`] | Symlink-safe, size-bounded file reads |
//! | [`error`] | `SealError` and exit-code classes |

/// Symlink-safe, size-bounded reads for every small input file.
pub mod fs_guard;

/// Error taxonomy and the exit code each error class maps to.
pub mod error;

/// Configuration: subject identity, workflow binding, license, approval-token
/// pattern, symlink policy and exclusions.
pub mod config;

/// Content digests. The only hashing interface in the crate.
pub mod hasher;

/// Deterministic manifests of a directory tree and their verification.
pub mod manifest;

/// Detached Ed25519 signatures over exact byte streams.
pub mod signing;

/// Loading seeds and public keys from environment variables or files.
pub mod keys;

/// Approval-claim verification with an optional signed envelope.
pub mod claim;

pub use config::SealConfig;
pub use error::{Result, SealError};
pub use hasher::{ContentHasher, Digest, Sha256Hasher};
pub use manifest::{Manifest, ManifestBuilder, ManifestVerifier, VerificationReport};
