use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SealError};
use crate::hasher::Digest;

/// Maximum config file size (1 MB).
const MAX_CONFIG_BYTES: u64 = 1024 * 1024;

/// Subject fingerprint the deployment is bound to.
pub const DEFAULT_SUBJECT_ID_SHA256: &str =
    "2948fbc4ba1c0d7341204908882b89134a999f3e8f77f4a6a00ce6b68770282a";
pub const DEFAULT_WORKFLOW_REF: &str = "wf_68f362ed3e3881909a1fc894b213808902f495b1a750c22e";
pub const DEFAULT_WORKFLOW_VERSION: u64 = 5;
pub const DEFAULT_LICENSE: &str = "ECCL-1.0";
pub const DEFAULT_APPROVAL_TOKEN_PATTERN: &str = "^sig:CFBK::";

/// What the manifest builder does when it meets a symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkPolicy {
    /// Follow the link and record the target's content under the link's path.
    #[default]
    Follow,
    /// Fail the build.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    pub subject_id_sha256: Digest,
    pub workflow_ref: String,
    pub workflow_version: u64,
    pub license: String,
    pub approval_token_pattern: String,
    pub symlink_policy: SymlinkPolicy,
    /// Tree-relative files or directories never recorded in, or reported as
    /// extra against, a manifest. A directory entry prunes everything under it.
    pub exclude: Vec<String>,
    /// Hashing threads; 0 picks from available parallelism.
    pub workers: usize,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            subject_id_sha256: Digest::from_bytes(default_subject_bytes()),
            workflow_ref: DEFAULT_WORKFLOW_REF.to_string(),
            workflow_version: DEFAULT_WORKFLOW_VERSION,
            license: DEFAULT_LICENSE.to_string(),
            approval_token_pattern: DEFAULT_APPROVAL_TOKEN_PATTERN.to_string(),
            symlink_policy: SymlinkPolicy::Follow,
            exclude: Vec::new(),
            workers: 0,
        }
    }
}

fn default_subject_bytes() -> [u8; 32] {
    let mut out = [0u8; 32];
    // The constant is 64 valid hex chars; the unit tests pin it.
    if hex::decode_to_slice(DEFAULT_SUBJECT_ID_SHA256, &mut out).is_err() {
        out = [0u8; 32];
    }
    out
}

impl SealConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = match path {
            Some(p) => serde_json::from_slice(&crate::fs_guard::read_validated(
                p,
                MAX_CONFIG_BYTES,
            )?)
            .map_err(|e| SealError::Config(format!("{}: {e}", p.display())))?,
            None => Self::default(),
        };
        config.approval_token_regex()?;
        Ok(config)
    }

    /// Compiles `approval_token_pattern`.
    pub fn approval_token_regex(&self) -> Result<Regex> {
        Regex::new(&self.approval_token_pattern).map_err(|e| {
            SealError::Config(format!(
                "invalid approval_token_pattern {:?}: {e}",
                self.approval_token_pattern
            ))
        })
    }

    /// Worker count with `0` resolved against the host.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
    }
}
