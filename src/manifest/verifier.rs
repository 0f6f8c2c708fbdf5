use serde::Serialize;
use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::Path,
};
use tracing::{info, warn};

use super::{manifest_digest, par_map, resolve_relative, walk_tree, Manifest, ManifestIdentity};
use crate::config::{SealConfig, SymlinkPolicy};
use crate::error::{Result, SealError};
use crate::hasher::{digest_file, ContentHasher, Sha256Hasher};

/// Outcome of checking a tree against a manifest.
///
/// Every category is sorted by path. `extra` is informational and never
/// makes a report fail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub matched: usize,
    pub mismatched: Vec<String>,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

impl VerificationReport {
    pub fn is_success(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty()
    }
}

enum Finding {
    Matched,
    Mismatched(String),
    Missing(String),
}

/// Rechecks a directory tree against a stored [`Manifest`].
pub struct ManifestVerifier<H: ContentHasher = Sha256Hasher> {
    hasher: H,
    identity: Option<ManifestIdentity>,
    symlink_policy: SymlinkPolicy,
    exclude: BTreeSet<String>,
    report_extra: bool,
    workers: usize,
}

impl ManifestVerifier<Sha256Hasher> {
    pub fn new(config: &SealConfig) -> Self {
        Self::with_hasher(Sha256Hasher, config)
    }
}

impl<H: ContentHasher> ManifestVerifier<H> {
    /// The verifier checks the manifest's identity fields against `config`
    /// unless [`Self::skip_identity_check`] is called.
    pub fn with_hasher(hasher: H, config: &SealConfig) -> Self {
        Self {
            hasher,
            identity: Some(ManifestIdentity::from(config)),
            symlink_policy: config.symlink_policy,
            exclude: config.exclude.iter().cloned().collect(),
            report_extra: true,
            workers: config.effective_workers(),
        }
    }

    #[must_use]
    pub fn skip_identity_check(mut self) -> Self {
        self.identity = None;
        self
    }

    /// Tree-relative file or directory never reported under `extra`.
    #[must_use]
    pub fn exclude(mut self, rel: impl Into<String>) -> Self {
        self.exclude.insert(rel.into());
        self
    }

    /// Skips the walk that finds untracked files.
    #[must_use]
    pub fn without_extra_scan(mut self) -> Self {
        self.report_extra = false;
        self
    }

    /// Checks `root` against `manifest`.
    ///
    /// Content findings (mismatched, missing, extra files) are collected into
    /// the report; the call only fails when the manifest itself cannot be
    /// trusted:
    ///
    /// - [`SealError::MissingRoot`] if `root` is not a directory.
    /// - [`SealError::IdentityMismatch`] if subject or workflow differ.
    /// - [`SealError::UnsafePath`] / [`SealError::MalformedManifest`] for
    ///   escaping or duplicate entries.
    /// - [`SealError::ManifestDigestMismatch`] if the stored digest does not
    ///   match the declared file list (hand-edited manifest).
    pub fn verify(&self, manifest: &Manifest, root: &Path) -> Result<VerificationReport> {
        if !root.is_dir() {
            return Err(SealError::MissingRoot {
                path: root.to_path_buf(),
            });
        }
        if let Some(expected) = &self.identity {
            check_identity(expected, &manifest.identity())?;
        }

        let mut seen = HashSet::with_capacity(manifest.files.len());
        for f in &manifest.files {
            resolve_relative(root, &f.path)?;
            if !seen.insert(f.path.as_str()) {
                return Err(SealError::MalformedManifest(format!(
                    "duplicate path {}",
                    f.path
                )));
            }
        }

        let recomputed = manifest_digest(&self.hasher, &manifest.files)?;
        if recomputed != manifest.manifest_digest {
            return Err(SealError::ManifestDigestMismatch {
                stored: manifest.manifest_digest.to_hex(),
                recomputed: recomputed.to_hex(),
            });
        }

        let findings = par_map(&manifest.files, self.workers, |f| {
            self.check_file(root, &f.path, &f.digest)
        });

        let mut report = VerificationReport::default();
        for finding in findings {
            match finding {
                Finding::Matched => report.matched += 1,
                Finding::Mismatched(p) => report.mismatched.push(p),
                Finding::Missing(p) => report.missing.push(p),
            }
        }

        if self.report_extra {
            let follow = self.symlink_policy == SymlinkPolicy::Follow;
            let walk = walk_tree(root, follow, &self.exclude);
            report.extra = walk
                .entries
                .into_iter()
                .map(|e| e.rel)
                .filter(|rel| !seen.contains(rel.as_str()))
                .chain(walk.unrecordable)
                .collect();
        }

        report.mismatched.sort();
        report.missing.sort();
        report.extra.sort();

        info!(
            matched = report.matched,
            mismatched = report.mismatched.len(),
            missing = report.missing.len(),
            extra = report.extra.len(),
            "manifest verified"
        );
        Ok(report)
    }

    fn check_file(&self, root: &Path, rel: &str, expected: &crate::hasher::Digest) -> Finding {
        let Ok(abs) = resolve_relative(root, rel) else {
            return Finding::Mismatched(rel.to_string());
        };
        let meta = match fs::symlink_metadata(&abs) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Finding::Missing(rel.to_string());
            }
            Err(e) => {
                warn!(path = %rel, error = %e, "cannot stat tracked file");
                return Finding::Mismatched(rel.to_string());
            }
        };
        if meta.file_type().is_symlink() && self.symlink_policy == SymlinkPolicy::Reject {
            warn!(path = %rel, "tracked path is a symlink");
            return Finding::Mismatched(rel.to_string());
        }
        match fs::metadata(&abs) {
            Ok(m) if m.is_file() => {}
            Ok(_) => return Finding::Mismatched(rel.to_string()),
            Err(_) => return Finding::Missing(rel.to_string()),
        }

        match digest_file(&self.hasher, &abs) {
            Ok((actual, _)) if actual == *expected => Finding::Matched,
            Ok((actual, _)) => {
                warn!(path = %rel, expected = %expected, actual = %actual, "hash mismatch");
                Finding::Mismatched(rel.to_string())
            }
            Err(err) => {
                warn!(path = %rel, error = %err, "cannot hash tracked file");
                Finding::Mismatched(rel.to_string())
            }
        }
    }
}

fn check_identity(expected: &ManifestIdentity, found: &ManifestIdentity) -> Result<()> {
    if expected.subject_id_sha256 != found.subject_id_sha256 {
        return Err(SealError::IdentityMismatch {
            field: "subjectIdSha256",
            expected: expected.subject_id_sha256.to_hex(),
            found: found.subject_id_sha256.to_hex(),
        });
    }
    if expected.workflow_ref != found.workflow_ref {
        return Err(SealError::IdentityMismatch {
            field: "workflowRef",
            expected: expected.workflow_ref.clone(),
            found: found.workflow_ref.clone(),
        });
    }
    if expected.workflow_version != found.workflow_version {
        return Err(SealError::IdentityMismatch {
            field: "workflowVersion",
            expected: expected.workflow_version.to_string(),
            found: found.workflow_version.to_string(),
        });
    }
    Ok(())
}
