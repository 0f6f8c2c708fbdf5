use std::{collections::BTreeSet, fs, path::Path};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::{par_map, walk_tree, BuildStats, FileRecord, Manifest, ManifestIdentity, TreeEntry};
use crate::config::{SealConfig, SymlinkPolicy};
use crate::error::{Result, SealError};
use crate::hasher::{digest_file, ContentHasher, Sha256Hasher};

/// Builds a [`Manifest`] from a directory tree.
pub struct ManifestBuilder<H: ContentHasher = Sha256Hasher> {
    hasher: H,
    identity: ManifestIdentity,
    symlink_policy: SymlinkPolicy,
    exclude: BTreeSet<String>,
    workers: usize,
}

impl ManifestBuilder<Sha256Hasher> {
    pub fn new(config: &SealConfig) -> Self {
        Self::with_hasher(Sha256Hasher, config)
    }
}

impl<H: ContentHasher> ManifestBuilder<H> {
    pub fn with_hasher(hasher: H, config: &SealConfig) -> Self {
        Self {
            hasher,
            identity: ManifestIdentity::from(config),
            symlink_policy: config.symlink_policy,
            exclude: config.exclude.iter().cloned().collect(),
            workers: config.effective_workers(),
        }
    }

    /// Adds a tree-relative file or directory that will never be recorded.
    #[must_use]
    pub fn exclude(mut self, rel: impl Into<String>) -> Self {
        self.exclude.insert(rel.into());
        self
    }

    /// Walks `root` and returns the sorted, digested manifest.
    ///
    /// # Errors
    ///
    /// - [`SealError::MissingRoot`] if `root` is not an existing directory.
    /// - [`SealError::SymlinkRejected`] under [`SymlinkPolicy::Reject`].
    /// - [`SealError::EmptyManifest`] if no file could be recorded.
    ///
    /// Files that cannot be read are skipped with a warning.
    pub fn build(&self, root: &Path) -> Result<Manifest> {
        if !root.is_dir() {
            return Err(SealError::MissingRoot {
                path: root.to_path_buf(),
            });
        }

        let follow = self.symlink_policy == SymlinkPolicy::Follow;
        let entries = walk_tree(root, follow, &self.exclude).entries;
        if !follow {
            if let Some(link) = entries.iter().find(|e| e.via_symlink) {
                return Err(SealError::SymlinkRejected {
                    path: link.abs.clone(),
                });
            }
        }
        debug!(root = %root.display(), candidates = entries.len(), "hashing tree");

        let mut files: Vec<FileRecord> = par_map(&entries, self.workers, |e| self.record(e))
            .into_iter()
            .flatten()
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        if files.is_empty() {
            return Err(SealError::EmptyManifest {
                root: root.to_path_buf(),
            });
        }

        let total_size = files.iter().map(|f| f.size).fold(0u64, u64::saturating_add);
        let manifest_digest = super::manifest_digest(&self.hasher, &files)?;
        info!(
            files = files.len(),
            total_size,
            manifest_digest = %manifest_digest,
            "manifest built"
        );

        Ok(Manifest {
            subject_id_sha256: self.identity.subject_id_sha256,
            workflow_ref: self.identity.workflow_ref.clone(),
            workflow_version: self.identity.workflow_version,
            manifest_digest,
            generated_at: OffsetDateTime::now_utc(),
            build: BuildStats {
                files_count: files.len(),
                total_size,
            },
            files,
        })
    }

    fn record(&self, entry: &TreeEntry) -> Option<FileRecord> {
        if entry.via_symlink {
            debug!(path = %entry.rel, "following symlink");
        }
        let (digest, size) = match digest_file(&self.hasher, &entry.abs) {
            Ok(v) => v,
            Err(err) => {
                warn!(path = %entry.rel, error = %err, "skipping unreadable file");
                return None;
            }
        };
        Some(FileRecord {
            path: entry.rel.clone(),
            digest,
            size,
            modified: modified_time(&entry.abs),
        })
    }
}

/// Best-effort mtime; the UNIX epoch when the platform cannot say.
fn modified_time(path: &Path) -> OffsetDateTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(OffsetDateTime::from)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
