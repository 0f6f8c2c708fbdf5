//! Content-addressed manifests of a deployed file tree.
//!
//! A [`Manifest`] lists every regular file under a root with its SHA-256,
//! size and modification time, sorted by path. The aggregate
//! `manifestDigest` covers only the `(path, sha256)` pairs, so two trees with
//! identical content produce identical digests regardless of timestamps or
//! the order the filesystem enumerated them in.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`builder`] | Walks a tree and produces a [`Manifest`] |
//! | [`verifier`] | Rechecks a tree against a stored [`Manifest`] |

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs,
    path::{Component, Path, PathBuf},
};
use time::OffsetDateTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, SealError};
use crate::hasher::{ContentHasher, Digest};

pub mod builder;
pub mod verifier;

pub use builder::ManifestBuilder;
pub use verifier::{ManifestVerifier, VerificationReport};

/// Largest manifest file the loader accepts (64 MB).
pub const MAX_MANIFEST_BYTES: u64 = 64 * 1024 * 1024;

/// One tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Tree-relative, `/`-separated.
    pub path: String,
    #[serde(rename = "sha256")]
    pub digest: Digest,
    pub size: u64,
    #[serde(
        rename = "modified_utc",
        with = "time::serde::rfc3339",
        default = "unix_epoch"
    )]
    pub modified: OffsetDateTime,
}

fn unix_epoch() -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub files_count: usize,
    pub total_size: u64,
}

/// Identity values a manifest is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestIdentity {
    pub subject_id_sha256: Digest,
    pub workflow_ref: String,
    pub workflow_version: u64,
}

impl From<&crate::config::SealConfig> for ManifestIdentity {
    fn from(config: &crate::config::SealConfig) -> Self {
        Self {
            subject_id_sha256: config.subject_id_sha256,
            workflow_ref: config.workflow_ref.clone(),
            workflow_version: config.workflow_version,
        }
    }
}

/// Persisted manifest. Older files using snake_case top-level keys load too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "subjectIdSha256", alias = "subject_id_sha256")]
    pub subject_id_sha256: Digest,
    #[serde(rename = "workflowRef", alias = "workflow_ref")]
    pub workflow_ref: String,
    #[serde(rename = "workflowVersion", alias = "workflow_version")]
    pub workflow_version: u64,
    #[serde(rename = "manifestDigest", alias = "manifest_sha256")]
    pub manifest_digest: Digest,
    #[serde(
        rename = "generatedAt",
        alias = "generated_utc",
        with = "time::serde::rfc3339"
    )]
    pub generated_at: OffsetDateTime,
    pub build: BuildStats,
    pub files: Vec<FileRecord>,
}

impl Manifest {
    pub fn file_count(&self) -> usize {
        self.build.files_count
    }

    pub fn total_size(&self) -> u64 {
        self.build.total_size
    }

    pub fn identity(&self) -> ManifestIdentity {
        ManifestIdentity {
            subject_id_sha256: self.subject_id_sha256,
            workflow_ref: self.workflow_ref.clone(),
            workflow_version: self.workflow_version,
        }
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json_slice(&crate::fs_guard::read_validated(path, MAX_MANIFEST_BYTES)?)
    }

    pub fn to_json_pretty(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SealError::io(parent, e))?;
        }
        fs::write(path, self.to_json_pretty()?).map_err(|e| SealError::io(path, e))
    }
}

#[derive(Serialize)]
struct CanonicalEntry<'a> {
    path: &'a str,
    sha256: &'a Digest,
}

/// Compact JSON of the `{path, sha256}` pairs, in the order given.
pub fn canonical_listing(files: &[FileRecord]) -> Result<Vec<u8>> {
    let entries: Vec<CanonicalEntry<'_>> = files
        .iter()
        .map(|f| CanonicalEntry {
            path: &f.path,
            sha256: &f.digest,
        })
        .collect();
    Ok(serde_json::to_vec(&entries)?)
}

/// Aggregate digest over [`canonical_listing`].
pub fn manifest_digest(hasher: &dyn ContentHasher, files: &[FileRecord]) -> Result<Digest> {
    Ok(hasher.digest(&canonical_listing(files)?))
}

/// Resolves a manifest path under `root`, rejecting anything that could escape it.
pub fn resolve_relative(root: &Path, rel: &str) -> Result<PathBuf> {
    if rel.is_empty() || rel.starts_with('/') || rel.contains('\\') {
        return Err(SealError::UnsafePath(rel.to_string()));
    }
    let mut out = root.to_path_buf();
    for part in rel.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return Err(SealError::UnsafePath(rel.to_string()));
        }
        out.push(part);
    }
    Ok(out)
}

/// Tree-relative form of `path` when it lies under `root`.
///
/// `path` itself need not exist yet, but its parent directory must.
pub fn path_within(root: &Path, path: &Path) -> Option<String> {
    let root = root.canonicalize().ok()?;
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let abs = parent.canonicalize().ok()?.join(path.file_name()?);
    relative_posix(&root, &abs)
}

/// A regular file found while walking a tree.
#[derive(Debug, Clone)]
pub(crate) struct TreeEntry {
    pub abs: PathBuf,
    pub rel: String,
    pub via_symlink: bool,
}

/// Result of [`walk_tree`].
#[derive(Debug, Default)]
pub(crate) struct TreeWalk {
    /// Files a manifest can record, sorted by `rel`.
    pub entries: Vec<TreeEntry>,
    /// Files whose names a manifest cannot carry (non-UTF-8, or rejected by
    /// [`resolve_relative`]), in lossy display form, sorted.
    pub unrecordable: Vec<String>,
}

/// True when `rel` is an excluded path or lies under an excluded directory.
pub(crate) fn is_excluded(rel: &str, exclude: &BTreeSet<String>) -> bool {
    exclude.iter().any(|ex| {
        let ex = ex.trim_end_matches('/');
        !ex.is_empty()
            && (rel == ex || rel.strip_prefix(ex).is_some_and(|rest| rest.starts_with('/')))
    })
}

/// Walks `root`, collecting files (and, when not following links, symlinks).
///
/// Excluded directories are pruned without being descended into. Names that
/// could not round-trip through [`resolve_relative`] are kept apart in
/// [`TreeWalk::unrecordable`] so the builder never writes a path its own
/// verifier refuses. Unreadable entries are logged and skipped.
pub(crate) fn walk_tree(root: &Path, follow_links: bool, exclude: &BTreeSet<String>) -> TreeWalk {
    let mut walk = TreeWalk::default();
    let walker = WalkDir::new(root)
        .follow_links(follow_links)
        .into_iter()
        .filter_entry(|e| match relative_posix(root, e.path()) {
            Some(rel) if is_excluded(&rel, exclude) => {
                debug!(path = %rel, "excluded");
                false
            }
            _ => true,
        });

    for item in walker {
        let e = match item {
            Ok(e) => e,
            Err(err) => {
                warn!(path = ?err.path(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let is_link = e.file_type().is_symlink();
        if !e.file_type().is_file() && !is_link {
            continue;
        }
        match relative_posix(root, e.path()) {
            Some(rel) if resolve_relative(root, &rel).is_ok() => walk.entries.push(TreeEntry {
                abs: e.path().to_path_buf(),
                rel,
                via_symlink: is_link || e.path_is_symlink(),
            }),
            _ => {
                let shown = lossy_relative(root, e.path());
                warn!(path = %shown, "file name cannot be recorded in a manifest");
                walk.unrecordable.push(shown);
            }
        }
    }
    walk.entries.sort_by(|a, b| a.rel.cmp(&b.rel));
    walk.unrecordable.sort();
    walk
}

fn lossy_relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// `path` relative to `root`, joined with `/`. `None` for non-UTF-8 names.
pub(crate) fn relative_posix(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for c in rel.components() {
        match c {
            Component::Normal(s) => parts.push(s.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Maps `f` over `items` on up to `workers` scoped threads, preserving order.
pub(crate) fn par_map<T, R, F>(items: &[T], workers: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = workers.clamp(1, items.len().max(1));
    if workers == 1 {
        return items.iter().map(&f).collect();
    }
    let chunk = items.len().div_ceil(workers);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = items
            .chunks(chunk)
            .map(|part| s.spawn(move || part.iter().map(f).collect::<Vec<R>>()))
            .collect();
        handles
            .into_iter()
            .flat_map(|h| match h.join() {
                Ok(v) => v,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}
