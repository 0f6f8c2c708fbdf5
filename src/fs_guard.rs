use crate::error::{Result, SealError};
use std::{fs, path::Path};

/// Reads a file after verifying it is not a symlink and is within `max_bytes`.
///
/// Used for every small input the CLI consumes: manifests, configuration,
/// signature files, key files and claim requests. Tree content hashed by the
/// manifest builder goes through [`crate::hasher`] instead.
///
/// NOTE: narrow TOCTOU window between `symlink_metadata()` and `fs::read()`.
pub fn read_validated(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let meta = fs::symlink_metadata(path).map_err(|e| SealError::io(path, e))?;
    if meta.file_type().is_symlink() {
        return Err(SealError::SymlinkRejected {
            path: path.to_path_buf(),
        });
    }
    if meta.len() > max_bytes {
        return Err(SealError::io(
            path,
            std::io::Error::other(format!(
                "file too large ({} bytes, max {max_bytes} bytes)",
                meta.len()
            )),
        ));
    }
    fs::read(path).map_err(|e| SealError::io(path, e))
}

/// Like [`read_validated`], decoded as UTF-8.
pub fn read_validated_string(path: &Path, max_bytes: u64) -> Result<String> {
    let bytes = read_validated(path, max_bytes)?;
    String::from_utf8(bytes)
        .map_err(|_| SealError::Encoding(format!("{} is not valid UTF-8", path.display())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_small_file() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("sig.b64");
        fs::write(&p, b"abc").unwrap();
        assert_eq!(read_validated(&p, 16).unwrap(), b"abc");
    }

    #[test]
    fn rejects_oversized_file() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("big");
        fs::write(&p, vec![0u8; 32]).unwrap();
        let err = read_validated(&p, 8).unwrap_err();
        assert!(err.to_string().contains("too large"), "{err}");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_validated(Path::new("/nonexistent/artseal/x"), 8).unwrap_err();
        assert!(matches!(err, SealError::Io { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        fs::write(&real, b"x").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert!(matches!(
            read_validated(&link, 8),
            Err(SealError::SymlinkRejected { .. })
        ));
    }

    #[test]
    fn rejects_non_utf8_text() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("bin");
        fs::write(&p, [0xff, 0xfe]).unwrap();
        assert!(matches!(
            read_validated_string(&p, 8),
            Err(SealError::Encoding(_))
        ));
    }
}
