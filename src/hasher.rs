//! Content digests.
//!
//! [`ContentHasher`] is the single hashing interface the rest of the crate
//! depends on. [`Sha256Hasher`] is the implementation everything ships with;
//! callers can substitute their own for fixtures.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::{fmt, fs, io::Read, path::Path, str::FromStr};

use crate::error::{Result, SealError};

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// A 32-byte content digest, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = SealError;

    /// Parses 64 hex characters. Uppercase input is accepted and normalized.
    fn from_str(s: &str) -> Result<Self> {
        let mut out = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut out).map_err(|e| {
            SealError::Encoding(format!("digest must be {} hex chars: {e}", DIGEST_LEN * 2))
        })?;
        Ok(Self(out))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Computes content digests.
///
/// Implementations must be deterministic: identical byte streams always
/// produce identical digests on every platform.
pub trait ContentHasher: Send + Sync {
    /// Digest of an in-memory byte sequence.
    fn digest(&self, bytes: &[u8]) -> Digest;

    /// Digest of everything readable from `reader`.
    fn digest_reader(&self, reader: &mut dyn Read) -> std::io::Result<Digest>;
}

/// SHA-256 via the `sha2` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn digest(&self, bytes: &[u8]) -> Digest {
        Digest(Sha256::digest(bytes).into())
    }

    fn digest_reader(&self, reader: &mut dyn Read) -> std::io::Result<Digest> {
        let mut h = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            h.update(&buf[..n]);
        }
        Ok(Digest(h.finalize().into()))
    }
}

/// Streams a file through `hasher`, returning its digest and byte count.
pub fn digest_file(hasher: &dyn ContentHasher, path: &Path) -> Result<(Digest, u64)> {
    let mut f = fs::File::open(path).map_err(|e| SealError::io(path, e))?;
    let mut counted = CountingReader {
        inner: &mut f,
        count: 0,
    };
    let digest = hasher
        .digest_reader(&mut counted)
        .map_err(|e| SealError::io(path, e))?;
    Ok((digest, counted.count))
}

struct CountingReader<'a> {
    inner: &'a mut dyn Read,
    count: u64,
}

impl Read for CountingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}
