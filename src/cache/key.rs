//! Cache key derivation.

use super::CacheError;
use crate::imaging::policy::extension_of;
use crate::options::EffectiveOptions;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Version of the key derivation. Bump this to orphan every existing entry
/// when the hashed inputs change shape.
const KEY_VERSION: u32 = 1;

/// What the cache knows about a source file.
///
/// Stat'd immediately before key derivation. A file edited in place gets a
/// new mtime (and usually a new size) and therefore a new key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentity {
    pub path: PathBuf,
    /// Modification time in milliseconds since the Unix epoch.
    pub modified_ms: u64,
    pub size: u64,
}

impl SourceIdentity {
    /// Stat `path`. Anything but a regular file is an error.
    ///
    /// The stored path is canonical, so every spelling of one file
    /// (relative, `.` or `..` components, symlinks) has one identity.
    pub fn stat(path: &Path) -> io::Result<Self> {
        let path = fs::canonicalize(path)?;
        let meta = fs::metadata(&path)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        // Pre-epoch mtimes collapse to 0; they still hash consistently
        let modified_ms = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(Self {
            path,
            modified_ms,
            size: meta.len(),
        })
    }
}

/// Identifier of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hex: String,
    extension: String,
}

impl CacheKey {
    /// 64-character lower-case SHA-256 hex digest.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Lower-case extension of the source, preserved on the entry.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Shard directory name: the first two hex characters.
    pub fn shard(&self) -> &str {
        &self.hex[..2]
    }

    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.hex.clone()
        } else {
            format!("{}.{}", self.hex, self.extension)
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Derive the key for `source` under `options`.
///
/// Deterministic across calls and processes: equal inputs give equal keys,
/// and a change to any option field, the path, the mtime, or the size gives
/// a different one.
pub fn derive_key(
    source: &SourceIdentity,
    options: &EffectiveOptions,
) -> Result<CacheKey, CacheError> {
    let canonical = options.canonical()?;

    let mut hasher = Sha256::new();
    hasher.update(b"thumbcache\0");
    hasher.update(KEY_VERSION.to_le_bytes());
    hasher.update(source.path.as_os_str().as_encoded_bytes());
    hasher.update(b"\0");
    hasher.update(source.modified_ms.to_le_bytes());
    hasher.update(source.size.to_le_bytes());
    hasher.update(canonical.as_bytes());

    Ok(CacheKey {
        hex: format!("{:x}", hasher.finalize()),
        extension: extension_of(&source.path).unwrap_or_default(),
    })
}
