//! Sharded on-disk entry store with atomic writes and age-based sweep.

use super::{CacheError, CacheKey};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Prefix of in-progress temp files inside a shard.
const TEMP_PREFIX: &str = ".partial-";

/// Temp files younger than this may still be in the middle of a write.
const TEMP_GRACE: Duration = Duration::from_secs(60 * 60);

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Outcome of one [`CacheStore::sweep`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: u32,
    pub pruned_dirs: u32,
    pub failed: u32,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} removed, {} empty dirs pruned",
            self.deleted, self.pruned_dirs
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

/// Size of the cache on disk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub bytes: u64,
    /// Generations running right now. Only a coordinator knows this; the
    /// store alone always reports 0.
    pub in_flight: usize,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} entries, {}", self.entries, human_bytes(self.bytes))?;
        if self.in_flight > 0 {
            write!(f, ", {} in flight", self.in_flight)?;
        }
        Ok(())
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// The cache directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// A store rooted at `root`. Nothing is created until the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of `key`, whether or not it exists.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.shard()).join(key.file_name())
    }

    /// Path of the entry for `key` if it is on disk.
    pub fn lookup(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.entry_path(key);
        path.is_file().then_some(path)
    }

    /// Atomically write `bytes` as the entry for `key`.
    ///
    /// A concurrent sweep can remove the shard between creating it and
    /// writing into it; that case is retried once.
    pub fn store(&self, key: &CacheKey, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let result = match self.write_entry(key, bytes) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(key = %key, "shard vanished during write, retrying");
                self.write_entry(key, bytes)
            }
            other => other,
        };
        result.map_err(|source| CacheError::WriteFailed {
            path: self.entry_path(key),
            source,
        })
    }

    fn write_entry(&self, key: &CacheKey, bytes: &[u8]) -> io::Result<PathBuf> {
        let shard = self.root.join(key.shard());
        fs::create_dir_all(&shard)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&shard)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;

        let path = shard.join(key.file_name());
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(path)
    }

    /// Count entries and their total size. In-progress temp files are not
    /// entries. A missing root is an empty cache.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        if !self.root.exists() {
            return Ok(CacheStats::default());
        }
        let mut stats = CacheStats::default();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "stats: unreadable cache path");
                    continue;
                }
            };
            if !entry.file_type().is_file()
                || entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX)
            {
                continue;
            }
            // Swept between listing and stat
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            stats.entries += 1;
            stats.bytes += meta.len();
        }
        Ok(stats)
    }

    /// Delete entries at least `max_age_days` old and prune emptied shards.
    ///
    /// Idempotent and safe to run while requests are being served: an entry
    /// deleted under an open reader stays readable through that handle, and a
    /// removed shard is recreated by the next write. The store root itself
    /// is never removed. A missing root is an empty sweep.
    pub fn sweep(&self, max_age_days: u64) -> Result<SweepReport, CacheError> {
        match fs::metadata(&self.root) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SweepReport::default()),
            Err(e) => return Err(e.into()),
            Ok(meta) if !meta.is_dir() => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("cache root is not a directory: {}", self.root.display()),
                )
                .into());
            }
            Ok(_) => {}
        }

        let max_age = Duration::from_secs(max_age_days.saturating_mul(SECONDS_PER_DAY));
        let now = SystemTime::now();
        let mut report = SweepReport::default();

        for entry in WalkDir::new(&self.root).min_depth(1).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "sweep: unreadable cache path");
                    report.failed += 1;
                    continue;
                }
            };
            let path = entry.path();

            if entry.file_type().is_dir() {
                match prune_if_empty(path) {
                    Ok(true) => report.pruned_dirs += 1,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "sweep: failed to prune directory");
                        report.failed += 1;
                    }
                }
                continue;
            }

            // Future mtimes count as brand new
            let age = match entry.metadata() {
                Ok(meta) => meta
                    .modified()
                    .ok()
                    .and_then(|t| now.duration_since(t).ok())
                    .unwrap_or(Duration::ZERO),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "sweep: failed to stat entry");
                    report.failed += 1;
                    continue;
                }
            };

            let in_progress = entry
                .file_name()
                .to_string_lossy()
                .starts_with(TEMP_PREFIX);
            if in_progress && age < TEMP_GRACE {
                continue;
            }
            if age < max_age {
                continue;
            }

            match fs::remove_file(path) {
                Ok(()) => report.deleted += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "sweep: failed to delete entry");
                    report.failed += 1;
                }
            }
        }

        info!(
            root = %self.root.display(),
            deleted = report.deleted,
            pruned_dirs = report.pruned_dirs,
            failed = report.failed,
            "cache sweep finished"
        );
        Ok(report)
    }
}

/// Remove `dir` if it has no children. Returns whether it was removed.
fn prune_if_empty(dir: &Path) -> io::Result<bool> {
    if fs::read_dir(dir)?.next().is_some() {
        return Ok(false);
    }
    match fs::remove_dir(dir) {
        Ok(()) => Ok(true),
        // Raced with another sweep, or a writer refilled it
        Err(e) if matches!(
            e.kind(),
            io::ErrorKind::NotFound | io::ErrorKind::DirectoryNotEmpty
        ) =>
        {
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
