//! Content-addressed thumbnail cache.
//!
//! # Design
//!
//! An entry is identified by a [`CacheKey`]: a SHA-256 over the source's
//! identity (path, modification time, size) and the fully-resolved
//! [`EffectiveOptions`](crate::options::EffectiveOptions). There is no
//! manifest. The key alone determines where the entry lives, so a lookup is a
//! single `stat` and a restart loses nothing.
//!
//! ## Storage
//!
//! ```text
//! <cache dir>/
//! ├── 00/
//! │   └── 00a1…9f.jpg
//! ├── 01/
//! …
//! └── ff/
//! ```
//!
//! The first two hex characters pick one of 256 shard directories, which
//! keeps any single directory small. Entries are written to a temp file in
//! the shard and renamed into place, so readers never observe partial files.
//!
//! ## Eviction
//!
//! Nothing expires on its own. [`CacheStore::sweep`] deletes entries whose
//! mtime is older than a threshold and prunes shards left empty. Run it from
//! cron or the `sweep` subcommand. [`CacheStore::stats`] reports how much
//! is on disk.

pub mod key;
pub mod store;

pub use key::{CacheKey, SourceIdentity, derive_key};
pub use store::{CacheStats, CacheStore, SweepReport};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to write cache entry {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize options: {0}")]
    Json(#[from] serde_json::Error),
}
