//! # thumbcache
//!
//! On-demand thumbnail generation for large media libraries, backed by a
//! content-addressed disk cache.
//!
//! A request names a source image and transform options. The first request
//! generates a derived image and stores it; every later request with the
//! same source and options is a single `stat` away from a cache hit. When no
//! transform is needed, or generation fails, the original file is served.
//!
//! # Architecture
//!
//! ```text
//! request ─▶ options ─▶ coordinator ─┬─▶ cache::store  (lookup / atomic store)
//!                          │         └─▶ imaging       (plan → resize → encode)
//!                          ▼
//!                      Resolved { path, served }
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`coordinator`] | Eligibility, key derivation, in-flight dedup, fallback to the original |
//! | [`cache`] | Cache keys (SHA-256 over source identity + options) and the sharded store with sweep and stats |
//! | [`imaging`] | Pure-Rust decode/resize, per-extension encode policy, backend trait |
//! | [`options`] | Request option parsing, clamping, and resolution into hashed form |
//! | [`config`] | `thumbcache.toml` loading, validation, and merging over stock defaults |
//! | [`roots`] | Storage root table: `(root id, relative path)` → absolute path |
//! | [`warm`] | Parallel pre-generation over a directory tree |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## No Manifest
//!
//! The cache has no index file. A key is derived from the source's path,
//! modification time, size, and the fully-resolved options, and the key
//! alone names the entry's location. Lookups need no locking, restarts lose
//! nothing, and eviction is a directory walk.
//!
//! ## Serve the Original When in Doubt
//!
//! A thumbnail endpoint that errors breaks a gallery page; one that serves
//! the full-size original only makes it slower. Every failure path in
//! [`coordinator::Coordinator::resolve`] ends in the original file, and
//! failures are never cached so the next request retries.
//!
//! ## One Generation per Key
//!
//! Popular images are requested by many clients at once right after upload.
//! Concurrent requests for the same key share a single generation instead of
//! decoding the same multi-megabyte source in parallel.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod imaging;
pub mod options;
pub mod output;
pub mod roots;
pub mod warm;

#[cfg(test)]
pub(crate) mod test_helpers;
