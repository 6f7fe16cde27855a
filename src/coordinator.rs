//! Generation coordinator: the one entry point requests go through.
//!
//! [`Coordinator::resolve`] turns `(source, options)` into a file path that
//! can be served. It never fails. When anything goes wrong the answer is the
//! original file, tagged with why.
//!
//! ```text
//! resolve(source, options)
//!   │
//!   ├─ missing / not an image / too small ──────────▶ Original(reason)
//!   │
//!   ├─ derive key ─▶ lookup ─── hit ────────────────▶ Cached
//!   │
//!   └─ claim key (registry lock)
//!        ├─ someone else generating ─▶ wait ────────▶ their result
//!        ├─ entry appeared meanwhile ───────────────▶ Cached
//!        └─ lead: transform ─┬─ encoded ─▶ store ───▶ Generated
//!                            ├─ fits already ───────▶ Original(WithinBounds)
//!                            └─ error / panic ──────▶ Original(Failed)
//! ```
//!
//! At most one generation per key runs at a time in this process. Callers
//! for the same key that arrive while it runs wait for it and share its
//! result. Failures are reported to everyone waiting but never cached, so the
//! next request tries again.

use crate::cache::{
    CacheError, CacheKey, CacheStats, CacheStore, SourceIdentity, SweepReport, derive_key,
};
use crate::config::ThumbcacheConfig;
use crate::imaging::backend::{BackendError, ImageBackend};
use crate::imaging::operations::{self, TransformOutput};
use crate::imaging::policy::extension_of;
use crate::options::{EffectiveOptions, TransformOptions};
use std::any::Any;
use std::collections::HashMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// `Cache-Control` for generated thumbnails; their key changes with the source.
pub const CACHE_CONTROL_TRANSFORMED: &str = "public, max-age=31536000";
/// `Cache-Control` when the original is served.
pub const CACHE_CONTROL_ORIGINAL: &str = "public, max-age=3600";

/// Why the original file was served instead of a thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Source does not exist or cannot be stat'd.
    Missing,
    /// Extension is not a configured image extension.
    NotAnImage,
    /// Smaller than `min_file_size` and not forced by `always_transform`.
    BelowMinSize,
    /// Already inside the requested box.
    WithinBounds,
    /// Generation or caching failed.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    Cached,
    Generated,
    Original(Reason),
}

/// The answer to a request: a path to serve and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: PathBuf,
    pub served: Served,
}

impl Resolved {
    fn original(path: &Path, reason: Reason) -> Self {
        Self {
            path: path.to_path_buf(),
            served: Served::Original(reason),
        }
    }

    /// Whether `path` is a cache entry rather than the source.
    pub fn is_transformed(&self) -> bool {
        matches!(self.served, Served::Cached | Served::Generated)
    }

    pub fn cache_control(&self) -> &'static str {
        if self.is_transformed() {
            CACHE_CONTROL_TRANSFORMED
        } else {
            CACHE_CONTROL_ORIGINAL
        }
    }
}

#[derive(Error, Debug)]
enum GenerateError {
    #[error("source vanished: {0}")]
    SourceNotFound(PathBuf),
    #[error(transparent)]
    Backend(BackendError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("transform panicked: {0}")]
    Panicked(String),
}

impl GenerateError {
    fn from_backend(source: &Path, err: BackendError) -> Self {
        match err {
            BackendError::Io(e) if e.kind() == io::ErrorKind::NotFound => {
                Self::SourceNotFound(source.to_path_buf())
            }
            other => Self::Backend(other),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Registry state stays consistent across a panicking holder, so poisoning
/// is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A generation in progress. Waiters block until the leader publishes.
#[derive(Default)]
struct Pending {
    outcome: Mutex<Option<Resolved>>,
    ready: Condvar,
}

impl Pending {
    fn publish(&self, resolved: Resolved) {
        *lock(&self.outcome) = Some(resolved);
        self.ready.notify_all();
    }

    fn wait(&self) -> Resolved {
        let mut outcome = lock(&self.outcome);
        loop {
            if let Some(resolved) = outcome.as_ref() {
                return resolved.clone();
            }
            outcome = self
                .ready
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

type Registry = Mutex<HashMap<CacheKey, Arc<Pending>>>;

enum Claim {
    Follow(Arc<Pending>),
    Done(PathBuf),
    Lead(Arc<Pending>),
}

/// Held by the caller generating a key.
///
/// Dropping it, normally or while unwinding, deregisters the key and
/// publishes the outcome, so waiters can never be stranded.
struct Leadership<'a> {
    registry: &'a Registry,
    key: CacheKey,
    pending: Arc<Pending>,
    fallback: PathBuf,
    outcome: Option<Resolved>,
}

impl Leadership<'_> {
    fn finish(mut self, resolved: Resolved) -> Resolved {
        self.outcome = Some(resolved.clone());
        resolved
    }
}

impl Drop for Leadership<'_> {
    fn drop(&mut self) {
        {
            let mut registry = lock(self.registry);
            if registry
                .get(&self.key)
                .is_some_and(|p| Arc::ptr_eq(p, &self.pending))
            {
                registry.remove(&self.key);
            }
        }
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| Resolved::original(&self.fallback, Reason::Failed));
        self.pending.publish(outcome);
    }
}

/// Owns the backend, the cache store, and the in-flight registry.
///
/// Share it by reference across threads; every method takes `&self`.
pub struct Coordinator<B: ImageBackend> {
    backend: B,
    store: CacheStore,
    config: ThumbcacheConfig,
    in_flight: Registry,
}

impl<B: ImageBackend> Coordinator<B> {
    /// The cache lives at `config.cache.dir`.
    pub fn new(backend: B, config: ThumbcacheConfig) -> Self {
        Self {
            backend,
            store: CacheStore::new(&config.cache.dir),
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ThumbcacheConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of keys currently being generated.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Resolve `source` under `options` to a path to serve.
    pub fn resolve(&self, source: &Path, options: &TransformOptions) -> Resolved {
        let identity = match SourceIdentity::stat(source) {
            Ok(identity) => identity,
            Err(err) => {
                debug!(source = %source.display(), error = %err, "source unavailable");
                return Resolved::original(source, Reason::Missing);
            }
        };

        let thumbnails = &self.config.thumbnails;
        let Some(ext) = extension_of(source).filter(|e| thumbnails.is_image(e)) else {
            return Resolved::original(source, Reason::NotAnImage);
        };
        if identity.size < thumbnails.min_file_size && !thumbnails.always_transforms(&ext) {
            return Resolved::original(source, Reason::BelowMinSize);
        }

        let effective = options.effective(&ext, &self.config);
        let key = match derive_key(&identity, &effective) {
            Ok(key) => key,
            Err(err) => {
                warn!(source = %source.display(), error = %err, "key derivation failed, serving original");
                return Resolved::original(source, Reason::Failed);
            }
        };

        if let Some(path) = self.store.lookup(&key) {
            debug!(source = %source.display(), key = %key, "cache hit");
            return Resolved {
                path,
                served: Served::Cached,
            };
        }

        match self.claim(&key) {
            Claim::Follow(pending) => {
                debug!(source = %source.display(), key = %key, "attaching to in-flight generation");
                pending.wait()
            }
            Claim::Done(path) => Resolved {
                path,
                served: Served::Cached,
            },
            Claim::Lead(pending) => {
                let leadership = Leadership {
                    registry: &self.in_flight,
                    key: key.clone(),
                    pending,
                    fallback: source.to_path_buf(),
                    outcome: None,
                };
                let resolved = self.lead(source, &key, &effective);
                leadership.finish(resolved)
            }
        }
    }

    /// Join or start the generation for `key`.
    ///
    /// The disk is re-checked under the registry lock: a leader stores its
    /// entry before deregistering, so a key absent from both has no
    /// generation running and none finished.
    fn claim(&self, key: &CacheKey) -> Claim {
        let mut registry = lock(&self.in_flight);
        if let Some(pending) = registry.get(key) {
            return Claim::Follow(Arc::clone(pending));
        }
        if let Some(path) = self.store.lookup(key) {
            return Claim::Done(path);
        }
        let pending = Arc::new(Pending::default());
        registry.insert(key.clone(), Arc::clone(&pending));
        Claim::Lead(pending)
    }

    fn lead(&self, source: &Path, key: &CacheKey, effective: &EffectiveOptions) -> Resolved {
        debug!(source = %source.display(), key = %key, "cache miss, generating");
        let started = Instant::now();

        match self.generate(source, key, effective) {
            Ok(Some(path)) => {
                info!(
                    source = %source.display(),
                    key = %key,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "thumbnail generated"
                );
                Resolved {
                    path,
                    served: Served::Generated,
                }
            }
            Ok(None) => {
                debug!(source = %source.display(), "source already within bounds");
                Resolved::original(source, Reason::WithinBounds)
            }
            Err(err) => {
                warn!(source = %source.display(), error = %err, "thumbnail generation failed, serving original");
                Resolved::original(source, Reason::Failed)
            }
        }
    }

    /// Run the engine and store its output. `Ok(None)` means no transform
    /// was needed.
    fn generate(
        &self,
        source: &Path,
        key: &CacheKey,
        effective: &EffectiveOptions,
    ) -> Result<Option<PathBuf>, GenerateError> {
        // Decoders for hostile input have been known to panic
        let output = panic::catch_unwind(AssertUnwindSafe(|| {
            operations::transform(&self.backend, source, effective)
        }))
        .map_err(|payload| GenerateError::Panicked(panic_message(payload)))?
        .map_err(|err| GenerateError::from_backend(source, err))?;

        match output {
            TransformOutput::Unchanged(_) => Ok(None),
            TransformOutput::Encoded { bytes, .. } => Ok(Some(self.store.store(key, &bytes)?)),
        }
    }

    /// Delete cache entries at least `max_age_days` old.
    pub fn sweep(&self, max_age_days: u64) -> Result<SweepReport, CacheError> {
        self.store.sweep(max_age_days)
    }

    /// Entries on disk plus generations currently running.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = self.store.stats()?;
        stats.in_flight = self.in_flight();
        Ok(stats)
    }

    /// [`sweep`](Self::sweep) with `cache.max_age_days`.
    pub fn sweep_default(&self) -> Result<SweepReport, CacheError> {
        self.sweep(self.config.cache.max_age_days)
    }
}
