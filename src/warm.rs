//! Cache warm-up: pre-generate thumbnails for every image under a directory.
//!
//! Sources are collected with `walkdir`, sorted by path, and resolved in
//! parallel on the rayon pool through the same [`Coordinator`] that serves
//! requests, so a warm run and live traffic never generate the same key
//! twice. Progress is streamed as [`WarmEvent`]s over an optional channel;
//! the caller decides how to display them.

use crate::config::ThumbnailsConfig;
use crate::coordinator::{Coordinator, Reason, Served};
use crate::imaging::ImageBackend;
use crate::imaging::policy::extension_of;
use crate::options::TransformOptions;
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tracing::warn;
use walkdir::WalkDir;

/// Progress report from [`warm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmEvent {
    /// Sent once, before any work starts.
    Started { total: usize },
    /// One source finished. `index` is its 1-based position in path order.
    Resolved {
        index: usize,
        source: PathBuf,
        served: Served,
        path: PathBuf,
    },
}

/// Tally of one warm run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WarmReport {
    pub generated: u32,
    pub cached: u32,
    /// Served as-is: already within bounds or below the size threshold.
    pub unchanged: u32,
    pub failed: u32,
}

impl WarmReport {
    pub fn record(&mut self, served: Served) {
        match served {
            Served::Generated => self.generated += 1,
            Served::Cached => self.cached += 1,
            Served::Original(Reason::Failed | Reason::Missing) => self.failed += 1,
            Served::Original(_) => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.generated + self.cached + self.unchanged + self.failed
    }
}

impl fmt::Display for WarmReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cached > 0 || self.unchanged > 0 {
            write!(
                f,
                "{} generated, {} cached, {} unchanged ({} total)",
                self.generated,
                self.cached,
                self.unchanged,
                self.total()
            )?;
        } else {
            write!(f, "{} generated", self.generated)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

/// Every image file under `root`, sorted by path.
///
/// `skip` (typically the cache directory) is not descended into, so warming
/// a tree that contains its own cache does not thumbnail the thumbnails.
pub fn collect_sources(root: &Path, thumbnails: &ThumbnailsConfig, skip: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != skip)
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "warm: skipping unreadable path");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| extension_of(e.path()).is_some_and(|ext| thumbnails.is_image(&ext)))
        .map(|e| e.into_path())
        .collect()
}

/// Resolve every image under `root` with `options`.
///
/// Runs on the global rayon pool; size it with the `processing.max_processes`
/// setting before calling.
pub fn warm<B: ImageBackend>(
    coordinator: &Coordinator<B>,
    root: &Path,
    options: &TransformOptions,
    events: Option<Sender<WarmEvent>>,
) -> WarmReport {
    let sources = collect_sources(
        root,
        &coordinator.config().thumbnails,
        coordinator.store().root(),
    );
    if let Some(tx) = &events {
        tx.send(WarmEvent::Started {
            total: sources.len(),
        })
        .ok();
    }

    let outcomes: Vec<Served> = sources
        .par_iter()
        .enumerate()
        .map_with(events, |tx, (i, source)| {
            let resolved = coordinator.resolve(source, options);
            if let Some(tx) = tx {
                tx.send(WarmEvent::Resolved {
                    index: i + 1,
                    source: source.clone(),
                    served: resolved.served,
                    path: resolved.path,
                })
                .ok();
            }
            resolved.served
        })
        .collect();

    let mut report = WarmReport::default();
    for served in outcomes {
        report.record(served);
    }
    report
}
