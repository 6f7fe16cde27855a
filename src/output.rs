//! CLI output formatting.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.
//!
//! # Output Format
//!
//! ## Resolve
//!
//! ```text
//! album/dawn.jpg
//!     Served: generated
//!     Path: .thumbcache/3f/3f9a…c1.jpg
//!     Cache-Control: public, max-age=31536000
//! ```
//!
//! ## Warm
//!
//! ```text
//! Warming 3 images
//! 001 album/a.png: generated
//! 002 album/b.jpg: cached
//! 003 album/c.tiff: original (failed)
//! ```
//!
//! ## Stats
//!
//! ```text
//! Cache .thumbcache: 1204 entries, 38.2 MB
//! ```
//!
//! ## Roots
//!
//! ```text
//! 0 cosergirl → /srv/media/a
//! 1 cosergirl → /srv/media/b
//! ```

use crate::cache::{CacheStats, SweepReport};
use crate::coordinator::{Reason, Resolved, Served};
use crate::roots::RootTable;
use crate::warm::WarmEvent;
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Show `path` relative to `base` when it lives under it.
fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Human label for how a request was served.
pub fn served_label(served: Served) -> &'static str {
    match served {
        Served::Cached => "cached",
        Served::Generated => "generated",
        Served::Original(Reason::Missing) => "original (missing)",
        Served::Original(Reason::NotAnImage) => "original (not an image)",
        Served::Original(Reason::BelowMinSize) => "original (below min size)",
        Served::Original(Reason::WithinBounds) => "original (within bounds)",
        Served::Original(Reason::Failed) => "original (failed)",
    }
}

// ============================================================================
// resolve
// ============================================================================

pub fn format_resolved(source: &Path, resolved: &Resolved) -> Vec<String> {
    vec![
        source.display().to_string(),
        format!("{}Served: {}", indent(1), served_label(resolved.served)),
        format!("{}Path: {}", indent(1), resolved.path.display()),
        format!("{}Cache-Control: {}", indent(1), resolved.cache_control()),
    ]
}

pub fn print_resolved(source: &Path, resolved: &Resolved) {
    for line in format_resolved(source, resolved) {
        println!("{}", line);
    }
}

// ============================================================================
// warm
// ============================================================================

/// Format a single warm progress event. Sources are shown relative to `root`.
pub fn format_warm_event(event: &WarmEvent, root: &Path) -> Vec<String> {
    match event {
        WarmEvent::Started { total } => vec![format!("Warming {} images", total)],
        WarmEvent::Resolved {
            index,
            source,
            served,
            ..
        } => vec![format!(
            "{} {}: {}",
            format_index(*index),
            display_relative(source, root),
            served_label(*served)
        )],
    }
}

// ============================================================================
// sweep / stats / roots
// ============================================================================

pub fn format_sweep(report: &SweepReport, cache_root: &Path) -> Vec<String> {
    vec![format!("Swept {}: {}", cache_root.display(), report)]
}

pub fn print_sweep(report: &SweepReport, cache_root: &Path) {
    for line in format_sweep(report, cache_root) {
        println!("{}", line);
    }
}

pub fn format_stats(stats: &CacheStats, cache_root: &Path) -> Vec<String> {
    vec![format!("Cache {}: {}", cache_root.display(), stats)]
}

pub fn print_stats(stats: &CacheStats, cache_root: &Path) {
    for line in format_stats(stats, cache_root) {
        println!("{}", line);
    }
}

pub fn format_roots(table: &RootTable) -> Vec<String> {
    if table.is_empty() {
        return vec!["No roots configured".to_string()];
    }
    table
        .iter()
        .map(|r| format!("{} {} → {}", r.id, r.origin, r.path.display()))
        .collect()
}

pub fn print_roots(table: &RootTable) {
    for line in format_roots(table) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roots::Root;
    use std::path::PathBuf;

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(1000), "1000");
    }

    #[test]
    fn indent_levels() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    #[test]
    fn display_relative_outside_base_is_unchanged() {
        assert_eq!(
            display_relative(Path::new("/other/a.jpg"), Path::new("/root")),
            "/other/a.jpg"
        );
        assert_eq!(
            display_relative(Path::new("/root/x/a.jpg"), Path::new("/root")),
            "x/a.jpg"
        );
    }

    // =========================================================================
    // Command output
    // =========================================================================

    #[test]
    fn format_resolved_generated() {
        let resolved = Resolved {
            path: PathBuf::from("/cache/ab/abc.jpg"),
            served: Served::Generated,
        };
        let lines = format_resolved(Path::new("album/dawn.jpg"), &resolved);
        assert_eq!(lines[0], "album/dawn.jpg");
        assert_eq!(lines[1], "    Served: generated");
        assert_eq!(lines[2], "    Path: /cache/ab/abc.jpg");
        assert_eq!(lines[3], "    Cache-Control: public, max-age=31536000");
    }

    #[test]
    fn format_warm_events() {
        let root = Path::new("/photos");
        assert_eq!(
            format_warm_event(&WarmEvent::Started { total: 3 }, root),
            vec!["Warming 3 images"]
        );
        let event = WarmEvent::Resolved {
            index: 2,
            source: PathBuf::from("/photos/album/b.jpg"),
            served: Served::Original(Reason::Failed),
            path: PathBuf::from("/photos/album/b.jpg"),
        };
        assert_eq!(
            format_warm_event(&event, root),
            vec!["002 album/b.jpg: original (failed)"]
        );
    }

    #[test]
    fn format_sweep_line() {
        let report = SweepReport {
            deleted: 4,
            pruned_dirs: 1,
            failed: 0,
        };
        assert_eq!(
            format_sweep(&report, Path::new(".thumbcache")),
            vec!["Swept .thumbcache: 4 removed, 1 empty dirs pruned"]
        );
    }

    #[test]
    fn format_stats_line() {
        let stats = CacheStats {
            entries: 2,
            bytes: 2048,
            in_flight: 1,
        };
        assert_eq!(
            format_stats(&stats, Path::new(".thumbcache")),
            vec!["Cache .thumbcache: 2 entries, 2.0 KB, 1 in flight"]
        );
    }

    #[test]
    fn format_roots_lists_each() {
        let table = RootTable::new(vec![Root {
            id: 0,
            path: PathBuf::from("/srv/a"),
            origin: "cosergirl".into(),
        }])
        .unwrap();
        assert_eq!(format_roots(&table), vec!["0 cosergirl → /srv/a"]);
        assert_eq!(
            format_roots(&RootTable::default()),
            vec!["No roots configured"]
        );
    }
}
