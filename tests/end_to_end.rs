//! End-to-end resolution through the real image backend.
//!
//! Fixtures are encoded with the `image` crate directly; everything else
//! goes through the public API the CLI uses.

use image::{ImageEncoder, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Barrier;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use walkdir::WalkDir;
use thumbcache::config::ThumbcacheConfig;
use thumbcache::coordinator::{Coordinator, Reason, Served};
use thumbcache::imaging::RustBackend;
use thumbcache::options::{RawOptions, TransformOptions};

fn write_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let file = fs::File::create(path).unwrap();
    image::codecs::jpeg::JpegEncoder::new_with_quality(file, 90)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

fn store_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

struct Setup {
    _tmp: TempDir,
    photos: PathBuf,
    coordinator: Coordinator<RustBackend>,
}

fn setup() -> Setup {
    let tmp = TempDir::new().unwrap();
    let photos = tmp.path().join("photos");
    fs::create_dir_all(&photos).unwrap();

    let mut config = ThumbcacheConfig::default();
    config.cache.dir = tmp.path().join("cache");
    config.thumbnails.min_file_size = 0;

    Setup {
        coordinator: Coordinator::new(RustBackend::new(), config),
        photos,
        _tmp: tmp,
    }
}

#[test]
fn generates_once_then_serves_from_cache() {
    let s = setup();
    let source = s.photos.join("dawn.jpg");
    write_jpeg(&source, 1600, 1200);
    let options = TransformOptions::sized(Some(400), Some(400));

    let first = s.coordinator.resolve(&source, &options);
    assert_eq!(first.served, Served::Generated);
    assert!(first.path.starts_with(s.coordinator.store().root()));
    assert_eq!(first.path.extension().unwrap(), "jpg");
    assert_eq!(image::image_dimensions(&first.path).unwrap(), (400, 300));

    let second = s.coordinator.resolve(&source, &options);
    assert_eq!(second.served, Served::Cached);
    assert_eq!(second.path, first.path);
}

#[test]
fn concurrent_requests_share_one_thumbnail_and_large_box_serves_original() {
    let s = setup();
    let source = s.photos.join("large.jpg");
    write_jpeg(&source, 2000, 2000);
    let options = RawOptions {
        width: Some("400".into()),
        height: Some("400".into()),
        quality: Some("80".into()),
        ..RawOptions::default()
    }
    .parse()
    .unwrap();

    let barrier = Barrier::new(2);
    let (a, b) = std::thread::scope(|scope| {
        let first = scope.spawn(|| {
            barrier.wait();
            s.coordinator.resolve(&source, &options)
        });
        let second = scope.spawn(|| {
            barrier.wait();
            s.coordinator.resolve(&source, &options)
        });
        (first.join().unwrap(), second.join().unwrap())
    });

    assert_eq!(a.path, b.path);
    assert!(a.is_transformed() && b.is_transformed());
    assert!(a.served == Served::Generated || b.served == Served::Generated);
    let (w, h) = image::image_dimensions(&a.path).unwrap();
    assert!(w <= 400 && h <= 400);
    assert_eq!(store_files(s.coordinator.store().root()), vec![a.path.clone()]);

    let wide = RawOptions {
        width: Some("2500".into()),
        ..RawOptions::default()
    }
    .parse()
    .unwrap();
    let original = s.coordinator.resolve(&source, &wide);
    assert_eq!(original.served, Served::Original(Reason::WithinBounds));
    assert_eq!(original.path, source);
    assert_eq!(store_files(s.coordinator.store().root()).len(), 1);
}

#[test]
fn source_within_bounds_is_served_unchanged() {
    let s = setup();
    let source = s.photos.join("small.jpg");
    write_jpeg(&source, 640, 480);
    let options = RawOptions {
        width: Some("2500".into()),
        ..RawOptions::default()
    }
    .parse()
    .unwrap();

    let resolved = s.coordinator.resolve(&source, &options);
    assert_eq!(resolved.served, Served::Original(Reason::WithinBounds));
    assert_eq!(resolved.path, source);
    assert!(!resolved.is_transformed());
}

#[test]
fn undecodable_source_falls_back_to_original() {
    let s = setup();
    let source = s.photos.join("broken.jpg");
    fs::write(&source, b"this is not a jpeg").unwrap();

    let resolved = s
        .coordinator
        .resolve(&source, &TransformOptions::sized(Some(200), Some(200)));
    assert_eq!(resolved.served, Served::Original(Reason::Failed));
    assert_eq!(resolved.path, source);
    assert_eq!(fs::read(&resolved.path).unwrap(), b"this is not a jpeg");
}

#[test]
fn changed_source_gets_a_new_entry() {
    let s = setup();
    let source = s.photos.join("edit.jpg");
    write_jpeg(&source, 1200, 800);
    let options = TransformOptions::sized(Some(300), Some(300));

    let before = s.coordinator.resolve(&source, &options);
    write_jpeg(&source, 800, 1200);
    let later = SystemTime::now() + Duration::from_secs(60);
    fs::File::options()
        .write(true)
        .open(&source)
        .unwrap()
        .set_modified(later)
        .unwrap();
    let after = s.coordinator.resolve(&source, &options);

    assert_eq!(after.served, Served::Generated);
    assert_ne!(before.path, after.path);
    assert_eq!(image::image_dimensions(&after.path).unwrap(), (200, 300));
}

#[test]
fn sweep_with_zero_age_empties_the_store() {
    let s = setup();
    for name in ["a.jpg", "b.jpg"] {
        let source = s.photos.join(name);
        write_jpeg(&source, 900, 900);
        let resolved = s
            .coordinator
            .resolve(&source, &TransformOptions::sized(Some(100), Some(100)));
        assert_eq!(resolved.served, Served::Generated);
    }

    let report = s.coordinator.sweep(0).unwrap();
    assert_eq!(report.deleted, 2);

    let root = s.coordinator.store().root();
    assert!(root.is_dir());
    assert_eq!(fs::read_dir(root).unwrap().count(), 0);
}
