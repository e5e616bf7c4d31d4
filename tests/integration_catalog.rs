//! End-to-end catalog behavior against a real directory tree.

use castserve::av::Device;
use castserve::catalog::Catalog;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write_file(path: &Path, content: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn discovery_and_hidden_skip() {
    let tmp = tempdir().unwrap();
    write_file(&tmp.path().join("a/b.mp4"), b"v");
    write_file(&tmp.path().join("c.mkv"), b"v");
    write_file(&tmp.path().join(".trash/x.mkv"), b"v");
    write_file(&tmp.path().join("d/.hidden.mp4"), b"v");
    write_file(&tmp.path().join("d/readme.txt"), b"t");

    let catalog = Catalog::new(tmp.path(), &tmp.path().join(".cache"), "fre").unwrap();
    let dirs = catalog.enumerate();

    let entry = catalog.lookup_entry("a/b.mp4").expect("a/b.mp4");
    assert_eq!(entry.rel(), "a/b.mp4");
    assert!(!entry.is_cached(Device::StreamingDongle));
    assert!(!entry.is_transcoding());

    let dir = catalog.lookup_dir("a/").expect("a/");
    assert!(dir.lookup_entry("b.mp4").is_some());
    assert!(catalog.lookup_entry("c.mkv").is_some());

    // Hidden directories, hidden files, and unrecognized extensions are
    // invisible; a directory with nothing recognized in it gets pruned.
    assert!(catalog.lookup_entry(".trash/x.mkv").is_none());
    assert!(catalog.lookup_entry("d/.hidden.mp4").is_none());
    assert!(catalog.lookup_entry("d/readme.txt").is_none());
    assert!(catalog.lookup_dir("d").is_none());
    assert_eq!(catalog.lookup_dir("").unwrap().total_items(), 2);

    // The observed directory list starts at the root and skips hidden
    // subtrees.
    assert!(dirs.contains(&"".into()), "{dirs:?}");
    assert!(dirs.contains(&"a".into()), "{dirs:?}");
    assert!(!dirs.iter().any(|d| d.starts_with(".trash")), "{dirs:?}");
}

#[test]
fn path_shape_rejection() {
    let tmp = tempdir().unwrap();
    write_file(&tmp.path().join("a/b.mp4"), b"v");
    write_file(&tmp.path().join("x.mp4"), b"v");
    let catalog = Catalog::new(tmp.path(), &tmp.path().join(".cache"), "eng").unwrap();
    catalog.enumerate();

    for rel in ["/x.mp4", "/a/b.mp4", "a//b.mp4", "a/b.mp4/", "x.mp4/"] {
        assert!(catalog.lookup_entry(rel).is_none(), "unexpected entry {rel:?}");
    }
    for rel in ["/a", "a//", "//"] {
        assert!(catalog.lookup_dir(rel).is_none(), "unexpected dir {rel:?}");
    }
    assert!(catalog.lookup_entry("a/b.mp4").is_some());
    assert!(catalog.lookup_dir("a/").is_some());
}

#[test]
fn refresh_sweeps_deleted_files() {
    let tmp = tempdir().unwrap();
    write_file(&tmp.path().join("a/b.mp4"), b"v");
    write_file(&tmp.path().join("keep.mkv"), b"v");
    let catalog = Catalog::new(tmp.path(), &tmp.path().join(".cache"), "eng").unwrap();
    catalog.enumerate();

    let kept_before = catalog.lookup_entry("keep.mkv").unwrap();
    assert!(catalog.lookup_entry("a/b.mp4").is_some());

    std::fs::remove_dir_all(tmp.path().join("a")).unwrap();
    catalog.enumerate();

    assert!(catalog.lookup_entry("a/b.mp4").is_none());
    assert!(catalog.lookup_dir("a/").is_none());
    assert!(catalog.lookup_dir("a").is_none());
    // Surviving files keep their record across refreshes.
    let kept_after = catalog.lookup_entry("keep.mkv").unwrap();
    assert!(Arc::ptr_eq(&kept_before, &kept_after));
    assert_eq!(catalog.lookup_dir("").unwrap().total_items(), 1);
}

#[test]
fn existing_renditions_are_detected() {
    let tmp = tempdir().unwrap();
    let cache = tmp.path().join(".cache");
    write_file(&tmp.path().join("a/b.mkv"), b"v");
    write_file(&cache.join("streaming-dongle/a/b.mp4"), b"rendition");
    write_file(&cache.join("preview/a/b.webp"), b"");

    let catalog = Catalog::new(tmp.path(), &cache, "eng").unwrap();
    catalog.enumerate();

    let entry = catalog.lookup_entry("a/b.mkv").unwrap();
    assert!(entry.is_cached(Device::StreamingDongle));
    assert!(!entry.is_cached(Device::StreamingDongleHd));
    assert!(!entry.is_cached(Device::Laptop));
    // Zero-size renditions do not count.
    assert!(!entry.is_cached(Device::Preview));

    // The mapping to the rendition path is deterministic and carries the
    // device container extension.
    assert_eq!(entry.cached_path(Device::StreamingDongle), "streaming-dongle/a/b.mp4");
    assert_eq!(entry.cached_path(Device::Preview), "preview/a/b.webp");
    assert_eq!(
        entry.cached_path(Device::Laptop),
        catalog
            .lookup_entry("a/b.mkv")
            .unwrap()
            .cached_path(Device::Laptop)
    );
}
