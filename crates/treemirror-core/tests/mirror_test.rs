use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;
use treemirror_core::{
    fs::{FileSystem, LocalFs},
    mirror::{mirror_directories, BulkMirror},
    sync::{SyncBuilder, Synchronization},
    MirrorError, MirrorResult, Options,
};
use walkdir::WalkDir;

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Relative path -> contents of every file below `root`
fn snapshot(root: &Path) -> BTreeMap<String, String> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().into_owned();
            (rel, std::fs::read_to_string(e.path()).unwrap())
        })
        .collect()
}

fn sync(sources: &[&Path], destinations: &[&Path], merge: bool) -> Synchronization {
    Synchronization::new(
        sources.iter().map(|p| p.to_path_buf()).collect(),
        destinations.iter().map(|p| p.to_path_buf()).collect(),
        merge,
    )
    .unwrap()
}

#[tokio::test]
async fn test_non_merge_creates_named_subdirectories() {
    let dir = tempdir().unwrap();
    let lib = dir.path().join("lib");
    let assets = dir.path().join("assets");
    write(&lib.join("index.js"), "lib");
    write(&assets.join("img/logo.svg"), "svg");
    let out1 = dir.path().join("out1");
    let out2 = dir.path().join("out2");

    let syncs = vec![
        sync(&[&lib], &[&out1, &out2], false),
        sync(&[&assets], &[&out1, &out2], false),
    ];
    mirror_directories(&syncs, &Options::default()).await.unwrap();

    for out in [&out1, &out2] {
        assert_eq!(snapshot(&out.join("lib")), snapshot(&lib));
        assert_eq!(snapshot(&out.join("assets")), snapshot(&assets));
    }
}

#[tokio::test]
async fn test_merge_later_source_wins() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    write(&a.join("shared.txt"), "from a");
    write(&a.join("only_a.txt"), "a");
    write(&b.join("shared.txt"), "from b");
    write(&b.join("nested/only_b.txt"), "b");
    let out = dir.path().join("out");

    mirror_directories(&[sync(&[&a, &b], &[&out], true)], &Options::default())
        .await
        .unwrap();

    let tree = snapshot(&out);
    assert_eq!(tree["shared.txt"], "from b");
    assert_eq!(tree["only_a.txt"], "a");
    assert_eq!(tree["nested/only_b.txt"], "b");
    assert_eq!(tree.len(), 3);
}

#[tokio::test]
async fn test_mirror_is_idempotent() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    write(&a.join("x/1.txt"), "1");
    write(&b.join("x/1.txt"), "2");
    write(&b.join("y.txt"), "y");
    let out = dir.path().join("out");
    let syncs = vec![sync(&[&a, &b], &[&out], true)];

    mirror_directories(&syncs, &Options::default()).await.unwrap();
    let first = snapshot(&out);
    mirror_directories(&syncs, &Options::default()).await.unwrap();
    assert_eq!(first, snapshot(&out));
}

#[tokio::test]
async fn test_destination_is_cleared_unless_keep() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    write(&src.join("new.txt"), "new");
    let out = dir.path().join("out");
    write(&out.join("stale.txt"), "stale");
    write(&out.join("src/stale.txt"), "stale");

    let syncs = vec![sync(&[&src], &[&out], true)];
    mirror_directories(&syncs, &Options::default().with_keep(true))
        .await
        .unwrap();
    assert!(out.join("stale.txt").exists());
    assert!(out.join("new.txt").exists());

    mirror_directories(&syncs, &Options::default()).await.unwrap();
    assert!(!out.join("stale.txt").exists());
    assert!(out.join("new.txt").exists());

    // non-merge only clears its own sub-directory
    write(&out.join("src/stale.txt"), "stale");
    write(&out.join("sibling.txt"), "kept");
    mirror_directories(&[sync(&[&src], &[&out], false)], &Options::default())
        .await
        .unwrap();
    assert!(!out.join("src/stale.txt").exists());
    assert!(out.join("src/new.txt").exists());
    assert!(out.join("sibling.txt").exists());
}

#[tokio::test]
async fn test_excluded_paths_never_reach_destination() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    write(&src.join("keep.txt"), "k");
    write(&src.join("node_modules/pkg/index.js"), "x");
    write(&src.join("logs/today.log"), "x");
    write(&src.join("deep/cache/blob"), "x");
    let out = dir.path().join("out");

    let options = Options::default()
        .with_exclude("node_modules")
        .with_exclude_pattern("*.log")
        .with_exclude_pattern("cache");
    mirror_directories(&[sync(&[&src], &[&out], true)], &options)
        .await
        .unwrap();

    let tree = snapshot(&out);
    assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["keep.txt"]);
    assert!(!out.join("node_modules").exists());
    assert!(!out.join("deep/cache").exists());
}

#[tokio::test]
async fn test_builder_output_feeds_engine() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    write(&a.join("f.txt"), "a");
    write(&b.join("f.txt"), "b");
    let out = dir.path().join("out");

    let mut builder = SyncBuilder::new();
    builder
        .mirror(&format!("{}/,{}/:{}", a.display(), b.display(), out.display()))
        .unwrap();
    let syncs = builder.build().unwrap();
    mirror_directories(&syncs, &Options::default()).await.unwrap();
    assert_eq!(std::fs::read_to_string(out.join("f.txt")).unwrap(), "b");
}

/// Local filesystem that refuses to copy files named `poison`
struct PoisonFs;

#[async_trait]
impl FileSystem for PoisonFs {
    async fn copy(&self, src: &Path, dst: &Path) -> MirrorResult<()> {
        if src.file_name().map_or(false, |n| n == "poison") {
            return Err(MirrorError::io(
                src,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "poisoned"),
            ));
        }
        LocalFs.copy(src, dst).await
    }

    async fn remove(&self, path: &Path) -> MirrorResult<()> {
        LocalFs.remove(path).await
    }

    async fn empty_dir(&self, path: &Path) -> MirrorResult<()> {
        LocalFs.empty_dir(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> MirrorResult<()> {
        LocalFs.create_dir_all(path).await
    }
}

#[tokio::test]
async fn test_copy_failure_aborts_with_aggregated_error() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good");
    let bad = dir.path().join("bad");
    write(&good.join("fine.txt"), "ok");
    write(&bad.join("poison"), "x");
    let out1 = dir.path().join("out1");
    let out2 = dir.path().join("out2");

    let engine = BulkMirror::new(Arc::new(PoisonFs), Options::default()).unwrap();
    let err = engine
        .run(&[
            sync(&[&good], &[&out1, &out2], false),
            sync(&[&bad], &[&out1, &out2], false),
        ])
        .await
        .unwrap_err();

    match err {
        MirrorError::Aggregate(errors) => assert_eq!(errors.len(), 2),
        other => panic!("expected aggregated error, got {other}"),
    }
    // independent pairs still completed
    assert!(out1.join("good/fine.txt").exists());
    assert!(out2.join("good/fine.txt").exists());
}

#[tokio::test]
async fn test_missing_source_fails() {
    let dir = tempdir().unwrap();
    let missing: PathBuf = dir.path().join("missing");
    let out = dir.path().join("out");
    let err = mirror_directories(&[sync(&[&missing], &[&out], false)], &Options::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MirrorError::Io { .. }));
}
