//! One-shot reconciliation of destinations against their sources.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::Options;
use crate::error::{MirrorError, MirrorResult};
use crate::exclude::{relative_key, ExclusionFilter};
use crate::fs::{FileSystem, LocalFs};
use crate::sync::Synchronization;

/// Entry of a source tree that survived the exclusion filter
#[derive(Debug, Clone, PartialEq, Eq)]
struct TreeEntry {
    relative: PathBuf,
    is_dir: bool,
}

/// Bulk mirror engine
pub struct BulkMirror {
    fs: Arc<dyn FileSystem>,
    options: Options,
    filter: ExclusionFilter,
}

impl BulkMirror {
    /// Create an engine writing through the given filesystem
    pub fn new(fs: Arc<dyn FileSystem>, options: Options) -> MirrorResult<Self> {
        let filter = ExclusionFilter::from_options(&options)?;
        Ok(Self {
            fs,
            options,
            filter,
        })
    }

    /// Mirror every synchronization. Synchronizations run concurrently.
    ///
    /// Any failed copy fails the whole call once the remaining work has
    /// settled; whatever was written stays in place.
    pub async fn run(&self, syncs: &[Synchronization]) -> MirrorResult<()> {
        if syncs.is_empty() {
            return Err(MirrorError::config("must supply at least one synchronization"));
        }

        let results = join_all(syncs.iter().map(|sync| self.mirror_sync(sync))).await;
        let errors: Vec<MirrorError> = results
            .into_iter()
            .filter_map(Result::err)
            .flat_map(|err| match err {
                MirrorError::Aggregate(inner) => inner,
                other => vec![other],
            })
            .collect();

        match MirrorError::aggregate(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn mirror_sync(&self, sync: &Synchronization) -> MirrorResult<()> {
        debug!(
            "Synchronising {:?} -> {:?}",
            sync.sources(),
            sync.destinations()
        );

        if sync.is_merge() {
            if !self.options.keep {
                let cleared = join_all(
                    sync.destinations()
                        .iter()
                        .map(|dest| self.fs.empty_dir(dest)),
                )
                .await;
                collect(cleared)?;
            }

            // later sources must land on top of earlier ones
            for source in sync.sources() {
                let copied = join_all(
                    sync.destinations()
                        .iter()
                        .map(|dest| self.sync_dir(source, dest.clone(), true)),
                )
                .await;
                collect(copied)?;
            }
        } else {
            let mut pairs = Vec::new();
            for source in sync.sources() {
                for dest in sync.destinations() {
                    let output = sync.output_dir(source, dest)?;
                    pairs.push(self.sync_dir(source, output, self.options.keep));
                }
            }
            collect(join_all(pairs).await)?;
        }

        info!(
            "Mirrored {} source(s) into {} destination(s)",
            sync.sources().len(),
            sync.destinations().len()
        );
        Ok(())
    }

    /// Copy the non-excluded contents of `source` into `output`
    async fn sync_dir(&self, source: &Path, output: PathBuf, keep: bool) -> MirrorResult<()> {
        if !keep {
            self.fs.empty_dir(&output).await?;
        } else {
            self.fs.create_dir_all(&output).await?;
        }

        for entry in self.scan(source).await? {
            let target = output.join(&entry.relative);
            if entry.is_dir {
                self.fs.create_dir_all(&target).await?;
            } else {
                self.fs.copy(&source.join(&entry.relative), &target).await?;
            }
        }
        Ok(())
    }

    /// List a source tree, pruning excluded sub-trees
    async fn scan(&self, source: &Path) -> MirrorResult<Vec<TreeEntry>> {
        let root = source.to_path_buf();
        let filter = self.filter.clone();
        tokio::task::spawn_blocking(move || scan_tree(&root, &filter))
            .await
            .map_err(|e| MirrorError::io(source, io::Error::new(io::ErrorKind::Other, e)))?
    }
}

fn scan_tree(root: &Path, filter: &ExclusionFilter) -> MirrorResult<Vec<TreeEntry>> {
    if !root.is_dir() {
        return Err(MirrorError::io(
            root,
            io::Error::new(io::ErrorKind::NotFound, "source directory does not exist"),
        ));
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match relative_key(root, entry.path()) {
            Some(key) => !filter.should_exclude(&key),
            None => true,
        });

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            MirrorError::io(path, io::Error::new(io::ErrorKind::Other, e.to_string()))
        })?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        entries.push(TreeEntry {
            relative,
            is_dir: entry.file_type().is_dir(),
        });
    }
    Ok(entries)
}

fn collect(results: Vec<MirrorResult<()>>) -> MirrorResult<()> {
    let errors: Vec<MirrorError> = results.into_iter().filter_map(Result::err).collect();
    match MirrorError::aggregate(errors) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Mirror `syncs` onto the local disk
pub async fn mirror_directories(syncs: &[Synchronization], options: &Options) -> MirrorResult<()> {
    BulkMirror::new(Arc::new(LocalFs::new()), options.clone())?
        .run(syncs)
        .await
}
