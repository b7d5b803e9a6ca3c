use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use walkdir::WalkDir;

use crate::error::{MirrorError, MirrorResult};

/// Filesystem primitives the mirror engines mutate destinations through
#[async_trait]
pub trait FileSystem: Send + Sync + 'static {
    /// Copy a file or a whole directory tree, overwriting what is in the way
    async fn copy(&self, src: &Path, dst: &Path) -> MirrorResult<()>;

    /// Remove a file or directory. A path that is already gone is not an error.
    async fn remove(&self, path: &Path) -> MirrorResult<()>;

    /// Create `path` if absent, otherwise delete everything inside it
    async fn empty_dir(&self, path: &Path) -> MirrorResult<()>;

    /// Create a directory and all its parents
    async fn create_dir_all(&self, path: &Path) -> MirrorResult<()>;
}

/// [`FileSystem`] backed by the local disk
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }

    async fn copy_file(src: &Path, dst: &Path) -> MirrorResult<()> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| MirrorError::io(parent, e))?;
        }
        // a directory in the way of a file must go first
        if let Ok(meta) = fs::symlink_metadata(dst).await {
            if meta.is_dir() {
                fs::remove_dir_all(dst).await.map_err(|e| MirrorError::io(dst, e))?;
            }
        }
        fs::copy(src, dst).await.map_err(|e| MirrorError::io(src, e))?;
        Ok(())
    }

    async fn copy_tree(src: &Path, dst: &Path) -> MirrorResult<()> {
        let root = src.to_path_buf();
        let entries = tokio::task::spawn_blocking(move || -> MirrorResult<Vec<(PathBuf, bool)>> {
            let mut entries = Vec::new();
            for entry in WalkDir::new(&root).min_depth(1).follow_links(true) {
                let entry = entry.map_err(|e| {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    MirrorError::io(path, io::Error::new(io::ErrorKind::Other, e.to_string()))
                })?;
                let relative = entry
                    .path()
                    .strip_prefix(&root)
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                entries.push((relative, entry.file_type().is_dir()));
            }
            Ok(entries)
        })
        .await
        .map_err(|e| MirrorError::io(src, io::Error::new(io::ErrorKind::Other, e)))??;

        fs::create_dir_all(dst).await.map_err(|e| MirrorError::io(dst, e))?;
        for (relative, is_dir) in entries {
            let target = dst.join(&relative);
            if is_dir {
                fs::create_dir_all(&target)
                    .await
                    .map_err(|e| MirrorError::io(&target, e))?;
            } else {
                Self::copy_file(&src.join(&relative), &target).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystem for LocalFs {
    async fn copy(&self, src: &Path, dst: &Path) -> MirrorResult<()> {
        let meta = fs::metadata(src).await.map_err(|e| MirrorError::io(src, e))?;
        if meta.is_dir() {
            Self::copy_tree(src, dst).await
        } else {
            Self::copy_file(src, dst).await
        }
    }

    async fn remove(&self, path: &Path) -> MirrorResult<()> {
        let meta = match fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(MirrorError::io(path, e)),
        };
        let result = if meta.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MirrorError::io(path, e)),
        }
    }

    async fn empty_dir(&self, path: &Path) -> MirrorResult<()> {
        let mut entries = match fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return self.create_dir_all(path).await;
            }
            Err(e) => return Err(MirrorError::io(path, e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MirrorError::io(path, e))?
        {
            self.remove(&entry.path()).await?;
        }
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> MirrorResult<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| MirrorError::io(path, e))
    }
}
