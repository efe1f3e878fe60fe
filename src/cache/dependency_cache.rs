//! Directory-backed dependency download cache
//!
//! Each saved cache is a directory `<store>/<key>/`. Entries are immutable:
//! a key that already exists is never overwritten, and a save is staged in a
//! temporary directory and renamed into place.

use crate::cache::cache_key::CacheKey;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Result of a restore attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreStatus {
    Hit { files: usize },
    Miss,
}

impl RestoreStatus {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }
}

/// Result of a save attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saved { files: usize },
    AlreadyCached,
    NothingToSave,
}

/// Store of saved dependency caches
#[derive(Debug, Clone)]
pub struct DependencyCache {
    store_root: PathBuf,
}

impl DependencyCache {
    pub fn new<P: AsRef<Path>>(store_root: P) -> Self {
        Self {
            store_root: store_root.as_ref().to_path_buf(),
        }
    }

    /// Store under `configured`, else `$HOME/.cache/release-publisher`
    pub fn from_config(configured: Option<&str>) -> Self {
        let root = match configured {
            Some(path) => PathBuf::from(path),
            None => std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir)
                .join(".cache")
                .join("release-publisher"),
        };
        Self::new(root)
    }

    pub fn store_root(&self) -> &Path {
        &self.store_root
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.store_root.join(key.as_str())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entry_path(key).is_dir()
    }

    /// Copy the entry for `key` into `target`
    pub async fn restore(&self, key: &CacheKey, target: &Path) -> io::Result<RestoreStatus> {
        let entry = self.entry_path(key);
        if !entry.is_dir() {
            return Ok(RestoreStatus::Miss);
        }

        let target = target.to_path_buf();
        let files = tokio::task::spawn_blocking(move || copy_tree(&entry, &target))
            .await
            .map_err(io::Error::other)??;

        Ok(RestoreStatus::Hit { files })
    }

    /// Save `source` under `key` unless the key is already cached
    pub async fn save(&self, key: &CacheKey, source: &Path) -> io::Result<SaveStatus> {
        let entry = self.entry_path(key);
        if entry.is_dir() {
            return Ok(SaveStatus::AlreadyCached);
        }
        if !source.is_dir() {
            return Ok(SaveStatus::NothingToSave);
        }

        tokio::fs::create_dir_all(&self.store_root).await?;

        let staging = self
            .store_root
            .join(format!(".{}.tmp-{}", key.as_str(), uuid::Uuid::new_v4()));
        let source = source.to_path_buf();
        let staged = staging.clone();
        let files = tokio::task::spawn_blocking(move || copy_tree(&source, &staged))
            .await
            .map_err(io::Error::other)??;

        if files == 0 {
            tokio::fs::remove_dir_all(&staging).await?;
            return Ok(SaveStatus::NothingToSave);
        }

        if let Err(e) = tokio::fs::rename(&staging, &entry).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            // Another writer won the race; its entry is as good as ours
            if entry.is_dir() {
                return Ok(SaveStatus::AlreadyCached);
            }
            return Err(e);
        }

        Ok(SaveStatus::Saved { files })
    }
}

/// Recursively copy `from` into `to`, returning the number of files copied
fn copy_tree(from: &Path, to: &Path) -> io::Result<usize> {
    std::fs::create_dir_all(to)?;
    let mut files = 0;

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let destination = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &destination)?;
            files += 1;
        }
    }

    Ok(files)
}
