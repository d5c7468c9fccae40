// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! File-backed store: one file per key inside a directory.

use super::KeyValueStore;
use crate::error::AppError;
use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Durable store rooted at a directory.
///
/// Writes go to a temporary file that is renamed over the target, so a
/// reader never observes a half-written value.
pub struct FileStore {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, AppError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(AppError::InvalidInput(format!("invalid store key: {name:?}")));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn put(&self, name: &str, value: &str) -> Result<(), AppError> {
        let path = self.path_for(name)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::StorageWrite(format!("{}: {}", self.dir.display(), e)))?;

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{name}.{seq}.tmp"));

        if let Err(e) = tokio::fs::write(&tmp, value.as_bytes()).await {
            return Err(AppError::StorageWrite(format!("{}: {}", tmp.display(), e)));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::StorageWrite(format!("{}: {}", path.display(), e)));
        }
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<String>, AppError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| AppError::StorageRead(format!("{}: not valid UTF-8", path.display()))),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::StorageRead(format!("{}: {}", path.display(), e))),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), AppError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::StorageWrite(format!("{}: {}", path.display(), e))),
        }
    }
}
