// Local filesystem storage backend

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use exportd_core::error::{AppError, Result};
use exportd_core::port::StorageBackend;

/// Storage backend rooted at a configured directory
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a relative storage path under the root. Absolute paths and
    /// parent-directory components are rejected so a stored path can never
    /// escape the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(AppError::Storage(format!("invalid storage path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageBackend for LocalDiskStorage {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        debug!(path = %full.display(), size = bytes.len(), "file written");
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %full.display(), "delete of absent file, nothing to do");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (LocalDiskStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("temp dir");
        (LocalDiskStorage::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let (storage, _dir) = storage();
        storage.write("a/b/report.csv", b"data").await.unwrap();

        assert!(storage.exists("a/b/report.csv").await.unwrap());
        assert_eq!(
            storage.read("a/b/report.csv").await.unwrap(),
            Some(b"data".to_vec())
        );
    }

    #[tokio::test]
    async fn test_read_of_missing_file_is_none() {
        let (storage, _dir) = storage();
        assert_eq!(storage.read("missing.csv").await.unwrap(), None);
        assert!(!storage.exists("missing.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (storage, _dir) = storage();
        storage.write("report.csv", b"data").await.unwrap();

        storage.delete("report.csv").await.unwrap();
        assert!(!storage.exists("report.csv").await.unwrap());
        // Deleting again is fine
        storage.delete("report.csv").await.unwrap();
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_the_root() {
        let (storage, _dir) = storage();
        assert!(storage.write("../escape.csv", b"x").await.is_err());
        assert!(storage.write("/etc/escape.csv", b"x").await.is_err());
    }
}
