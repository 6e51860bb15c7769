// Mounted-volume storage backend

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use exportd_core::error::Result;
use exportd_core::port::StorageBackend;

use crate::LocalDiskStorage;

/// Fixed sub-path every export lands under on the volume
const VOLUME_SUBPATH: &str = "exports";

/// Storage backend for an object-store-style mounted volume.
///
/// Interchangeable with [`LocalDiskStorage`]; the only difference is that
/// all files are pinned under the `exports/` sub-path of the mount.
pub struct VolumeStorage {
    inner: LocalDiskStorage,
}

impl VolumeStorage {
    pub fn new(mount: impl AsRef<Path>) -> Self {
        let root: PathBuf = mount.as_ref().join(VOLUME_SUBPATH);
        Self {
            inner: LocalDiskStorage::new(root),
        }
    }
}

#[async_trait]
impl StorageBackend for VolumeStorage {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.inner.write(path, bytes).await
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.inner.read(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await
    }
}
