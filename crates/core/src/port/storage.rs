// Storage Backend Port (Interface)
//
// The pipeline and the retention cleaner only need this narrow surface;
// where the bytes actually live is an infra concern.

use async_trait::async_trait;

use crate::error::Result;

/// Storage backend port
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write a file, creating parent directories as needed
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Read a file; None when it does not exist
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Delete a file; deleting an absent path is not an error
    async fn delete(&self, path: &str) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory storage backend for tests
    #[derive(Default)]
    pub struct MemoryStorage {
        files: Mutex<HashMap<String, Vec<u8>>>,
        fail_writes: AtomicBool,
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make subsequent writes fail, for storage-error tests
        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub fn bytes(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().expect("storage lock").get(path).cloned()
        }

        pub fn file_count(&self) -> usize {
            self.files.lock().expect("storage lock").len()
        }

        pub fn insert(&self, path: impl Into<String>, bytes: Vec<u8>) {
            self.files
                .lock()
                .expect("storage lock")
                .insert(path.into(), bytes);
        }
    }

    #[async_trait]
    impl StorageBackend for MemoryStorage {
        async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppError::Storage(format!("write failed: {}", path)));
            }
            self.files
                .lock()
                .expect("storage lock")
                .insert(path.to_string(), bytes.to_vec());
            Ok(())
        }

        async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.files.lock().expect("storage lock").get(path).cloned())
        }

        async fn exists(&self, path: &str) -> Result<bool> {
            Ok(self.files.lock().expect("storage lock").contains_key(path))
        }

        async fn delete(&self, path: &str) -> Result<()> {
            self.files.lock().expect("storage lock").remove(path);
            Ok(())
        }
    }
}
