// ID Provider Port (for deterministic testing)

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new unique record ID
    fn generate_id(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

pub mod mocks {
    use super::IdProvider;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Sequential IDs (`id-1`, `id-2`, ...) for deterministic tests
    pub struct SequentialIdProvider {
        counter: AtomicU64,
    }

    impl SequentialIdProvider {
        pub fn new() -> Self {
            Self {
                counter: AtomicU64::new(0),
            }
        }
    }

    impl Default for SequentialIdProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    impl IdProvider for SequentialIdProvider {
        fn generate_id(&self) -> String {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            format!("id-{}", n)
        }
    }
}
