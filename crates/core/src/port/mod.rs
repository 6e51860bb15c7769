// Port Layer - Interfaces for external dependencies

pub mod data_source;
pub mod export_repository;
pub mod id_provider;
pub mod job_queue;
pub mod report_repository;
pub mod storage;
pub mod time_provider;

// Re-exports
pub use data_source::{
    DataSource, DataSourceRegistry, EntityDescriptor, FieldDescriptor, RowQuery, TableData,
};
pub use export_repository::ExportRepository;
pub use id_provider::{IdProvider, UuidProvider};
pub use job_queue::{JobQueue, QueueTask, QueuedTask};
pub use report_repository::ReportRepository;
pub use storage::StorageBackend;
pub use time_provider::{SystemTimeProvider, TimeProvider};
