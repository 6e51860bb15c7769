// Exportd Filesystem Infrastructure - storage backends and the JSON
// directory data source

mod json_source;
mod local_storage;
mod volume_storage;

pub use json_source::JsonDirSource;
pub use local_storage::LocalDiskStorage;
pub use volume_storage::VolumeStorage;
