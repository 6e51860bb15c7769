// Data Source Port - pluggable row providers
//
// A data source exposes reportable entities (forms, tables, collections)
// and extracts their rows as label-keyed tables. The core only ever talks
// to this trait; concrete providers live outside the core.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A reportable unit inside a data source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub id: String,
    /// Human display name, also the source label in combined exports
    pub name: String,
    /// Short machine handle, used in generated filenames
    pub handle: String,
    pub row_count: i64,
}

/// One exportable field of an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub handle: String,
    pub label: String,
    pub field_type: String,
    pub exportable: bool,
}

/// Resolved extraction options handed to an adapter
#[derive(Debug, Clone, Default)]
pub struct RowQuery {
    /// Inclusive lower bound, epoch ms
    pub start: Option<i64>,
    /// Exclusive upper bound, epoch ms
    pub end: Option<i64>,
    pub site_id: Option<String>,
    /// Field handles to include; empty means every exportable field
    pub fields: Vec<String>,
    /// Pagination over the filtered rows
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// Tabular extraction result: header labels plus row cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Data source port
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Stable machine handle the registry resolves
    fn handle(&self) -> &str;

    /// Human display name
    fn name(&self) -> &str;

    /// Whether the underlying provider can currently serve rows
    async fn is_available(&self) -> bool;

    /// Every reportable entity this source exposes
    async fn entities(&self) -> Result<Vec<EntityDescriptor>>;

    /// Single-entity lookup
    async fn entity(&self, entity_id: &str) -> Result<Option<EntityDescriptor>>;

    /// Exportable fields of one entity
    async fn fields(&self, entity_id: &str) -> Result<Vec<FieldDescriptor>>;

    /// Extract rows for one entity, honoring the query options
    async fn export(&self, entity_id: &str, query: &RowQuery) -> Result<TableData>;
}

/// Handle -> adapter mapping, populated by explicit registration at startup
#[derive(Default)]
pub struct DataSourceRegistry {
    sources: HashMap<String, Arc<dyn DataSource>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn DataSource>) {
        tracing::debug!(handle = source.handle(), "registering data source");
        self.sources.insert(source.handle().to_string(), source);
    }

    pub fn get(&self, handle: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.get(handle).cloned()
    }

    pub fn handles(&self) -> Vec<String> {
        let mut handles: Vec<String> = self.sources.keys().cloned().collect();
        handles.sort();
        handles
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;

    /// One prepared entity of a [`StaticSource`]: descriptor, fields and
    /// rows aligned with the field order
    #[derive(Debug, Clone)]
    pub struct StaticEntity {
        pub descriptor: EntityDescriptor,
        pub fields: Vec<FieldDescriptor>,
        pub rows: Vec<Vec<Value>>,
    }

    impl StaticEntity {
        pub fn new(
            id: impl Into<String>,
            name: impl Into<String>,
            fields: Vec<FieldDescriptor>,
            rows: Vec<Vec<Value>>,
        ) -> Self {
            let id = id.into();
            Self {
                descriptor: EntityDescriptor {
                    handle: id.clone(),
                    id,
                    name: name.into(),
                    row_count: rows.len() as i64,
                },
                fields,
                rows,
            }
        }
    }

    /// Text field helper for test fixtures
    pub fn text_field(handle: impl Into<String>, label: impl Into<String>) -> FieldDescriptor {
        FieldDescriptor {
            handle: handle.into(),
            label: label.into(),
            field_type: "text".to_string(),
            exportable: true,
        }
    }

    /// In-memory data source serving a prepared dataset.
    ///
    /// Honors the field subset and pagination of a query; date and site
    /// filters are ignored, the prepared rows are returned as-is.
    pub struct StaticSource {
        handle: String,
        name: String,
        entities: Vec<StaticEntity>,
        available: bool,
    }

    impl StaticSource {
        pub fn new(handle: impl Into<String>, name: impl Into<String>) -> Self {
            Self {
                handle: handle.into(),
                name: name.into(),
                entities: Vec::new(),
                available: true,
            }
        }

        pub fn with_entity(mut self, entity: StaticEntity) -> Self {
            self.entities.push(entity);
            self
        }

        pub fn unavailable(mut self) -> Self {
            self.available = false;
            self
        }

        fn find(&self, entity_id: &str) -> Option<&StaticEntity> {
            self.entities.iter().find(|e| e.descriptor.id == entity_id)
        }
    }

    #[async_trait]
    impl DataSource for StaticSource {
        fn handle(&self) -> &str {
            &self.handle
        }

        fn name(&self) -> &str {
            &self.name
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn entities(&self) -> Result<Vec<EntityDescriptor>> {
            Ok(self.entities.iter().map(|e| e.descriptor.clone()).collect())
        }

        async fn entity(&self, entity_id: &str) -> Result<Option<EntityDescriptor>> {
            Ok(self.find(entity_id).map(|e| e.descriptor.clone()))
        }

        async fn fields(&self, entity_id: &str) -> Result<Vec<FieldDescriptor>> {
            Ok(self
                .find(entity_id)
                .map(|e| e.fields.clone())
                .unwrap_or_default())
        }

        async fn export(&self, entity_id: &str, query: &RowQuery) -> Result<TableData> {
            let entity = self.find(entity_id).ok_or_else(|| {
                AppError::NotFound(format!("entity {} in {}", entity_id, self.handle))
            })?;

            let selected: Vec<usize> = entity
                .fields
                .iter()
                .enumerate()
                .filter(|(_, f)| {
                    if query.fields.is_empty() {
                        f.exportable
                    } else {
                        query.fields.contains(&f.handle)
                    }
                })
                .map(|(i, _)| i)
                .collect();

            let headers = selected
                .iter()
                .map(|&i| entity.fields[i].label.clone())
                .collect();
            let rows = entity
                .rows
                .iter()
                .skip(query.offset.unwrap_or(0))
                .take(query.limit.unwrap_or(usize::MAX))
                .map(|row| {
                    selected
                        .iter()
                        .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
                        .collect()
                })
                .collect();

            Ok(TableData { headers, rows })
        }
    }
}
