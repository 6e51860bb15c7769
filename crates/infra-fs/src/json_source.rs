// JSON directory data source
//
// Reference adapter serving a directory of entity documents, one JSON
// file per entity:
//
// {
//   "id": "form-contact",
//   "name": "Contact Form",
//   "handle": "contact",
//   "fields": [{"handle": "name", "label": "Name", "type": "text"}],
//   "rows": [{"name": "Alice", "_date": 1700000000000, "_site": "default"}]
// }
//
// Row values are keyed by field handle. The reserved keys `_date` (epoch
// ms) and `_site` drive date-range and site filtering; rows without a
// reserved key pass the corresponding filter.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use exportd_core::error::{AppError, Result};
use exportd_core::port::data_source::{
    DataSource, EntityDescriptor, FieldDescriptor, RowQuery, TableData,
};

const DATE_KEY: &str = "_date";
const SITE_KEY: &str = "_site";

pub struct JsonDirSource {
    handle: String,
    name: String,
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(handle: impl Into<String>, name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            handle: handle.into(),
            name: name.into(),
            dir: dir.into(),
        }
    }

    /// Parse every readable entity document; corrupt files are logged and
    /// skipped so one bad document cannot take down entity listing
    async fn load_all(&self) -> Result<Vec<EntityDoc>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut docs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<EntityDoc>(&bytes) {
                Ok(doc) => docs.push(doc),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable entity document");
                }
            }
        }
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }

    async fn load(&self, entity_id: &str) -> Result<Option<EntityDoc>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .find(|doc| doc.id == entity_id))
    }
}

#[async_trait]
impl DataSource for JsonDirSource {
    fn handle(&self) -> &str {
        &self.handle
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        tokio::fs::try_exists(&self.dir).await.unwrap_or(false)
    }

    async fn entities(&self) -> Result<Vec<EntityDescriptor>> {
        Ok(self
            .load_all()
            .await?
            .iter()
            .map(EntityDoc::descriptor)
            .collect())
    }

    async fn entity(&self, entity_id: &str) -> Result<Option<EntityDescriptor>> {
        Ok(self.load(entity_id).await?.as_ref().map(EntityDoc::descriptor))
    }

    async fn fields(&self, entity_id: &str) -> Result<Vec<FieldDescriptor>> {
        Ok(self
            .load(entity_id)
            .await?
            .map(|doc| doc.fields.into_iter().map(FieldDoc::into_descriptor).collect())
            .unwrap_or_default())
    }

    async fn export(&self, entity_id: &str, query: &RowQuery) -> Result<TableData> {
        let doc = self.load(entity_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("entity {} in {}", entity_id, self.handle))
        })?;

        let selected: Vec<&FieldDoc> = doc
            .fields
            .iter()
            .filter(|f| {
                if query.fields.is_empty() {
                    f.exportable
                } else {
                    query.fields.contains(&f.handle)
                }
            })
            .collect();

        let headers = selected.iter().map(|f| f.label.clone()).collect();
        let rows = doc
            .rows
            .iter()
            .filter(|row| row_matches(row, query))
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|row| {
                selected
                    .iter()
                    .map(|f| row.get(&f.handle).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Ok(TableData { headers, rows })
    }
}

fn row_matches(row: &Map<String, Value>, query: &RowQuery) -> bool {
    if let Some(date) = row.get(DATE_KEY).and_then(Value::as_i64) {
        if query.start.map(|start| date < start).unwrap_or(false) {
            return false;
        }
        if query.end.map(|end| date >= end).unwrap_or(false) {
            return false;
        }
    }
    if let (Some(wanted), Some(site)) = (
        query.site_id.as_deref(),
        row.get(SITE_KEY).and_then(Value::as_str),
    ) {
        if wanted != site {
            return false;
        }
    }
    true
}

#[derive(Debug, Deserialize)]
struct EntityDoc {
    id: String,
    name: String,
    handle: Option<String>,
    #[serde(default)]
    fields: Vec<FieldDoc>,
    #[serde(default)]
    rows: Vec<Map<String, Value>>,
}

impl EntityDoc {
    fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor {
            id: self.id.clone(),
            name: self.name.clone(),
            handle: self.handle.clone().unwrap_or_else(|| self.id.clone()),
            row_count: self.rows.len() as i64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FieldDoc {
    handle: String,
    label: String,
    #[serde(rename = "type", default = "default_field_type")]
    field_type: String,
    #[serde(default = "default_exportable")]
    exportable: bool,
}

impl FieldDoc {
    fn into_descriptor(self) -> FieldDescriptor {
        FieldDescriptor {
            handle: self.handle,
            label: self.label,
            field_type: self.field_type,
            exportable: self.exportable,
        }
    }
}

fn default_field_type() -> String {
    "text".to_string()
}

fn default_exportable() -> bool {
    true
}
