//! Source catalog read from a JSON snapshot file.
//!
//! A snapshot describes databases, their schemas, the tables and views of
//! each schema, their columns and the foreign keys declared on tables:
//!
//! ```json
//! {
//!   "databases": [{
//!     "name": "sales",
//!     "schemas": [{
//!       "name": "public",
//!       "tables": [{
//!         "name": "orders",
//!         "columns": [{ "name": "id", "attributes": { "data_type": "integer" } }],
//!         "foreign_keys": [{
//!           "imported_qualified_name": "sales.public.orders.customer_id",
//!           "exported_qualified_name": "sales.public.customers.id"
//!         }]
//!       }]
//!     }]
//!   }]
//! }
//! ```
//!
//! Qualified names default to the dot-joined path from the database down.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::memory::{MemoryCatalog, MemorySession};
use super::{SourceCatalog, SourceResult, SourceSession};
use crate::catalog::{Attributes, CatalogEntity, ForeignKeyLink, Level};
use crate::error::SnapshotError;
use crate::source::MemorySource;

/// A complete source catalog.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CatalogSnapshot {
    /// Databases hosted by the source.
    #[serde(default)]
    pub databases: Vec<DatabaseSnapshot>,
}

/// A database and its schemas.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DatabaseSnapshot {
    /// Native name.
    pub name: String,
    /// Explicit qualified name.
    #[serde(default)]
    pub qualified_name: Option<String>,
    /// Descriptive properties.
    #[serde(default)]
    pub attributes: Attributes,
    /// Schemas of the database.
    #[serde(default)]
    pub schemas: Vec<SchemaSnapshot>,
}

/// A schema with its tables and views.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SchemaSnapshot {
    /// Native name.
    pub name: String,
    /// Explicit qualified name.
    #[serde(default)]
    pub qualified_name: Option<String>,
    /// Descriptive properties.
    #[serde(default)]
    pub attributes: Attributes,
    /// Tables of the schema.
    #[serde(default)]
    pub tables: Vec<TableSnapshot>,
    /// Views of the schema.
    #[serde(default)]
    pub views: Vec<TableSnapshot>,
}

/// A table or view with its columns.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TableSnapshot {
    /// Native name.
    pub name: String,
    /// Explicit qualified name.
    #[serde(default)]
    pub qualified_name: Option<String>,
    /// Descriptive properties.
    #[serde(default)]
    pub attributes: Attributes,
    /// Columns, in ordinal order.
    #[serde(default)]
    pub columns: Vec<ColumnSnapshot>,
    /// Foreign keys declared on the table. Ignored for views.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyLink>,
}

/// A column.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColumnSnapshot {
    /// Native name.
    pub name: String,
    /// Explicit qualified name.
    #[serde(default)]
    pub qualified_name: Option<String>,
    /// Descriptive properties.
    #[serde(default)]
    pub attributes: Attributes,
}

fn qualify(explicit: &Option<String>, parent: Option<&str>, name: &str) -> String {
    match (explicit, parent) {
        (Some(qualified_name), _) => qualified_name.clone(),
        (None, Some(parent)) => format!("{}.{}", parent, name),
        (None, None) => name.to_string(),
    }
}

impl CatalogSnapshot {
    /// Parse a snapshot from JSON text.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a snapshot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Build an in-memory source holding this snapshot.
    pub fn into_source(self) -> MemorySource {
        MemorySource::from_catalog(self.to_catalog())
    }

    pub(crate) fn to_catalog(&self) -> MemoryCatalog {
        let mut catalog = MemoryCatalog::default();

        for db in &self.databases {
            let db_qn = qualify(&db.qualified_name, None, &db.name);
            catalog.insert(
                "",
                CatalogEntity::database(&db_qn, &db.name).with_attributes(db.attributes.clone()),
            );

            for schema in &db.schemas {
                let schema_qn = qualify(&schema.qualified_name, Some(&db_qn), &schema.name);
                catalog.insert(
                    &db_qn,
                    CatalogEntity::schema(&schema_qn, &schema.name)
                        .with_attributes(schema.attributes.clone()),
                );

                let tables = schema.tables.iter().map(|t| (Level::Table, t));
                let views = schema.views.iter().map(|v| (Level::View, v));
                for (level, table) in tables.chain(views) {
                    let table_qn = qualify(&table.qualified_name, Some(&schema_qn), &table.name);
                    catalog.insert(
                        &schema_qn,
                        CatalogEntity::new(level, &table_qn, &table.name)
                            .with_attributes(table.attributes.clone()),
                    );

                    for (index, column) in table.columns.iter().enumerate() {
                        let column_qn =
                            qualify(&column.qualified_name, Some(&table_qn), &column.name);
                        let mut attributes = column.attributes.clone();
                        if attributes.ordinal_position.is_none() {
                            attributes.ordinal_position = Some(index as u32 + 1);
                        }
                        catalog.insert(
                            &table_qn,
                            CatalogEntity::column(&column_qn, &column.name)
                                .with_attributes(attributes),
                        );
                    }

                    if level == Level::Table {
                        for link in &table.foreign_keys {
                            catalog.add_foreign_key(&table_qn, link.clone());
                        }
                    }
                }
            }
        }

        catalog
    }
}

/// Source catalog backed by a snapshot file.
///
/// The file is re-read whenever a session is opened, so each refresh cycle
/// sees the file's current contents.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    path: PathBuf,
}

impl SnapshotSource {
    /// Create a source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceCatalog for SnapshotSource {
    fn open_session(&self) -> SourceResult<Box<dyn SourceSession + '_>> {
        let snapshot = CatalogSnapshot::load(&self.path)?;
        debug!(
            path = %self.path.display(),
            databases = snapshot.databases.len(),
            "Loaded catalog snapshot"
        );
        Ok(Box::new(MemorySession::new(snapshot.to_catalog(), None)))
    }
}
