//! In-memory source catalog.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{SourceCatalog, SourceResult, SourceSession};
use crate::catalog::{Attributes, CatalogEntity, ForeignKeyLink, Level};
use crate::error::CollaboratorError;
use crate::page::{Page, PageRequest};

/// Which listing an injected failure applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Listing {
    Entities(Level),
    ForeignKeys,
}

/// Catalog contents, keyed by (child level, parent qualified name).
///
/// Databases live under the empty parent name.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryCatalog {
    children: HashMap<(Level, String), Vec<CatalogEntity>>,
    foreign_keys: HashMap<String, Vec<ForeignKeyLink>>,
    failures: HashSet<(Listing, String)>,
}

impl MemoryCatalog {
    /// Insert or replace an entity under a parent.
    pub(crate) fn insert(&mut self, parent: &str, entity: CatalogEntity) {
        let scope = self
            .children
            .entry((entity.level, parent.to_string()))
            .or_default();
        match scope
            .iter_mut()
            .find(|e| e.qualified_name == entity.qualified_name)
        {
            Some(existing) => *existing = entity,
            None => scope.push(entity),
        }
    }

    /// Remove an entity and everything beneath it.
    fn remove(&mut self, level: Level, qualified_name: &str) -> bool {
        let mut removed = false;
        for ((scope_level, _), entities) in self.children.iter_mut() {
            if *scope_level == level {
                let before = entities.len();
                entities.retain(|e| e.qualified_name != qualified_name);
                removed |= entities.len() != before;
            }
        }
        if removed {
            let owned: Vec<(Level, String)> = self
                .children
                .iter()
                .filter(|((_, parent), _)| parent == qualified_name)
                .flat_map(|(_, entities)| {
                    entities
                        .iter()
                        .map(|e| (e.level, e.qualified_name.clone()))
                        .collect::<Vec<_>>()
                })
                .collect();
            self.children.retain(|(_, parent), _| parent != qualified_name);
            self.foreign_keys.remove(qualified_name);
            for (child_level, child) in owned {
                self.remove(child_level, &child);
            }
        }
        removed
    }

    fn set_attributes(
        &mut self,
        level: Level,
        qualified_name: &str,
        attributes: Attributes,
    ) -> bool {
        let entity = self
            .children
            .iter_mut()
            .filter(|((scope_level, _), _)| *scope_level == level)
            .flat_map(|(_, entities)| entities.iter_mut())
            .find(|e| e.qualified_name == qualified_name);
        match entity {
            Some(entity) => {
                entity.attributes = attributes;
                true
            }
            None => false,
        }
    }

    pub(crate) fn add_foreign_key(&mut self, table: &str, link: ForeignKeyLink) {
        self.foreign_keys
            .entry(table.to_string())
            .or_default()
            .push(link);
    }

    fn check(&self, listing: Listing, scope: &str) -> SourceResult<()> {
        if self.failures.contains(&(listing.clone(), scope.to_string())) {
            let what = match listing {
                Listing::Entities(level) => level.to_string(),
                Listing::ForeignKeys => "foreign key".to_string(),
            };
            return Err(CollaboratorError::Query(format!(
                "could not list {} entries of `{}`",
                what, scope
            )));
        }
        Ok(())
    }

    fn entities(
        &self,
        level: Level,
        parent: &str,
        page: PageRequest,
    ) -> SourceResult<Page<CatalogEntity>> {
        self.check(Listing::Entities(level), parent)?;
        let all = self
            .children
            .get(&(level, parent.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(Page::slice(all, page))
    }

    fn links(&self, table: &str, page: PageRequest) -> SourceResult<Page<ForeignKeyLink>> {
        self.check(Listing::ForeignKeys, table)?;
        let all = self
            .foreign_keys
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(Page::slice(all, page))
    }
}

/// Source catalog held in memory.
///
/// Clones share the same contents, so a test can keep a handle, change the
/// catalog between cycles, and inject listing failures. Each session works
/// on a copy taken when it was opened.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    catalog: Arc<Mutex<MemoryCatalog>>,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_catalog(catalog: MemoryCatalog) -> Self {
        Self {
            catalog: Arc::new(Mutex::new(catalog)),
            ..Default::default()
        }
    }

    /// Add a database.
    pub fn with_database(self, database: CatalogEntity) -> Self {
        self.add("", database);
        self
    }

    /// Add a schema to a database.
    pub fn with_schema(self, database: &str, schema: CatalogEntity) -> Self {
        self.add(database, schema);
        self
    }

    /// Add a table to a schema.
    pub fn with_table(self, schema: &str, table: CatalogEntity) -> Self {
        self.add(schema, table);
        self
    }

    /// Add a view to a schema.
    pub fn with_view(self, schema: &str, view: CatalogEntity) -> Self {
        self.add(schema, view);
        self
    }

    /// Add a column to a table or view.
    pub fn with_column(self, table: &str, column: CatalogEntity) -> Self {
        self.add(table, column);
        self
    }

    /// Declare a foreign key on a table.
    pub fn with_foreign_key(self, table: &str, link: ForeignKeyLink) -> Self {
        self.add_foreign_key(table, link);
        self
    }

    /// Insert or replace an entity under the parent with the given
    /// qualified name (empty for databases).
    pub fn add(&self, parent: &str, entity: CatalogEntity) {
        self.catalog.lock().insert(parent, entity);
    }

    /// Declare a foreign key on a table.
    pub fn add_foreign_key(&self, table: &str, link: ForeignKeyLink) {
        self.catalog.lock().add_foreign_key(table, link);
    }

    /// Remove an entity and everything beneath it.
    pub fn remove(&self, level: Level, qualified_name: &str) -> bool {
        self.catalog.lock().remove(level, qualified_name)
    }

    /// Replace an entity's attributes.
    pub fn set_attributes(
        &self,
        level: Level,
        qualified_name: &str,
        attributes: Attributes,
    ) -> bool {
        self.catalog
            .lock()
            .set_attributes(level, qualified_name, attributes)
    }

    /// Make listing `level` under `parent` fail with a query error.
    pub fn fail_listing(&self, level: Level, parent: &str) {
        self.catalog
            .lock()
            .failures
            .insert((Listing::Entities(level), parent.to_string()));
    }

    /// Make listing the foreign keys of `table` fail with a query error.
    pub fn fail_foreign_keys(&self, table: &str) {
        self.catalog
            .lock()
            .failures
            .insert((Listing::ForeignKeys, table.to_string()));
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.catalog.lock().failures.clear();
    }

    /// Number of sessions opened so far.
    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of sessions released so far.
    pub fn sessions_released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl SourceCatalog for MemorySource {
    fn open_session(&self) -> SourceResult<Box<dyn SourceSession + '_>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession::new(
            self.catalog.lock().clone(),
            Some(self.released.clone()),
        )))
    }
}

/// A session over a copy of an in-memory catalog.
#[derive(Debug)]
pub struct MemorySession {
    catalog: MemoryCatalog,
    released: Option<Arc<AtomicUsize>>,
}

impl MemorySession {
    pub(crate) fn new(catalog: MemoryCatalog, released: Option<Arc<AtomicUsize>>) -> Self {
        Self { catalog, released }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if let Some(released) = &self.released {
            released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl SourceSession for MemorySession {
    fn list_databases(&mut self, page: PageRequest) -> SourceResult<Page<CatalogEntity>> {
        self.catalog.entities(Level::Database, "", page)
    }

    fn list_schemas(
        &mut self,
        database: &CatalogEntity,
        page: PageRequest,
    ) -> SourceResult<Page<CatalogEntity>> {
        self.catalog
            .entities(Level::Schema, &database.qualified_name, page)
    }

    fn list_tables(
        &mut self,
        schema: &CatalogEntity,
        page: PageRequest,
    ) -> SourceResult<Page<CatalogEntity>> {
        self.catalog.entities(Level::Table, &schema.qualified_name, page)
    }

    fn list_views(
        &mut self,
        schema: &CatalogEntity,
        page: PageRequest,
    ) -> SourceResult<Page<CatalogEntity>> {
        self.catalog.entities(Level::View, &schema.qualified_name, page)
    }

    fn list_columns(
        &mut self,
        table: &CatalogEntity,
        page: PageRequest,
    ) -> SourceResult<Page<CatalogEntity>> {
        self.catalog.entities(Level::Column, &table.qualified_name, page)
    }

    fn list_foreign_key_links(
        &mut self,
        table: &CatalogEntity,
        page: PageRequest,
    ) -> SourceResult<Page<ForeignKeyLink>> {
        self.catalog.links(&table.qualified_name, page)
    }
}
