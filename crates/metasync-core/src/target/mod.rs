//! Target metadata repository.
//!
//! The repository is the only memory a refresh cycle has of what was
//! synchronised before. Listings are scoped by level and parent; a scope
//! that never held a record reports [`ListingPage::NeverListed`] so the
//! reconciler can tell a first sync apart from a scope that was emptied.

mod memory;
mod sled_store;

pub use memory::{FailPoint, MemoryTargetStore, WriteOp};
pub use sled_store::SledTargetStore;

use crate::catalog::{CatalogEntity, ForeignKeyProperties, Level, TargetId};
use crate::error::CollaboratorError;
use crate::page::{ListingPage, Page, PageRequest};

/// Result type for target operations.
pub type TargetResult<T> = Result<T, CollaboratorError>;

/// Read/write access to the metadata repository.
pub trait TargetCatalogStore: Send + Sync {
    /// List the records of `level` owned by `parent` (None for databases).
    fn list(
        &self,
        level: Level,
        parent: Option<&TargetId>,
        page: PageRequest,
    ) -> TargetResult<ListingPage>;

    /// Create a record for `entity` under `entity.parent`, returning its
    /// store-assigned identity.
    fn create(&self, entity: &CatalogEntity) -> TargetResult<TargetId>;

    /// Overwrite an existing record with the entity's current state.
    fn update(&self, target_id: &TargetId, entity: &CatalogEntity) -> TargetResult<()>;

    /// Delete a record and everything anchored to it.
    fn delete(&self, level: Level, target_id: &TargetId, qualified_name: &str) -> TargetResult<()>;

    /// Search column records by exact qualified name.
    ///
    /// Several records may carry the same name, so the result is a page of
    /// candidates rather than a single identity.
    fn find_columns_by_qualified_name(
        &self,
        qualified_name: &str,
        page: PageRequest,
    ) -> TargetResult<Page<TargetId>>;

    /// Whether an edge from `from` to `to` already exists.
    fn relationship_exists(&self, from: &TargetId, to: &TargetId) -> TargetResult<bool>;

    /// Create a foreign-key edge between two column records.
    fn create_relationship(
        &self,
        from: &TargetId,
        to: &TargetId,
        properties: &ForeignKeyProperties,
    ) -> TargetResult<()>;
}

impl<T: TargetCatalogStore + ?Sized> TargetCatalogStore for std::sync::Arc<T> {
    fn list(
        &self,
        level: Level,
        parent: Option<&TargetId>,
        page: PageRequest,
    ) -> TargetResult<ListingPage> {
        (**self).list(level, parent, page)
    }

    fn create(&self, entity: &CatalogEntity) -> TargetResult<TargetId> {
        (**self).create(entity)
    }

    fn update(&self, target_id: &TargetId, entity: &CatalogEntity) -> TargetResult<()> {
        (**self).update(target_id, entity)
    }

    fn delete(&self, level: Level, target_id: &TargetId, qualified_name: &str) -> TargetResult<()> {
        (**self).delete(level, target_id, qualified_name)
    }

    fn find_columns_by_qualified_name(
        &self,
        qualified_name: &str,
        page: PageRequest,
    ) -> TargetResult<Page<TargetId>> {
        (**self).find_columns_by_qualified_name(qualified_name, page)
    }

    fn relationship_exists(&self, from: &TargetId, to: &TargetId) -> TargetResult<bool> {
        (**self).relationship_exists(from, to)
    }

    fn create_relationship(
        &self,
        from: &TargetId,
        to: &TargetId,
        properties: &ForeignKeyProperties,
    ) -> TargetResult<()> {
        (**self).create_relationship(from, to, properties)
    }
}

/// Reject records that do not sit where the hierarchy says they should.
fn check_parent(entity: &CatalogEntity) -> TargetResult<()> {
    match (entity.level.is_root(), &entity.parent) {
        (true, Some(_)) => Err(CollaboratorError::invalid_parameter(
            "parent",
            format!("{} `{}` cannot have a parent", entity.level, entity.qualified_name),
        )),
        (false, None) => Err(CollaboratorError::invalid_parameter(
            "parent",
            format!("{} `{}` requires a parent", entity.level, entity.qualified_name),
        )),
        _ => Ok(()),
    }
}

/// Levels whose records are anchored directly beneath a record of `level`.
fn child_levels(level: Level) -> &'static [Level] {
    match level {
        Level::Database => &[Level::Schema],
        Level::Schema => &[Level::Table, Level::View],
        Level::Table | Level::View => &[Level::Column],
        Level::Column => &[],
    }
}
