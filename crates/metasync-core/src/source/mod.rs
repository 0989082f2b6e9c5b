//! Source catalog readers.
//!
//! A [`SourceCatalog`] hands out one [`SourceSession`] per refresh cycle.
//! The session owns whatever connection the source needs and releases it
//! when dropped, so the orchestrator acquires exactly one session per cycle
//! and the release happens as soon as the cycle's reads are finished.

mod memory;
mod snapshot;

pub use memory::{MemorySession, MemorySource};
pub use snapshot::{
    CatalogSnapshot, ColumnSnapshot, DatabaseSnapshot, SchemaSnapshot, SnapshotSource,
    TableSnapshot,
};

use crate::catalog::{CatalogEntity, ForeignKeyLink};
use crate::error::CollaboratorError;
use crate::page::{Page, PageRequest};

/// Result type for source reads.
pub type SourceResult<T> = Result<T, CollaboratorError>;

/// A source system whose structure is mirrored into the target store.
pub trait SourceCatalog {
    /// Acquire a session for one refresh cycle.
    fn open_session(&self) -> SourceResult<Box<dyn SourceSession + '_>>;
}

/// Read access to the source catalog for the duration of one cycle.
///
/// Every listing is paginated. Returned entities carry no parent; the
/// reconciler fills that in from the target side.
pub trait SourceSession {
    /// List the databases hosted by the source.
    fn list_databases(&mut self, page: PageRequest) -> SourceResult<Page<CatalogEntity>>;

    /// List the schemas of a database.
    fn list_schemas(
        &mut self,
        database: &CatalogEntity,
        page: PageRequest,
    ) -> SourceResult<Page<CatalogEntity>>;

    /// List the tables of a schema.
    fn list_tables(
        &mut self,
        schema: &CatalogEntity,
        page: PageRequest,
    ) -> SourceResult<Page<CatalogEntity>>;

    /// List the views of a schema.
    fn list_views(
        &mut self,
        schema: &CatalogEntity,
        page: PageRequest,
    ) -> SourceResult<Page<CatalogEntity>>;

    /// List the columns of a table or view.
    fn list_columns(
        &mut self,
        table: &CatalogEntity,
        page: PageRequest,
    ) -> SourceResult<Page<CatalogEntity>>;

    /// List the foreign keys declared on a table.
    fn list_foreign_key_links(
        &mut self,
        table: &CatalogEntity,
        page: PageRequest,
    ) -> SourceResult<Page<ForeignKeyLink>>;
}
