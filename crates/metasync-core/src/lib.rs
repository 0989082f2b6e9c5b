//! Metasync Core - hierarchical catalog metadata reconciliation.
//!
//! This crate mirrors the structure of a source relational catalog
//! (databases, schemas, tables, views, columns and foreign keys) into a
//! metadata repository, one refresh cycle at a time.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod audit;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod error;
pub mod page;
pub mod reconcile;
pub mod source;
pub mod target;

pub use catalog::{
    Attributes, CatalogEntity, ForeignKeyLink, ForeignKeyProperties, Level, RelationshipEdge,
    TargetId, TargetRecord,
};
pub use classify::{ErrorCategory, ErrorClassifier, Failure, Operation, SyncError};
pub use config::SyncConfig;
pub use error::{CollaboratorError, SnapshotError, StoreError};
pub use page::{
    ListingPage, Page, PageRequest, TargetListing, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use reconcile::{
    CyclePhase, CycleReport, LevelReconciler, LevelStats, Matcher, ReconciliationOrchestrator,
    RelationshipResolver, RelationshipStats,
};
pub use source::{CatalogSnapshot, MemorySource, SnapshotSource, SourceCatalog, SourceSession};
pub use target::{MemoryTargetStore, SledTargetStore, TargetCatalogStore, WriteOp};

// Audit exports
pub use audit::{
    AuditCode, AuditEvent, AuditLogger, AuditSeverity, MemoryAuditLogger, NullAuditLogger,
    TracingAuditLogger,
};
