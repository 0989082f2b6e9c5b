//! Top-down refresh cycles.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use super::level::LevelReconciler;
use super::relationship::RelationshipResolver;
use super::report::{CyclePhase, CycleReport};
use crate::audit::{AuditCode, AuditEvent, AuditLogger};
use crate::catalog::{CatalogEntity, ForeignKeyLink, Level, TargetId};
use crate::classify::{ErrorClassifier, Failure, Operation, SyncError};
use crate::config::SyncConfig;
use crate::error::CollaboratorError;
use crate::page::read_all;
use crate::source::{SourceCatalog, SourceSession};
use crate::target::TargetCatalogStore;

/// Counter for generating unique cycle IDs.
static CYCLE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_cycle_id() -> String {
    let ts = chrono::Utc::now().timestamp_micros() as u64;
    let counter = CYCLE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("cycle-{:x}-{}", ts, counter)
}

/// Clears the in-progress flag when a cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives refresh cycles from the source catalog into the target store.
///
/// A cycle walks databases, then the schemas of each database, then the
/// tables and views of each schema and the columns of each of those. Once
/// every schema is reconciled, the foreign keys of each schema are resolved,
/// so links into schemas visited later still find their columns. Nothing is
/// kept between cycles; the target store's listings are the only record of
/// what was synchronised before.
pub struct ReconciliationOrchestrator<S, T> {
    source: S,
    target: T,
    audit: Arc<dyn AuditLogger>,
    config: SyncConfig,
    running: AtomicBool,
}

impl<S: SourceCatalog, T: TargetCatalogStore> ReconciliationOrchestrator<S, T> {
    /// Create an orchestrator with default configuration.
    pub fn new(source: S, target: T, audit: Arc<dyn AuditLogger>) -> Self {
        Self {
            source,
            target,
            audit,
            config: SyncConfig::default(),
            running: AtomicBool::new(false),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The source catalog.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The target store.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Whether a cycle is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one refresh cycle to completion.
    ///
    /// Failures below the database level are audited, counted in the report
    /// and do not stop the cycle. A failure to read or reconcile databases
    /// ends the cycle and is returned. A call made while another cycle is
    /// running fails immediately without touching either collaborator.
    #[instrument(skip(self))]
    pub fn refresh(&self) -> Result<CycleReport, SyncError> {
        let cycle_id = generate_cycle_id();

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let err = SyncError::cycle_in_progress();
            self.audit.log(AuditEvent::new(
                cycle_id,
                AuditCode::CycleInProgress,
                Operation::Refresh.to_string(),
                None,
            ));
            warn!("Refresh requested while a cycle is running");
            return Err(err);
        }
        let _guard = RunningGuard(&self.running);

        let start = Instant::now();
        let classifier = ErrorClassifier::new(self.audit.clone(), cycle_id.clone());
        let mut report = CycleReport::new(cycle_id.clone());
        info!(cycle = %cycle_id, "Refresh cycle started");

        let session = match self.source.open_session() {
            Ok(session) => session,
            Err(err) => {
                let err = classifier
                    .classify(Operation::ReadSource(Level::Database), Failure::Source(err));
                self.flush_audit(&cycle_id);
                return Err(err);
            }
        };

        let mut cycle = Cycle {
            session,
            target: &self.target,
            classifier: &classifier,
            config: &self.config,
            report: &mut report,
            foreign_key_scopes: Vec::new(),
        };
        let result = cycle.run();
        // Releases the source session.
        drop(cycle);

        self.flush_audit(&cycle_id);

        report.duration = start.elapsed();
        if let Err(err) = result {
            warn!(
                cycle = %cycle_id,
                phase = %report.phase,
                error = %err,
                duration_ms = report.duration.as_millis() as u64,
                "Refresh cycle failed"
            );
            return Err(err);
        }

        let totals = report.totals();
        info!(
            cycle = %cycle_id,
            created = totals.created,
            updated = totals.updated,
            deleted = totals.deleted,
            unchanged = totals.unchanged,
            relationships_created = report.relationships.created,
            errors = report.error_count(),
            duration_ms = report.duration.as_millis() as u64,
            "Refresh cycle completed"
        );
        Ok(report)
    }

    fn flush_audit(&self, cycle_id: &str) {
        if let Err(e) = self.audit.flush() {
            warn!(cycle = %cycle_id, error = %e, "Failed to flush audit log");
        }
    }
}

/// State of one running cycle.
struct Cycle<'a, T: ?Sized> {
    session: Box<dyn SourceSession + 'a>,
    target: &'a T,
    classifier: &'a ErrorClassifier,
    config: &'a SyncConfig,
    report: &'a mut CycleReport,
    /// Schemas whose tables were read, with those tables. Foreign keys are
    /// resolved once every schema has its columns in the target.
    foreign_key_scopes: Vec<(CatalogEntity, Vec<CatalogEntity>)>,
}

impl<'a, T: TargetCatalogStore + ?Sized> Cycle<'a, T> {
    fn levels(&self) -> LevelReconciler<'a, T> {
        LevelReconciler::new(self.target, self.classifier, self.config.page_size)
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!(phase = %phase, "Entering phase");
        self.report.phase = phase;
    }

    fn run(&mut self) -> Result<(), SyncError> {
        self.enter(CyclePhase::ReadDatabases);
        let databases = self.read_source(Level::Database, None)?;

        self.enter(CyclePhase::ReconcileDatabases);
        let outcome = self.levels().reconcile(Level::Database, None, databases)?;
        self.report.record(Level::Database, outcome.stats);

        for (database, target_id) in &outcome.reconciled {
            if let Err(err) = self.reconcile_schemas(database, target_id) {
                self.absorb(Operation::ReadSource(Level::Schema), err, database);
            }
        }

        let scopes = std::mem::take(&mut self.foreign_key_scopes);
        if !scopes.is_empty() {
            self.enter(CyclePhase::ResolveForeignKeys);
        }
        for (schema, tables) in &scopes {
            debug!(
                schema = %schema.qualified_name,
                tables = tables.len(),
                "Resolving foreign keys"
            );
            self.resolve_foreign_keys(tables);
        }

        self.enter(CyclePhase::Done);
        Ok(())
    }

    fn reconcile_schemas(
        &mut self,
        database: &CatalogEntity,
        database_id: &TargetId,
    ) -> Result<(), SyncError> {
        self.enter(CyclePhase::ReconcileSchemas);
        let schemas = self.read_source(Level::Schema, Some(database))?;
        let outcome = self
            .levels()
            .reconcile(Level::Schema, Some(database_id), schemas)?;
        self.report.record(Level::Schema, outcome.stats);

        for (schema, target_id) in &outcome.reconciled {
            self.reconcile_schema_contents(schema, target_id);
        }
        Ok(())
    }

    /// Tables and views of one schema with their columns. The schema is
    /// queued for foreign-key resolution when its tables were read.
    fn reconcile_schema_contents(&mut self, schema: &CatalogEntity, schema_id: &TargetId) {
        self.enter(CyclePhase::ReconcileTablesAndViews);

        let tables = match self.reconcile_children(Level::Table, schema, schema_id) {
            Ok(tables) => Some(tables),
            Err(err) => {
                self.absorb(Operation::ReadSource(Level::Table), err, schema);
                None
            }
        };

        if self.config.include_views {
            if let Err(err) = self.reconcile_children(Level::View, schema, schema_id) {
                self.absorb(Operation::ReadSource(Level::View), err, schema);
            }
        }

        if let (true, Some(tables)) = (self.config.resolve_foreign_keys, tables) {
            self.foreign_key_scopes.push((schema.clone(), tables));
        }
    }

    /// Reconcile the tables or views of a schema and the columns of each.
    /// Returns the source entities read.
    fn reconcile_children(
        &mut self,
        level: Level,
        schema: &CatalogEntity,
        schema_id: &TargetId,
    ) -> Result<Vec<CatalogEntity>, SyncError> {
        let entities = self.read_source(level, Some(schema))?;
        let outcome = self
            .levels()
            .reconcile(level, Some(schema_id), entities.clone())?;
        self.report.record(level, outcome.stats);

        for (table, target_id) in &outcome.reconciled {
            if let Err(err) = self.reconcile_columns(table, target_id) {
                self.absorb(Operation::ReadSource(Level::Column), err, table);
            }
        }
        Ok(entities)
    }

    fn reconcile_columns(
        &mut self,
        table: &CatalogEntity,
        table_id: &TargetId,
    ) -> Result<(), SyncError> {
        self.enter(CyclePhase::ReconcileColumns);
        let columns = self.read_source(Level::Column, Some(table))?;
        let outcome = self
            .levels()
            .reconcile(Level::Column, Some(table_id), columns)?;
        self.report.record(Level::Column, outcome.stats);
        Ok(())
    }

    fn resolve_foreign_keys(&mut self, tables: &[CatalogEntity]) {
        let mut links: Vec<ForeignKeyLink> = Vec::new();
        for table in tables {
            let page_size = self.config.page_size;
            let session = &mut self.session;
            match read_all(page_size, |page| session.list_foreign_key_links(table, page)) {
                Ok(table_links) => links.extend(table_links),
                Err(err) => {
                    let err = self
                        .classifier
                        .classify(Operation::ReadForeignKeys, Failure::Source(err));
                    self.absorb(Operation::ReadForeignKeys, err, table);
                }
            }
        }

        let resolver = RelationshipResolver::new(
            self.target,
            self.classifier,
            self.config.page_size,
            &self.config.foreign_key_properties,
        );
        self.report.relationships += resolver.resolve(&links);
    }

    /// Read the complete source listing of `level` under `parent`.
    fn read_source(
        &mut self,
        level: Level,
        parent: Option<&CatalogEntity>,
    ) -> Result<Vec<CatalogEntity>, SyncError> {
        let session = &mut self.session;
        let result = read_all(self.config.page_size, |page| match (level, parent) {
            (Level::Database, _) => session.list_databases(page),
            (Level::Schema, Some(database)) => session.list_schemas(database, page),
            (Level::Table, Some(schema)) => session.list_tables(schema, page),
            (Level::View, Some(schema)) => session.list_views(schema, page),
            (Level::Column, Some(table)) => session.list_columns(table, page),
            (level, None) => Err(CollaboratorError::invalid_parameter(
                "parent",
                format!("listing {} requires a parent", level),
            )),
        });

        result.map_err(|err| {
            self.classifier
                .classify(Operation::ReadSource(level), Failure::Source(err))
        })
    }

    /// Record a failure that aborted one scope and move on to its siblings.
    ///
    /// The error was audited where it was classified, so it is wrapped as
    /// already handled.
    fn absorb(&mut self, operation: Operation, err: SyncError, scope: &CatalogEntity) {
        let wrapped = self.classifier.classify(operation, err);
        warn!(
            scope = %scope.qualified_name,
            level = %scope.level,
            category = %wrapped.category(),
            error = %wrapped,
            "Skipping scope after failure"
        );
        self.report.errors += 1;
    }
}
