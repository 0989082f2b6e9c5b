//! Integration tests for full refresh cycles against the in-memory
//! collaborators.

use std::sync::Arc;

use metasync_core::target::FailPoint;
use metasync_core::{
    Attributes, AuditCode, CatalogEntity, CyclePhase, ErrorCategory, ForeignKeyLink, Level,
    MemoryAuditLogger, MemorySource, MemoryTargetStore, ReconciliationOrchestrator, SyncConfig,
    WriteOp,
};

struct TestContext {
    source: MemorySource,
    store: MemoryTargetStore,
    audit: MemoryAuditLogger,
    orchestrator: ReconciliationOrchestrator<MemorySource, MemoryTargetStore>,
}

impl TestContext {
    fn new(source: MemorySource) -> Self {
        Self::with_config(source, SyncConfig::default())
    }

    fn with_config(source: MemorySource, config: SyncConfig) -> Self {
        let store = MemoryTargetStore::new();
        let audit = MemoryAuditLogger::new();
        let orchestrator =
            ReconciliationOrchestrator::new(source.clone(), store.clone(), Arc::new(audit.clone()))
                .with_config(config);
        Self {
            source,
            store,
            audit,
            orchestrator,
        }
    }

    /// Run a cycle and return the writes it performed.
    fn cycle(&self) -> Vec<WriteOp> {
        self.store.clear_journal();
        self.orchestrator.refresh().unwrap();
        self.store.journal()
    }
}

fn column(table: &str, name: &str, data_type: &str) -> CatalogEntity {
    CatalogEntity::column(format!("{}.{}", table, name), name)
        .with_attributes(Attributes::new().with_data_type(data_type))
}

/// sales
///   public: orders(id, customer_id), customers(id, name), view recent_orders(id)
///   archive: old_orders(id)
fn sales_source() -> MemorySource {
    MemorySource::new()
        .with_database(CatalogEntity::database("sales", "sales"))
        .with_schema("sales", CatalogEntity::schema("sales.public", "public"))
        .with_schema("sales", CatalogEntity::schema("sales.archive", "archive"))
        .with_table("sales.public", CatalogEntity::table("sales.public.orders", "orders"))
        .with_table(
            "sales.public",
            CatalogEntity::table("sales.public.customers", "customers"),
        )
        .with_view(
            "sales.public",
            CatalogEntity::view("sales.public.recent_orders", "recent_orders"),
        )
        .with_table(
            "sales.archive",
            CatalogEntity::table("sales.archive.old_orders", "old_orders"),
        )
        .with_column("sales.public.orders", column("sales.public.orders", "id", "integer"))
        .with_column(
            "sales.public.orders",
            column("sales.public.orders", "customer_id", "integer"),
        )
        .with_column(
            "sales.public.customers",
            column("sales.public.customers", "id", "integer"),
        )
        .with_column(
            "sales.public.customers",
            column("sales.public.customers", "name", "text"),
        )
        .with_column(
            "sales.public.recent_orders",
            column("sales.public.recent_orders", "id", "integer"),
        )
        .with_column(
            "sales.archive.old_orders",
            column("sales.archive.old_orders", "id", "integer"),
        )
        .with_foreign_key(
            "sales.public.orders",
            ForeignKeyLink::new("sales.public.orders.customer_id", "sales.public.customers.id")
                .with_constraint_name("orders_customer_fk"),
        )
}

#[test]
fn test_first_sync_creates_full_hierarchy() {
    let ctx = TestContext::new(sales_source());
    let writes = ctx.cycle();

    let creates: Vec<&WriteOp> = writes.iter().filter(|w| w.is_create()).collect();
    assert_eq!(creates.len(), 13);
    assert!(writes.iter().all(|w| w.is_create() || w.level().is_none()));
    assert!(!writes.iter().any(|w| w.is_update() || w.is_delete()));

    // Database first, then descent.
    assert_eq!(writes[0].level(), Some(Level::Database));
    assert_eq!(writes[0].qualified_name(), Some("sales"));
    assert_eq!(writes[1].level(), Some(Level::Schema));

    assert_eq!(ctx.store.records(Level::Database).len(), 1);
    assert_eq!(ctx.store.records(Level::Schema).len(), 2);
    assert_eq!(ctx.store.records(Level::Table).len(), 3);
    assert_eq!(ctx.store.records(Level::View).len(), 1);
    assert_eq!(ctx.store.records(Level::Column).len(), 6);
    assert_eq!(ctx.store.relationships().len(), 1);
    assert!(ctx.audit.is_empty());
}

#[test]
fn test_created_records_hang_under_their_parent() {
    let ctx = TestContext::new(sales_source());
    ctx.cycle();

    let db = ctx.store.find(Level::Database, "sales").unwrap();
    let schema = ctx.store.find(Level::Schema, "sales.public").unwrap();
    let table = ctx.store.find(Level::Table, "sales.public.orders").unwrap();
    let column = ctx.store.find(Level::Column, "sales.public.orders.id").unwrap();

    assert_eq!(ctx.store.parent_of(&db.target_id), None);
    assert_eq!(ctx.store.parent_of(&schema.target_id), Some(db.target_id));
    assert_eq!(ctx.store.parent_of(&table.target_id), Some(schema.target_id));
    assert_eq!(ctx.store.parent_of(&column.target_id), Some(table.target_id));
}

#[test]
fn test_unchanged_source_produces_no_writes() {
    let ctx = TestContext::new(sales_source());
    ctx.cycle();

    let writes = ctx.cycle();
    assert!(writes.is_empty(), "unexpected writes: {:?}", writes);

    let report = ctx.orchestrator.refresh().unwrap();
    assert_eq!(report.writes(), 0);
    assert_eq!(report.totals().unchanged, 13);
    assert_eq!(report.relationships.existing, 1);
    assert!(report.is_clean());
}

#[test]
fn test_removed_schema_is_deleted_once() {
    let ctx = TestContext::new(sales_source());
    ctx.cycle();

    ctx.source.remove(Level::Schema, "sales.archive");
    let writes = ctx.cycle();

    assert_eq!(writes.len(), 1);
    assert!(writes[0].is_delete());
    assert_eq!(writes[0].level(), Some(Level::Schema));
    assert_eq!(writes[0].qualified_name(), Some("sales.archive"));

    assert!(ctx.store.find(Level::Schema, "sales.public").is_some());
    assert!(ctx.store.find(Level::Table, "sales.archive.old_orders").is_none());
    assert_eq!(ctx.store.records(Level::Table).len(), 2);
}

#[test]
fn test_single_attribute_change_is_one_update() {
    let ctx = TestContext::new(sales_source());
    ctx.cycle();

    ctx.source.set_attributes(
        Level::Column,
        "sales.public.customers.name",
        Attributes::new().with_data_type("varchar").with_max_length(200),
    );
    let writes = ctx.cycle();

    assert_eq!(writes.len(), 1);
    assert!(writes[0].is_update());
    assert_eq!(writes[0].qualified_name(), Some("sales.public.customers.name"));

    let record = ctx
        .store
        .find(Level::Column, "sales.public.customers.name")
        .unwrap();
    assert_eq!(record.attributes.data_type.as_deref(), Some("varchar"));
    assert_eq!(record.attributes.max_length, Some(200));
}

#[test]
fn test_new_table_is_created_with_columns() {
    let ctx = TestContext::new(sales_source());
    ctx.cycle();

    ctx.source.add(
        "sales.public",
        CatalogEntity::table("sales.public.invoices", "invoices"),
    );
    ctx.source.add(
        "sales.public.invoices",
        column("sales.public.invoices", "id", "integer"),
    );
    let writes = ctx.cycle();

    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(WriteOp::is_create));
    assert_eq!(writes[0].level(), Some(Level::Table));
    assert_eq!(writes[1].level(), Some(Level::Column));
}

#[test]
fn test_foreign_key_cross_product() {
    let source = MemorySource::new()
        .with_database(CatalogEntity::database("d", "d"))
        .with_schema("d", CatalogEntity::schema("d.s", "s"));
    // Two tables carry a column named "d.s.fk", three carry "d.s.pk".
    for (table, qualified_name) in [
        ("a1", "d.s.fk"),
        ("a2", "d.s.fk"),
        ("b1", "d.s.pk"),
        ("b2", "d.s.pk"),
        ("b3", "d.s.pk"),
    ] {
        let table_qn = format!("d.s.{}", table);
        source.add("d.s", CatalogEntity::table(&table_qn, table));
        source.add(&table_qn, CatalogEntity::column(qualified_name, "key"));
    }
    source.add_foreign_key("d.s.a1", ForeignKeyLink::new("d.s.fk", "d.s.pk"));

    let ctx = TestContext::new(source);
    let report = ctx.orchestrator.refresh().unwrap();

    assert_eq!(report.relationships.links, 1);
    assert_eq!(report.relationships.created, 6);
    assert_eq!(ctx.store.relationships().len(), 6);
}

#[test]
fn test_foreign_key_into_later_schema() {
    // Schema `a` is visited before `b`, which holds the referenced column.
    let source = MemorySource::new()
        .with_database(CatalogEntity::database("sales", "sales"))
        .with_schema("sales", CatalogEntity::schema("sales.a", "a"))
        .with_schema("sales", CatalogEntity::schema("sales.b", "b"))
        .with_table("sales.a", CatalogEntity::table("sales.a.orders", "orders"))
        .with_table("sales.b", CatalogEntity::table("sales.b.customers", "customers"))
        .with_column("sales.a.orders", column("sales.a.orders", "cust", "integer"))
        .with_column("sales.b.customers", column("sales.b.customers", "id", "integer"))
        .with_foreign_key(
            "sales.a.orders",
            ForeignKeyLink::new("sales.a.orders.cust", "sales.b.customers.id"),
        );
    let ctx = TestContext::new(source);

    let first = ctx.cycle();
    assert_eq!(first.iter().filter(|w| w.is_create()).count(), 7);
    assert_eq!(ctx.store.relationships().len(), 1);

    let second = ctx.cycle();
    assert!(second.is_empty(), "unexpected writes: {:?}", second);
}

#[test]
fn test_unresolvable_foreign_key_is_skipped() {
    let source = sales_source().with_foreign_key(
        "sales.public.orders",
        ForeignKeyLink::new("sales.public.orders.id", "elsewhere.public.t.id"),
    );
    let ctx = TestContext::new(source);
    let report = ctx.orchestrator.refresh().unwrap();

    assert_eq!(report.relationships.unresolved, 1);
    assert_eq!(report.relationships.created, 1);
    assert!(report.is_clean());
    assert!(ctx.audit.is_empty());
}

#[test]
fn test_source_read_failure_only_aborts_its_scope() {
    let source = sales_source();
    source.fail_listing(Level::Table, "sales.public");
    let ctx = TestContext::new(source);

    let report = ctx.orchestrator.refresh().unwrap();

    assert_eq!(report.phase, CyclePhase::Done);
    assert_eq!(report.errors, 1);
    assert_eq!(ctx.audit.codes(), vec![AuditCode::ErrorReadingTables]);

    // The sibling schema and the failing schema's views are still mirrored.
    assert!(ctx.store.find(Level::Table, "sales.archive.old_orders").is_some());
    assert!(ctx.store.find(Level::View, "sales.public.recent_orders").is_some());
    assert!(ctx.store.find(Level::Table, "sales.public.orders").is_none());
    assert!(ctx.store.relationships().is_empty());
}

#[test]
fn test_source_read_failure_does_not_delete() {
    let ctx = TestContext::new(sales_source());
    ctx.cycle();

    ctx.source.fail_listing(Level::Column, "sales.public.orders");
    let writes = ctx.cycle();

    assert!(writes.is_empty());
    assert_eq!(ctx.audit.codes(), vec![AuditCode::ErrorReadingColumns]);
}

#[test]
fn test_target_write_failure_continues_with_siblings() {
    let ctx = TestContext::new(sales_source());
    ctx.store.fail(FailPoint::Create("sales.public.orders".into()));

    let report = ctx.orchestrator.refresh().unwrap();

    assert_eq!(report.level(Level::Table).errors, 1);
    assert_eq!(report.level(Level::Table).created, 2);
    assert!(ctx.store.find(Level::Table, "sales.public.customers").is_some());
    assert!(ctx.store.find(Level::Column, "sales.public.orders.id").is_none());
    assert_eq!(ctx.audit.codes(), vec![AuditCode::RepositoryFailure]);

    // The next cycle picks the table up once the store recovers.
    ctx.store.clear_failures();
    let writes = ctx.cycle();
    assert_eq!(writes.iter().filter(|w| w.is_create()).count(), 3);
    assert_eq!(ctx.store.relationships().len(), 1);
}

#[test]
fn test_delete_failure_is_audited_and_retried() {
    let ctx = TestContext::new(sales_source());
    ctx.cycle();

    ctx.source.remove(Level::Table, "sales.archive.old_orders");
    ctx.store.deny(FailPoint::Delete("sales.archive.old_orders".into()));
    let report = ctx.orchestrator.refresh().unwrap();

    assert_eq!(report.level(Level::Table).errors, 1);
    assert_eq!(ctx.audit.codes(), vec![AuditCode::NotAuthorized]);
    assert!(ctx.store.find(Level::Table, "sales.archive.old_orders").is_some());

    ctx.store.clear_failures();
    let writes = ctx.cycle();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].is_delete());
}

#[test]
fn test_database_read_failure_fails_cycle() {
    let source = sales_source();
    source.fail_listing(Level::Database, "");
    let ctx = TestContext::new(source);

    let err = ctx.orchestrator.refresh().unwrap_err();

    assert_eq!(err.category(), ErrorCategory::SourceRead);
    assert_eq!(err.code(), AuditCode::ErrorReadingDatabases);
    assert_eq!(ctx.audit.len(), 1);
    assert_eq!(ctx.store.write_count(), 0);
    assert_eq!(ctx.source.sessions_released(), 1);
    assert!(!ctx.orchestrator.is_running());
}

#[test]
fn test_database_listing_failure_fails_cycle() {
    let ctx = TestContext::new(sales_source());
    ctx.store.fail(FailPoint::List(Level::Database));

    let err = ctx.orchestrator.refresh().unwrap_err();

    assert_eq!(err.category(), ErrorCategory::TargetWrite);
    assert_eq!(ctx.audit.codes(), vec![AuditCode::RepositoryFailure]);
}

#[test]
fn test_lower_listing_failure_is_absorbed() {
    let ctx = TestContext::new(sales_source());
    ctx.cycle();

    ctx.store.fail(FailPoint::List(Level::Column));
    let report = ctx.orchestrator.refresh().unwrap();

    // One failure per table or view whose columns could not be listed.
    assert_eq!(report.errors, 4);
    assert_eq!(ctx.audit.len(), 4);
    assert_eq!(report.writes(), 0);
}

#[test]
fn test_pagination_reads_every_page() {
    let source = MemorySource::new()
        .with_database(CatalogEntity::database("big", "big"))
        .with_schema("big", CatalogEntity::schema("big.s", "s"))
        .with_table("big.s", CatalogEntity::table("big.s.t", "t"));
    for i in 0..25 {
        source.add("big.s.t", CatalogEntity::column(format!("big.s.t.c{}", i), format!("c{}", i)));
    }

    let ctx = TestContext::with_config(source, SyncConfig::new().with_page_size(4));
    let first = ctx.cycle();
    assert_eq!(first.iter().filter(|w| w.level() == Some(Level::Column)).count(), 25);

    // A listing cut short after the first page would delete and recreate.
    let second = ctx.cycle();
    assert!(second.is_empty());
}

#[test]
fn test_views_can_be_excluded() {
    let ctx = TestContext::with_config(sales_source(), SyncConfig::new().with_views(false));
    ctx.cycle();

    assert!(ctx.store.records(Level::View).is_empty());
    assert_eq!(ctx.store.records(Level::Column).len(), 5);
}

#[test]
fn test_foreign_keys_can_be_disabled() {
    let ctx = TestContext::with_config(sales_source(), SyncConfig::new().with_foreign_keys(false));
    let report = ctx.orchestrator.refresh().unwrap();

    assert_eq!(report.relationships.links, 0);
    assert!(ctx.store.relationships().is_empty());
}

#[test]
fn test_lost_listings_recreate_without_deleting() {
    let ctx = TestContext::new(sales_source());
    ctx.cycle();

    ctx.store.forget_listings();
    let writes = ctx.cycle();

    assert!(!writes.iter().any(WriteOp::is_delete));
    assert_eq!(writes.iter().filter(|w| w.is_create()).count(), 13);
}

#[test]
fn test_one_session_per_cycle() {
    let ctx = TestContext::new(sales_source());
    ctx.cycle();
    ctx.cycle();

    assert_eq!(ctx.source.sessions_opened(), 2);
    assert_eq!(ctx.source.sessions_released(), 2);
}

#[test]
fn test_audit_entries_carry_cycle_id() {
    let source = sales_source();
    source.fail_listing(Level::Schema, "sales");
    let ctx = TestContext::new(source);

    let report = ctx.orchestrator.refresh().unwrap();
    let events = ctx.audit.events();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].cycle_id, report.cycle_id);
    assert_eq!(events[0].code, AuditCode::ErrorReadingSchemas);
    assert!(events[0].cause.is_some());
}
