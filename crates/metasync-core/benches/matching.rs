//! Level planning and full-cycle benchmarks.
//!
//! Measures qualified-name matching for one scope and a complete refresh
//! cycle against the in-memory collaborators.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use metasync_core::reconcile::plan_level;
use metasync_core::{
    Attributes, CatalogEntity, MemorySource, MemoryTargetStore, NullAuditLogger,
    ReconciliationOrchestrator, TargetId, TargetListing, TargetRecord,
};

fn columns(count: usize) -> Vec<CatalogEntity> {
    (0..count)
        .map(|i| {
            let name = format!("col_{}", i);
            CatalogEntity::column(format!("db.public.orders.{}", name), name)
                .with_attributes(Attributes::new().with_data_type("integer"))
        })
        .collect()
}

fn bench_plan_level(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching/plan_level");

    for size in [10, 100, 1000] {
        let source = columns(size);
        let listing = TargetListing::Listed(
            source
                .iter()
                .rev()
                .enumerate()
                .map(|(i, e)| TargetRecord::from_entity(TargetId::new(format!("c-{}", i)), e))
                .collect(),
        );

        group.bench_with_input(BenchmarkId::new("unchanged", size), &size, |b, _| {
            b.iter(|| black_box(plan_level(&source, &listing).unchanged()));
        });

        group.bench_with_input(BenchmarkId::new("never_listed", size), &size, |b, _| {
            let never = TargetListing::NeverListed;
            b.iter(|| black_box(plan_level(&source, &never).creates()));
        });
    }

    group.finish();
}

fn sample_source(tables: usize, columns_per_table: usize) -> MemorySource {
    let source = MemorySource::new()
        .with_database(CatalogEntity::database("db", "db"))
        .with_schema("db", CatalogEntity::schema("db.public", "public"));

    for t in 0..tables {
        let table_qn = format!("db.public.t{}", t);
        source.add("db.public", CatalogEntity::table(&table_qn, format!("t{}", t)));
        for c in 0..columns_per_table {
            source.add(
                &table_qn,
                CatalogEntity::column(format!("{}.c{}", table_qn, c), format!("c{}", c)),
            );
        }
    }
    source
}

fn bench_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching/refresh");
    group.sample_size(20);

    for tables in [10, 50] {
        group.bench_with_input(BenchmarkId::new("steady_state", tables), &tables, |b, &tables| {
            let orchestrator = ReconciliationOrchestrator::new(
                sample_source(tables, 20),
                MemoryTargetStore::new(),
                Arc::new(NullAuditLogger),
            );
            orchestrator.refresh().unwrap();

            b.iter(|| black_box(orchestrator.refresh().unwrap().writes()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_plan_level, bench_refresh);
criterion_main!(benches);
