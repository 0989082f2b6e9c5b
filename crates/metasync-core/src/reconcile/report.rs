//! Counters produced by a refresh cycle.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::catalog::Level;

/// Step of a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// Listing databases from the source.
    ReadDatabases,
    /// Reconciling database records.
    ReconcileDatabases,
    /// Reconciling the schemas of one database.
    ReconcileSchemas,
    /// Reconciling the tables and views of one schema.
    ReconcileTablesAndViews,
    /// Resolving foreign keys after all schemas were reconciled.
    ResolveForeignKeys,
    /// Reconciling the columns of one table or view.
    ReconcileColumns,
    /// The cycle ran to completion.
    Done,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::ReadDatabases => "read_databases",
            CyclePhase::ReconcileDatabases => "reconcile_databases",
            CyclePhase::ReconcileSchemas => "reconcile_schemas",
            CyclePhase::ReconcileTablesAndViews => "reconcile_tables_and_views",
            CyclePhase::ResolveForeignKeys => "resolve_foreign_keys",
            CyclePhase::ReconcileColumns => "reconcile_columns",
            CyclePhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of reconciling one or more scopes of a level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct LevelStats {
    /// Records created.
    pub created: u64,
    /// Records overwritten because their attributes diverged.
    pub updated: u64,
    /// Records deleted because the source no longer reports them.
    pub deleted: u64,
    /// Matched records left untouched.
    pub unchanged: u64,
    /// Writes that failed and were absorbed.
    pub errors: u64,
}

impl LevelStats {
    /// Number of successful writes.
    pub fn writes(&self) -> u64 {
        self.created + self.updated + self.deleted
    }
}

impl AddAssign for LevelStats {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.unchanged += other.unchanged;
        self.errors += other.errors;
    }
}

/// Outcome of resolving foreign keys into relationship edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RelationshipStats {
    /// Foreign-key links examined.
    pub links: u64,
    /// Edges created.
    pub created: u64,
    /// Edges that already existed.
    pub existing: u64,
    /// Links skipped because one side resolved to no column.
    pub unresolved: u64,
    /// Failures absorbed while resolving.
    pub errors: u64,
}

impl AddAssign for RelationshipStats {
    fn add_assign(&mut self, other: Self) {
        self.links += other.links;
        self.created += other.created;
        self.existing += other.existing;
        self.unresolved += other.unresolved;
        self.errors += other.errors;
    }
}

/// Result of one refresh cycle.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CycleReport {
    /// Identifier shared by the cycle's log lines and audit entries.
    pub cycle_id: String,
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// Last phase entered.
    pub phase: CyclePhase,
    /// Per-level counters.
    pub levels: BTreeMap<Level, LevelStats>,
    /// Relationship counters.
    pub relationships: RelationshipStats,
    /// Level reads and listings that failed and were absorbed.
    pub errors: u64,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl CycleReport {
    /// Start a report for a new cycle.
    pub fn new(cycle_id: impl Into<String>) -> Self {
        Self {
            cycle_id: cycle_id.into(),
            started_at: Utc::now(),
            phase: CyclePhase::ReadDatabases,
            levels: BTreeMap::new(),
            relationships: RelationshipStats::default(),
            errors: 0,
            duration: Duration::ZERO,
        }
    }

    /// Counters of one level.
    pub fn level(&self, level: Level) -> LevelStats {
        self.levels.get(&level).copied().unwrap_or_default()
    }

    /// Add counters for a level.
    pub fn record(&mut self, level: Level, stats: LevelStats) {
        *self.levels.entry(level).or_default() += stats;
    }

    /// Counters summed over every level.
    pub fn totals(&self) -> LevelStats {
        let mut totals = LevelStats::default();
        for stats in self.levels.values() {
            totals += *stats;
        }
        totals
    }

    /// Number of successful writes, relationships included.
    pub fn writes(&self) -> u64 {
        self.totals().writes() + self.relationships.created
    }

    /// Total number of absorbed failures.
    pub fn error_count(&self) -> u64 {
        self.errors + self.totals().errors + self.relationships.errors
    }

    /// Whether the cycle completed without absorbing any failure.
    pub fn is_clean(&self) -> bool {
        self.phase == CyclePhase::Done && self.error_count() == 0
    }
}
