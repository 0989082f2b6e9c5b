//! Hierarchical reconciliation.
//!
//! The [`ReconciliationOrchestrator`] walks the source hierarchy top-down and
//! uses a [`LevelReconciler`] for every scope and a [`RelationshipResolver`]
//! for every schema's foreign keys.

mod level;
mod matcher;
mod orchestrator;
mod relationship;
mod report;

pub use level::{LevelOutcome, LevelReconciler};
pub use matcher::{plan_level, LevelAction, LevelPlan, Matcher};
pub use orchestrator::ReconciliationOrchestrator;
pub use relationship::RelationshipResolver;
pub use report::{CyclePhase, CycleReport, LevelStats, RelationshipStats};
