//! Create/update/delete reconciliation of one scope of one level.

use tracing::{debug, warn};

use super::matcher::{plan_level, LevelAction};
use super::report::LevelStats;
use crate::catalog::{CatalogEntity, Level, TargetId};
use crate::classify::{ErrorClassifier, Failure, Operation, SyncError};
use crate::error::CollaboratorError;
use crate::page::{read_listing, TargetListing};
use crate::target::TargetCatalogStore;

/// Result of reconciling one scope.
#[derive(Debug, Default)]
pub struct LevelOutcome {
    /// Source entities that now have a target record, paired with its
    /// identity, in source order. Children are reconciled beneath these.
    pub reconciled: Vec<(CatalogEntity, TargetId)>,
    /// Counters for the scope.
    pub stats: LevelStats,
}

/// Applies the create/update/delete algorithm to one parent and level.
pub struct LevelReconciler<'a, T: TargetCatalogStore + ?Sized> {
    target: &'a T,
    classifier: &'a ErrorClassifier,
    page_size: usize,
}

impl<'a, T: TargetCatalogStore + ?Sized> LevelReconciler<'a, T> {
    /// Create a reconciler writing to `target`.
    pub fn new(target: &'a T, classifier: &'a ErrorClassifier, page_size: usize) -> Self {
        Self {
            target,
            classifier,
            page_size,
        }
    }

    /// Read every page of a target scope.
    pub fn read_target(
        &self,
        level: Level,
        parent: Option<&TargetId>,
    ) -> Result<TargetListing, SyncError> {
        read_listing(self.page_size, |page| self.target.list(level, parent, page))
            .map_err(|err| {
                self.classifier
                    .classify(Operation::ListTarget(level), Failure::Target(err))
            })
    }

    /// Reconcile the target scope of `level` under `parent` against the
    /// complete source listing for that scope.
    ///
    /// Fails only when the target scope cannot be listed. A failed write is
    /// audited and counted, and the remaining entities are still processed.
    pub fn reconcile(
        &self,
        level: Level,
        parent: Option<&TargetId>,
        source: Vec<CatalogEntity>,
    ) -> Result<LevelOutcome, SyncError> {
        let listing = self.read_target(level, parent)?;

        let source: Vec<CatalogEntity> = source
            .into_iter()
            .map(|mut entity| {
                entity.parent = parent.cloned();
                entity
            })
            .collect();

        let plan = plan_level(&source, &listing);
        debug!(
            level = %level,
            parent = ?parent.map(TargetId::as_str),
            never_listed = listing.is_never_listed(),
            creates = plan.creates(),
            updates = plan.updates(),
            deletes = plan.deletes(),
            unchanged = plan.unchanged(),
            "Planned level"
        );

        let mut outcome = LevelOutcome::default();
        for action in plan {
            match action {
                LevelAction::Create(entity) => match self.target.create(entity) {
                    Ok(target_id) => {
                        outcome.stats.created += 1;
                        outcome.reconciled.push((entity.clone(), target_id));
                    }
                    Err(err) => {
                        self.absorb(Operation::Create(level), err, &entity.qualified_name);
                        outcome.stats.errors += 1;
                    }
                },
                LevelAction::Update(entity, record) => {
                    debug!(
                        level = %level,
                        qualified_name = %entity.qualified_name,
                        changed = ?record.attributes.changed_fields(&entity.attributes),
                        "Updating record"
                    );
                    match self.target.update(&record.target_id, entity) {
                        Ok(()) => outcome.stats.updated += 1,
                        Err(err) => {
                            self.absorb(Operation::Update(level), err, &entity.qualified_name);
                            outcome.stats.errors += 1;
                        }
                    }
                    // Children are reconciled even when the update failed.
                    outcome
                        .reconciled
                        .push((entity.clone(), record.target_id.clone()));
                }
                LevelAction::Keep(entity, record) => {
                    outcome.stats.unchanged += 1;
                    outcome
                        .reconciled
                        .push((entity.clone(), record.target_id.clone()));
                }
                LevelAction::Delete(record) => {
                    match self
                        .target
                        .delete(level, &record.target_id, &record.qualified_name)
                    {
                        Ok(()) => outcome.stats.deleted += 1,
                        Err(err) => {
                            self.absorb(Operation::Delete(level), err, &record.qualified_name);
                            outcome.stats.errors += 1;
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }

    fn absorb(&self, operation: Operation, err: CollaboratorError, qualified_name: &str) {
        let err = self.classifier.classify(operation, Failure::Target(err));
        warn!(
            qualified_name = %qualified_name,
            category = %err.category(),
            error = %err,
            "Write failed, continuing with next entity"
        );
    }
}
