//! Foreign-key resolution into relationship edges.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::report::RelationshipStats;
use crate::catalog::{ForeignKeyLink, ForeignKeyProperties, TargetId};
use crate::classify::{ErrorClassifier, Failure, Operation, SyncError};
use crate::page::read_all;
use crate::target::TargetCatalogStore;

/// Turns foreign-key links into edges between target column records.
///
/// Each side of a link is looked up by qualified name and may resolve to
/// several columns. Every imported candidate is linked to every exported
/// candidate; a side without candidates skips the link.
pub struct RelationshipResolver<'a, T: TargetCatalogStore + ?Sized> {
    target: &'a T,
    classifier: &'a ErrorClassifier,
    page_size: usize,
    properties: &'a ForeignKeyProperties,
}

impl<'a, T: TargetCatalogStore + ?Sized> RelationshipResolver<'a, T> {
    /// Create a resolver writing edges with `properties` to `target`.
    pub fn new(
        target: &'a T,
        classifier: &'a ErrorClassifier,
        page_size: usize,
        properties: &'a ForeignKeyProperties,
    ) -> Self {
        Self {
            target,
            classifier,
            page_size,
            properties,
        }
    }

    /// All column records carrying a qualified name.
    pub fn candidates(&self, qualified_name: &str) -> Result<BTreeSet<TargetId>, SyncError> {
        read_all(self.page_size, |page| {
            self.target.find_columns_by_qualified_name(qualified_name, page)
        })
        .map(|ids| ids.into_iter().collect())
        .map_err(|err| {
            self.classifier
                .classify(Operation::FindColumns, Failure::Target(err))
        })
    }

    /// Column pairs a link resolves to: the cross product of both sides.
    pub fn edges_for(&self, link: &ForeignKeyLink) -> Result<Vec<(TargetId, TargetId)>, SyncError> {
        let imported = self.candidates(&link.imported_qualified_name)?;
        if imported.is_empty() {
            return Ok(Vec::new());
        }
        let exported = self.candidates(&link.exported_qualified_name)?;

        let mut edges = Vec::with_capacity(imported.len() * exported.len());
        for from in &imported {
            for to in &exported {
                edges.push((from.clone(), to.clone()));
            }
        }
        Ok(edges)
    }

    /// Create the edges for every link, skipping edges that already exist.
    ///
    /// Failures are audited and counted; they never stop the remaining
    /// links from being resolved.
    pub fn resolve(&self, links: &[ForeignKeyLink]) -> RelationshipStats {
        let mut stats = RelationshipStats::default();

        for link in links {
            stats.links += 1;
            let edges = match self.edges_for(link) {
                Ok(edges) => edges,
                Err(err) => {
                    warn!(
                        imported = %link.imported_qualified_name,
                        exported = %link.exported_qualified_name,
                        error = %err,
                        "Failed to resolve foreign key"
                    );
                    stats.errors += 1;
                    continue;
                }
            };

            if edges.is_empty() {
                debug!(
                    imported = %link.imported_qualified_name,
                    exported = %link.exported_qualified_name,
                    "Foreign key does not resolve to target columns"
                );
                stats.unresolved += 1;
                continue;
            }

            let properties = self.properties.for_link(link);
            for (from, to) in &edges {
                match self.link(from, to, &properties) {
                    Ok(true) => stats.created += 1,
                    Ok(false) => stats.existing += 1,
                    Err(err) => {
                        warn!(
                            from = %from,
                            to = %to,
                            error = %err,
                            "Failed to create relationship"
                        );
                        stats.errors += 1;
                    }
                }
            }
        }

        stats
    }

    /// Create one edge unless it exists. Returns whether it was created.
    fn link(
        &self,
        from: &TargetId,
        to: &TargetId,
        properties: &ForeignKeyProperties,
    ) -> Result<bool, SyncError> {
        let exists = self.target.relationship_exists(from, to).map_err(|err| {
            self.classifier
                .classify(Operation::CheckRelationship, Failure::Target(err))
        })?;
        if exists {
            return Ok(false);
        }

        self.target
            .create_relationship(from, to, properties)
            .map_err(|err| {
                self.classifier
                    .classify(Operation::CreateRelationship, Failure::Target(err))
            })?;
        Ok(true)
    }
}
