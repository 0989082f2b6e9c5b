//! In-memory target repository.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{check_parent, child_levels, TargetCatalogStore, TargetResult};
use crate::catalog::{
    Attributes, CatalogEntity, ForeignKeyProperties, Level, RelationshipEdge, TargetId,
    TargetRecord,
};
use crate::error::{CollaboratorError, StoreError};
use crate::page::{ListingPage, Page, PageRequest};

/// A write performed against the store, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// A record was created.
    Create {
        level: Level,
        target_id: TargetId,
        qualified_name: String,
    },
    /// A record was overwritten.
    Update {
        level: Level,
        target_id: TargetId,
        qualified_name: String,
    },
    /// A record was deleted (descendants removed with it are not journaled).
    Delete {
        level: Level,
        target_id: TargetId,
        qualified_name: String,
    },
    /// A relationship edge was created.
    Relate { from: TargetId, to: TargetId },
}

impl WriteOp {
    /// Level of the written record (None for relationships).
    pub fn level(&self) -> Option<Level> {
        match self {
            WriteOp::Create { level, .. }
            | WriteOp::Update { level, .. }
            | WriteOp::Delete { level, .. } => Some(*level),
            WriteOp::Relate { .. } => None,
        }
    }

    /// Qualified name of the written record (None for relationships).
    pub fn qualified_name(&self) -> Option<&str> {
        match self {
            WriteOp::Create { qualified_name, .. }
            | WriteOp::Update { qualified_name, .. }
            | WriteOp::Delete { qualified_name, .. } => Some(qualified_name),
            WriteOp::Relate { .. } => None,
        }
    }

    /// Whether this is a create.
    pub fn is_create(&self) -> bool {
        matches!(self, WriteOp::Create { .. })
    }

    /// Whether this is an update.
    pub fn is_update(&self) -> bool {
        matches!(self, WriteOp::Update { .. })
    }

    /// Whether this is a delete.
    pub fn is_delete(&self) -> bool {
        matches!(self, WriteOp::Delete { .. })
    }
}

/// Store operation that should fail when reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// Listing any scope of a level.
    List(Level),
    /// Creating the record with this qualified name.
    Create(String),
    /// Updating the record with this qualified name.
    Update(String),
    /// Deleting the record with this qualified name.
    Delete(String),
    /// Searching columns by this qualified name.
    FindColumns(String),
    /// Creating any relationship.
    Relate,
}

#[derive(Debug, Clone)]
struct Stored {
    level: Level,
    parent: Option<TargetId>,
    record: TargetRecord,
}

type Scope = (Level, Option<TargetId>);

#[derive(Debug, Default)]
struct State {
    records: HashMap<TargetId, Stored>,
    /// Record ids per scope in creation order. A key exists once the scope
    /// has held a record or was explicitly marked listed.
    scopes: HashMap<Scope, Vec<TargetId>>,
    relationships: Vec<RelationshipEdge>,
    journal: Vec<WriteOp>,
    failures: HashMap<FailPoint, bool>,
    next_id: u64,
}

impl State {
    fn check(&self, point: FailPoint) -> TargetResult<()> {
        match self.failures.get(&point) {
            Some(true) => Err(CollaboratorError::NotAuthorized(format!(
                "{:?} denied",
                point
            ))),
            Some(false) => Err(CollaboratorError::Repository(format!(
                "{:?} failed",
                point
            ))),
            None => Ok(()),
        }
    }

    fn insert(&mut self, entity: &CatalogEntity) -> TargetResult<TargetId> {
        check_parent(entity)?;
        if let Some(parent) = &entity.parent {
            if !self.records.contains_key(parent) {
                return Err(StoreError::UnknownParent(parent.clone()).into());
            }
        }

        self.next_id += 1;
        let target_id = TargetId::new(format!("{}-{}", entity.level, self.next_id));
        self.records.insert(
            target_id.clone(),
            Stored {
                level: entity.level,
                parent: entity.parent.clone(),
                record: TargetRecord::from_entity(target_id.clone(), entity),
            },
        );
        self.scopes
            .entry((entity.level, entity.parent.clone()))
            .or_default()
            .push(target_id.clone());
        Ok(target_id)
    }

    /// Remove a record, its descendants and every edge touching them.
    fn remove(&mut self, target_id: &TargetId) {
        let Some(stored) = self.records.remove(target_id) else {
            return;
        };
        if let Some(ids) = self.scopes.get_mut(&(stored.level, stored.parent.clone())) {
            ids.retain(|id| id != target_id);
        }
        for child_level in child_levels(stored.level) {
            if let Some(children) = self.scopes.remove(&(*child_level, Some(target_id.clone()))) {
                for child in children {
                    self.remove(&child);
                }
            }
        }
        self.relationships
            .retain(|edge| &edge.from != target_id && &edge.to != target_id);
    }
}

/// Target repository held in memory.
///
/// Clones share state. Every successful write is appended to a journal so
/// tests can assert exactly which writes a cycle performed, and individual
/// operations can be made to fail with [`FailPoint`]s.
#[derive(Debug, Clone, Default)]
pub struct MemoryTargetStore {
    state: Arc<Mutex<State>>,
}

impl MemoryTargetStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record directly, bypassing the journal.
    pub fn seed(&self, entity: &CatalogEntity) -> TargetResult<TargetId> {
        self.state.lock().insert(entity)
    }

    /// Mark a scope as listed, so an empty scope reports an empty listing
    /// instead of the never-listed marker.
    pub fn mark_listed(&self, level: Level, parent: Option<&TargetId>) {
        self.state
            .lock()
            .scopes
            .entry((level, parent.cloned()))
            .or_default();
    }

    /// Forget every scope listing, as after the repository lost its
    /// snapshot. Records are kept but no longer listed.
    pub fn forget_listings(&self) {
        self.state.lock().scopes.clear();
    }

    /// Make an operation fail with a repository error.
    pub fn fail(&self, point: FailPoint) {
        self.state.lock().failures.insert(point, false);
    }

    /// Make an operation fail with an authorization error.
    pub fn deny(&self, point: FailPoint) {
        self.state.lock().failures.insert(point, true);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// All writes performed so far.
    pub fn journal(&self) -> Vec<WriteOp> {
        self.state.lock().journal.clone()
    }

    /// Clear the write journal.
    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    /// Number of writes performed so far.
    pub fn write_count(&self) -> usize {
        self.state.lock().journal.len()
    }

    /// Records of one level, in creation order.
    pub fn records(&self, level: Level) -> Vec<TargetRecord> {
        let state = self.state.lock();
        let mut stored: Vec<(&TargetId, &Stored)> = state
            .records
            .iter()
            .filter(|(_, s)| s.level == level)
            .collect();
        stored.sort_by_key(|(id, _)| id_sequence(id));
        stored.into_iter().map(|(_, s)| s.record.clone()).collect()
    }

    /// Find the first record of a level with the given qualified name.
    pub fn find(&self, level: Level, qualified_name: &str) -> Option<TargetRecord> {
        self.records(level)
            .into_iter()
            .find(|r| r.qualified_name == qualified_name)
    }

    /// Parent of a record.
    pub fn parent_of(&self, target_id: &TargetId) -> Option<TargetId> {
        self.state
            .lock()
            .records
            .get(target_id)
            .and_then(|s| s.parent.clone())
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Replace a record's attributes directly, bypassing the journal.
    pub fn set_attributes(&self, target_id: &TargetId, attributes: Attributes) -> bool {
        match self.state.lock().records.get_mut(target_id) {
            Some(stored) => {
                stored.record.attributes = attributes;
                true
            }
            None => false,
        }
    }

    /// All relationship edges.
    pub fn relationships(&self) -> Vec<RelationshipEdge> {
        self.state.lock().relationships.clone()
    }
}

fn id_sequence(id: &TargetId) -> u64 {
    id.as_str()
        .rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or_default()
}

impl TargetCatalogStore for MemoryTargetStore {
    fn list(
        &self,
        level: Level,
        parent: Option<&TargetId>,
        page: PageRequest,
    ) -> TargetResult<ListingPage> {
        let state = self.state.lock();
        state.check(FailPoint::List(level))?;

        let Some(ids) = state.scopes.get(&(level, parent.cloned())) else {
            return Ok(ListingPage::NeverListed);
        };
        let records: Vec<TargetRecord> = ids
            .iter()
            .filter_map(|id| state.records.get(id))
            .map(|s| s.record.clone())
            .collect();
        Ok(ListingPage::Page(Page::slice(&records, page)))
    }

    fn create(&self, entity: &CatalogEntity) -> TargetResult<TargetId> {
        let mut state = self.state.lock();
        state.check(FailPoint::Create(entity.qualified_name.clone()))?;

        let target_id = state.insert(entity)?;
        state.journal.push(WriteOp::Create {
            level: entity.level,
            target_id: target_id.clone(),
            qualified_name: entity.qualified_name.clone(),
        });
        Ok(target_id)
    }

    fn update(&self, target_id: &TargetId, entity: &CatalogEntity) -> TargetResult<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::Update(entity.qualified_name.clone()))?;

        let stored = state
            .records
            .get_mut(target_id)
            .ok_or_else(|| StoreError::NotFound(target_id.clone()))?;
        stored.record = TargetRecord::from_entity(target_id.clone(), entity);

        state.journal.push(WriteOp::Update {
            level: entity.level,
            target_id: target_id.clone(),
            qualified_name: entity.qualified_name.clone(),
        });
        Ok(())
    }

    fn delete(&self, level: Level, target_id: &TargetId, qualified_name: &str) -> TargetResult<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::Delete(qualified_name.to_string()))?;

        match state.records.get(target_id) {
            Some(stored) if stored.level == level => {}
            Some(stored) => {
                return Err(CollaboratorError::invalid_parameter(
                    "level",
                    format!("{} is a {}, not a {}", target_id, stored.level, level),
                ))
            }
            None => return Err(StoreError::NotFound(target_id.clone()).into()),
        }

        state.remove(target_id);
        state.journal.push(WriteOp::Delete {
            level,
            target_id: target_id.clone(),
            qualified_name: qualified_name.to_string(),
        });
        Ok(())
    }

    fn find_columns_by_qualified_name(
        &self,
        qualified_name: &str,
        page: PageRequest,
    ) -> TargetResult<Page<TargetId>> {
        let state = self.state.lock();
        state.check(FailPoint::FindColumns(qualified_name.to_string()))?;

        let mut ids: Vec<TargetId> = state
            .records
            .iter()
            .filter(|(_, s)| s.level == Level::Column && s.record.qualified_name == qualified_name)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_by_key(id_sequence);
        Ok(Page::slice(&ids, page))
    }

    fn relationship_exists(&self, from: &TargetId, to: &TargetId) -> TargetResult<bool> {
        let state = self.state.lock();
        Ok(state
            .relationships
            .iter()
            .any(|edge| &edge.from == from && &edge.to == to))
    }

    fn create_relationship(
        &self,
        from: &TargetId,
        to: &TargetId,
        properties: &ForeignKeyProperties,
    ) -> TargetResult<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::Relate)?;

        for id in [from, to] {
            if !state.records.contains_key(id) {
                return Err(StoreError::NotFound(id.clone()).into());
            }
        }

        state.relationships.push(RelationshipEdge {
            from: from.clone(),
            to: to.clone(),
            properties: properties.clone(),
        });
        state.journal.push(WriteOp::Relate {
            from: from.clone(),
            to: to.clone(),
        });
        Ok(())
    }
}
