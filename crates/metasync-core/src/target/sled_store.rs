//! Persistent target repository on sled.
//!
//! Records are stored rkyv-encoded under their identity. Secondary trees
//! index records by scope and by qualified name, hold relationship edges in
//! both directions, and remember which scopes have ever held a record.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use rkyv::{Archive, Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::debug;

use super::{check_parent, child_levels, TargetCatalogStore, TargetResult};
use crate::catalog::{CatalogEntity, ForeignKeyProperties, Level, TargetId, TargetRecord};
use crate::error::{CollaboratorError, StoreError};
use crate::page::{ListingPage, Page, PageRequest};

/// Tree name for records.
const RECORDS_TREE: &str = "metasync:records";

/// Tree name for the scope index (scope + id -> empty).
const SCOPE_TREE: &str = "metasync:scopes";

/// Tree name for the qualified-name index (name + id -> level tag).
const NAME_TREE: &str = "metasync:names";

/// Tree name for relationships (from + to -> properties).
const RELATIONSHIP_TREE: &str = "metasync:relationships";

/// Tree name for reversed relationships (to + from -> empty).
const REVERSE_RELATIONSHIP_TREE: &str = "metasync:relationships_rev";

/// Tree name for scope markers (scope -> empty).
const MARKER_TREE: &str = "metasync:markers";

/// A record together with its position in the hierarchy.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
struct StoredRecord {
    level: Level,
    parent: Option<TargetId>,
    record: TargetRecord,
}

impl StoredRecord {
    fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let aligned = align(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}

/// Copy a value out of sled into a buffer rkyv can validate in place.
fn align(bytes: &[u8]) -> rkyv::util::AlignedVec<16> {
    let mut aligned: rkyv::util::AlignedVec<16> = rkyv::util::AlignedVec::new();
    aligned.extend_from_slice(bytes);
    aligned
}

fn encode_properties(properties: &ForeignKeyProperties) -> Result<Vec<u8>, StoreError> {
    rkyv::to_bytes::<rkyv::rancor::Error>(properties)
        .map(|v| v.to_vec())
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_properties(bytes: &[u8]) -> Result<ForeignKeyProperties, StoreError> {
    let aligned = align(bytes);
    rkyv::from_bytes::<ForeignKeyProperties, rkyv::rancor::Error>(&aligned)
        .map_err(|e| StoreError::Deserialization(e.to_string()))
}

/// Generate a new record identity.
///
/// Identities are the hex encoding of a big-endian timestamp followed by a
/// counter, so byte order follows creation order.
fn generate_id() -> TargetId {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let now = chrono::Utc::now().timestamp_micros() as u64;
    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

    let mut id = [0u8; 16];
    id[..8].copy_from_slice(&now.to_be_bytes());
    id[8..16].copy_from_slice(&counter.to_be_bytes());
    TargetId::new(hex::encode(id))
}

/// Key prefix of one scope: level tag, parent id, null separator.
fn scope_prefix(level: Level, parent: Option<&TargetId>) -> Vec<u8> {
    let parent = parent.map(TargetId::as_str).unwrap_or_default();
    let mut key = Vec::with_capacity(parent.len() + 2);
    key.push(level.tag());
    key.extend_from_slice(parent.as_bytes());
    key.push(0);
    key
}

/// Key of a pair of strings separated by a null byte.
fn pair_key(first: &str, second: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(first.len() + second.len() + 1);
    key.extend_from_slice(first.as_bytes());
    key.push(0);
    key.extend_from_slice(second.as_bytes());
    key
}

/// Key prefix for all pairs starting with `first`.
fn pair_prefix(first: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(first.len() + 1);
    key.extend_from_slice(first.as_bytes());
    key.push(0);
    key
}

/// Second half of a pair key.
fn pair_suffix(key: &[u8], prefix_len: usize) -> TargetId {
    TargetId::new(String::from_utf8_lossy(&key[prefix_len..]).into_owned())
}

/// Target repository persisted in a sled database.
pub struct SledTargetStore {
    db: Db,
    records: Tree,
    scopes: Tree,
    names: Tree,
    relationships: Tree,
    reverse_relationships: Tree,
    markers: Tree,
}

impl SledTargetStore {
    /// Open or create a repository at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Open a repository that is removed when dropped.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    /// Use an already opened sled database.
    pub fn from_db(db: Db) -> Result<Self, StoreError> {
        Ok(Self {
            records: db.open_tree(RECORDS_TREE)?,
            scopes: db.open_tree(SCOPE_TREE)?,
            names: db.open_tree(NAME_TREE)?,
            relationships: db.open_tree(RELATIONSHIP_TREE)?,
            reverse_relationships: db.open_tree(REVERSE_RELATIONSHIP_TREE)?,
            markers: db.open_tree(MARKER_TREE)?,
            db,
        })
    }

    /// Fetch a record by identity.
    pub fn get(&self, target_id: &TargetId) -> Result<Option<TargetRecord>, StoreError> {
        Ok(self.get_stored(target_id)?.map(|s| s.record))
    }

    /// Parent of a record.
    pub fn parent_of(&self, target_id: &TargetId) -> Result<Option<TargetId>, StoreError> {
        Ok(self.get_stored(target_id)?.and_then(|s| s.parent))
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the repository holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Count records per level.
    pub fn count_by_level(&self) -> Result<Vec<(Level, usize)>, StoreError> {
        let mut counts: Vec<(Level, usize)> = Level::ALL.iter().map(|l| (*l, 0)).collect();
        for result in self.records.iter() {
            let (_, bytes) = result?;
            let stored = StoredRecord::from_bytes(&bytes)?;
            if let Some(entry) = counts.iter_mut().find(|(l, _)| *l == stored.level) {
                entry.1 += 1;
            }
        }
        Ok(counts)
    }

    /// Number of relationship edges.
    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Properties of the edge from `from` to `to`, if present.
    pub fn relationship(
        &self,
        from: &TargetId,
        to: &TargetId,
    ) -> Result<Option<ForeignKeyProperties>, StoreError> {
        match self.relationships.get(pair_key(from.as_str(), to.as_str()))? {
            Some(bytes) => Ok(Some(decode_properties(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn get_stored(&self, target_id: &TargetId) -> Result<Option<StoredRecord>, StoreError> {
        match self.records.get(target_id.as_str())? {
            Some(bytes) => Ok(Some(StoredRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_stored(&self, target_id: &TargetId, stored: &StoredRecord) -> Result<(), StoreError> {
        self.records.insert(target_id.as_str(), stored.to_bytes()?)?;
        Ok(())
    }

    fn insert(&self, entity: &CatalogEntity) -> Result<TargetId, StoreError> {
        if let Some(parent) = &entity.parent {
            if !self.records.contains_key(parent.as_str())? {
                return Err(StoreError::UnknownParent(parent.clone()));
            }
        }

        let target_id = generate_id();
        let stored = StoredRecord {
            level: entity.level,
            parent: entity.parent.clone(),
            record: TargetRecord::from_entity(target_id.clone(), entity),
        };
        self.put_stored(&target_id, &stored)?;

        let prefix = scope_prefix(entity.level, entity.parent.as_ref());
        let mut scope_key = prefix.clone();
        scope_key.extend_from_slice(target_id.as_str().as_bytes());
        self.scopes.insert(scope_key, &[])?;
        self.markers.insert(prefix, &[])?;
        self.names.insert(
            pair_key(&entity.qualified_name, target_id.as_str()),
            &[entity.level.tag()],
        )?;

        Ok(target_id)
    }

    /// Remove a record, its descendants and every edge touching them.
    fn remove(&self, target_id: &TargetId) -> Result<(), StoreError> {
        let Some(stored) = self.get_stored(target_id)? else {
            return Ok(());
        };

        for child_level in child_levels(stored.level) {
            let prefix = scope_prefix(*child_level, Some(target_id));
            let children: Vec<TargetId> = self
                .scopes
                .scan_prefix(&prefix)
                .keys()
                .map(|key| key.map(|k| pair_suffix(&k, prefix.len())))
                .collect::<Result<_, _>>()?;
            for child in children {
                self.remove(&child)?;
            }
            self.markers.remove(&prefix)?;
        }

        self.remove_edges(target_id)?;

        let mut scope_key = scope_prefix(stored.level, stored.parent.as_ref());
        scope_key.extend_from_slice(target_id.as_str().as_bytes());
        self.scopes.remove(scope_key)?;
        self.names.remove(pair_key(
            &stored.record.qualified_name,
            target_id.as_str(),
        ))?;
        self.records.remove(target_id.as_str())?;
        Ok(())
    }

    fn remove_edges(&self, target_id: &TargetId) -> Result<(), StoreError> {
        let prefix = pair_prefix(target_id.as_str());

        let outgoing: Vec<TargetId> = self
            .relationships
            .scan_prefix(&prefix)
            .keys()
            .map(|key| key.map(|k| pair_suffix(&k, prefix.len())))
            .collect::<Result<_, _>>()?;
        for to in outgoing {
            self.relationships
                .remove(pair_key(target_id.as_str(), to.as_str()))?;
            self.reverse_relationships
                .remove(pair_key(to.as_str(), target_id.as_str()))?;
        }

        let incoming: Vec<TargetId> = self
            .reverse_relationships
            .scan_prefix(&prefix)
            .keys()
            .map(|key| key.map(|k| pair_suffix(&k, prefix.len())))
            .collect::<Result<_, _>>()?;
        for from in incoming {
            self.relationships
                .remove(pair_key(from.as_str(), target_id.as_str()))?;
            self.reverse_relationships
                .remove(pair_key(target_id.as_str(), from.as_str()))?;
        }
        Ok(())
    }

    fn list_page(
        &self,
        level: Level,
        parent: Option<&TargetId>,
        page: PageRequest,
    ) -> Result<ListingPage, StoreError> {
        let prefix = scope_prefix(level, parent);
        if !self.markers.contains_key(&prefix)? {
            return Ok(ListingPage::NeverListed);
        }

        let mut ids: Vec<TargetId> = self
            .scopes
            .scan_prefix(&prefix)
            .keys()
            .skip(page.offset)
            .take(page.size.saturating_add(1))
            .map(|key| key.map(|k| pair_suffix(&k, prefix.len())))
            .collect::<Result<_, _>>()?;
        let has_more = ids.len() > page.size;
        ids.truncate(page.size);

        let mut records = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.get_stored(id)? {
                Some(stored) => records.push(stored.record),
                None => return Err(StoreError::NotFound(id.clone())),
            }
        }
        Ok(ListingPage::Page(Page { items: records, has_more }))
    }

    fn find_columns(
        &self,
        qualified_name: &str,
        page: PageRequest,
    ) -> Result<Page<TargetId>, StoreError> {
        let prefix = pair_prefix(qualified_name);
        let column = [Level::Column.tag()];

        let mut ids = Vec::new();
        for result in self.names.scan_prefix(&prefix) {
            let (key, value) = result?;
            if value[..] == column {
                ids.push(pair_suffix(&key, prefix.len()));
            }
        }
        Ok(Page::slice(&ids, page))
    }
}

impl TargetCatalogStore for SledTargetStore {
    fn list(
        &self,
        level: Level,
        parent: Option<&TargetId>,
        page: PageRequest,
    ) -> TargetResult<ListingPage> {
        Ok(self.list_page(level, parent, page)?)
    }

    fn create(&self, entity: &CatalogEntity) -> TargetResult<TargetId> {
        check_parent(entity)?;
        let target_id = self.insert(entity)?;
        debug!(
            level = %entity.level,
            qualified_name = %entity.qualified_name,
            target_id = %target_id,
            "Created record"
        );
        Ok(target_id)
    }

    fn update(&self, target_id: &TargetId, entity: &CatalogEntity) -> TargetResult<()> {
        let mut stored = self
            .get_stored(target_id)?
            .ok_or_else(|| StoreError::NotFound(target_id.clone()))?;

        if stored.record.qualified_name != entity.qualified_name {
            let old_key = pair_key(&stored.record.qualified_name, target_id.as_str());
            let new_key = pair_key(&entity.qualified_name, target_id.as_str());
            self.names.remove(old_key).map_err(StoreError::from)?;
            self.names
                .insert(new_key, &[stored.level.tag()])
                .map_err(StoreError::from)?;
        }
        stored.record = TargetRecord::from_entity(target_id.clone(), entity);
        self.put_stored(target_id, &stored)?;
        Ok(())
    }

    fn delete(&self, level: Level, target_id: &TargetId, qualified_name: &str) -> TargetResult<()> {
        let stored = self
            .get_stored(target_id)?
            .ok_or_else(|| StoreError::NotFound(target_id.clone()))?;
        if stored.level != level {
            return Err(CollaboratorError::invalid_parameter(
                "level",
                format!("{} is a {}, not a {}", target_id, stored.level, level),
            ));
        }

        self.remove(target_id)?;
        debug!(
            level = %level,
            qualified_name = %qualified_name,
            target_id = %target_id,
            "Deleted record"
        );
        Ok(())
    }

    fn find_columns_by_qualified_name(
        &self,
        qualified_name: &str,
        page: PageRequest,
    ) -> TargetResult<Page<TargetId>> {
        Ok(self.find_columns(qualified_name, page)?)
    }

    fn relationship_exists(&self, from: &TargetId, to: &TargetId) -> TargetResult<bool> {
        let exists = self
            .relationships
            .contains_key(pair_key(from.as_str(), to.as_str()))
            .map_err(StoreError::from)?;
        Ok(exists)
    }

    fn create_relationship(
        &self,
        from: &TargetId,
        to: &TargetId,
        properties: &ForeignKeyProperties,
    ) -> TargetResult<()> {
        for id in [from, to] {
            if !self.records.contains_key(id.as_str()).map_err(StoreError::from)? {
                return Err(StoreError::NotFound(id.clone()).into());
            }
        }

        self.relationships
            .insert(pair_key(from.as_str(), to.as_str()), encode_properties(properties)?)
            .map_err(StoreError::from)?;
        self.reverse_relationships
            .insert(pair_key(to.as_str(), from.as_str()), &[])
            .map_err(StoreError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Attributes;

    struct TestStore {
        store: SledTargetStore,
        _dir: tempfile::TempDir,
    }

    impl std::ops::Deref for TestStore {
        type Target = SledTargetStore;
        fn deref(&self) -> &Self::Target {
            &self.store
        }
    }

    fn test_store() -> TestStore {
        let dir = tempfile::tempdir().unwrap();
        let store = SledTargetStore::open(dir.path()).unwrap();
        TestStore { store, _dir: dir }
    }

    fn records(listing: ListingPage) -> Vec<TargetRecord> {
        match listing {
            ListingPage::Page(page) => page.items,
            ListingPage::NeverListed => panic!("scope was never listed"),
        }
    }

    #[test]
    fn test_create_and_list() {
        let store = test_store();
        assert_eq!(
            store.list(Level::Database, None, PageRequest::first(10)).unwrap(),
            ListingPage::NeverListed
        );

        let db = store.create(&CatalogEntity::database("sales", "sales")).unwrap();
        store
            .create(&CatalogEntity::schema("sales.public", "public").with_parent(db.clone()))
            .unwrap();
        store
            .create(&CatalogEntity::schema("sales.archive", "archive").with_parent(db.clone()))
            .unwrap();

        let schemas = records(
            store
                .list(Level::Schema, Some(&db), PageRequest::first(10))
                .unwrap(),
        );
        let names: Vec<&str> = schemas.iter().map(|r| r.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["sales.public", "sales.archive"]);
        assert_eq!(store.parent_of(&schemas[0].target_id).unwrap(), Some(db));
    }

    #[test]
    fn test_list_pagination() {
        let store = test_store();
        for i in 0..5 {
            let name = format!("db{}", i);
            store.create(&CatalogEntity::database(&name, &name)).unwrap();
        }

        let first = store
            .list(Level::Database, None, PageRequest::first(2))
            .unwrap();
        match first {
            ListingPage::Page(page) => {
                assert_eq!(page.items.len(), 2);
                assert!(page.has_more);
            }
            ListingPage::NeverListed => panic!("expected a page"),
        }

        let last = store
            .list(Level::Database, None, PageRequest { offset: 4, size: 2 })
            .unwrap();
        match last {
            ListingPage::Page(page) => {
                assert_eq!(page.items[0].qualified_name, "db4");
                assert!(!page.has_more);
            }
            ListingPage::NeverListed => panic!("expected a page"),
        }
    }

    #[test]
    fn test_update_persists_attributes() {
        let store = test_store();
        let entity = CatalogEntity::database("sales", "sales");
        let id = store.create(&entity).unwrap();

        let changed = entity.with_attributes(Attributes::new().with_owner("dba"));
        store.update(&id, &changed).unwrap();

        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.attributes.owner.as_deref(), Some("dba"));
    }

    #[test]
    fn test_delete_cascades_and_keeps_marker() {
        let store = test_store();
        let db = store.create(&CatalogEntity::database("sales", "sales")).unwrap();
        let schema = store
            .create(&CatalogEntity::schema("sales.public", "public").with_parent(db.clone()))
            .unwrap();
        let table = store
            .create(
                &CatalogEntity::table("sales.public.orders", "orders").with_parent(schema.clone()),
            )
            .unwrap();
        let id = store
            .create(
                &CatalogEntity::column("sales.public.orders.id", "id").with_parent(table.clone()),
            )
            .unwrap();
        let other = store
            .create(
                &CatalogEntity::column("sales.public.orders.parent", "parent").with_parent(table),
            )
            .unwrap();
        store
            .create_relationship(&other, &id, &ForeignKeyProperties::default())
            .unwrap();
        assert_eq!(store.relationship_count(), 1);

        store.delete(Level::Schema, &schema, "sales.public").unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.relationship_count(), 0);
        assert!(records(
            store
                .list(Level::Schema, Some(&db), PageRequest::first(10))
                .unwrap()
        )
        .is_empty());
        assert!(store
            .find_columns_by_qualified_name("sales.public.orders.id", PageRequest::first(10))
            .unwrap()
            .items
            .is_empty());
    }

    #[test]
    fn test_list_with_unbounded_page_size() {
        let store = test_store();
        store.create(&CatalogEntity::database("sales", "sales")).unwrap();
        store.create(&CatalogEntity::database("hr", "hr")).unwrap();

        let page = PageRequest {
            offset: 0,
            size: usize::MAX,
        };
        match store.list(Level::Database, None, page).unwrap() {
            ListingPage::Page(page) => {
                assert_eq!(page.items.len(), 2);
                assert!(!page.has_more);
            }
            ListingPage::NeverListed => panic!("scope was never listed"),
        }
    }

    #[test]
    fn test_find_columns_ignores_other_levels() {
        let store = test_store();
        let db = store.create(&CatalogEntity::database("x", "x")).unwrap();
        let schema = store
            .create(&CatalogEntity::schema("x.s", "s").with_parent(db))
            .unwrap();
        let table = store
            .create(&CatalogEntity::table("x.s.t", "t").with_parent(schema))
            .unwrap();
        store
            .create(&CatalogEntity::column("x.s.t.c", "c").with_parent(table.clone()))
            .unwrap();
        store
            .create(&CatalogEntity::column("x.s.t.c", "c").with_parent(table))
            .unwrap();

        let columns = store
            .find_columns_by_qualified_name("x.s.t.c", PageRequest::first(10))
            .unwrap();
        assert_eq!(columns.items.len(), 2);
        let tables = store
            .find_columns_by_qualified_name("x.s.t", PageRequest::first(10))
            .unwrap();
        assert!(tables.items.is_empty());
    }

    #[test]
    fn test_relationship_properties_roundtrip() {
        let store = test_store();
        let a = store.create(&CatalogEntity::database("a", "a")).unwrap();
        let b = store.create(&CatalogEntity::database("b", "b")).unwrap();
        let props = ForeignKeyProperties {
            name: Some("fk_a_b".into()),
            confidence: Some(100),
            ..Default::default()
        };

        assert!(!store.relationship_exists(&a, &b).unwrap());
        store.create_relationship(&a, &b, &props).unwrap();
        assert!(store.relationship_exists(&a, &b).unwrap());
        assert!(!store.relationship_exists(&b, &a).unwrap());
        assert_eq!(store.relationship(&a, &b).unwrap(), Some(props));
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = SledTargetStore::open(dir.path()).unwrap();
            let id = store.create(&CatalogEntity::database("sales", "sales")).unwrap();
            store.flush().unwrap();
            id
        };

        let store = SledTargetStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap().qualified_name, "sales");
        let counts = store.count_by_level().unwrap();
        assert_eq!(counts[0], (Level::Database, 1));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let store = test_store();
        let result = store
            .create(&CatalogEntity::schema("s", "s").with_parent(TargetId::new("missing")));
        assert!(matches!(
            result,
            Err(CollaboratorError::InvalidParameter { .. })
        ));
    }
}
