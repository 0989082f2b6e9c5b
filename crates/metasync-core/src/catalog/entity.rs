//! Source entities and their target-side counterparts.

use super::{Attributes, Level};
use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;

/// Opaque identity assigned to a record by the target store.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Wrap a store-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One node of the source hierarchy as observed during the current cycle.
///
/// Entities are rebuilt from the source every cycle. `parent` is filled in
/// by the reconciler once the owning entity's target identity is known.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntity {
    /// Hierarchy-scoped unique name, stable across cycles.
    pub qualified_name: String,
    /// Name of the entity inside the source system.
    pub native_name: String,
    /// Hierarchy level.
    pub level: Level,
    /// Descriptive properties.
    pub attributes: Attributes,
    /// Target identity of the owning entity (None for databases).
    pub parent: Option<TargetId>,
}

impl CatalogEntity {
    /// Create an entity with empty attributes.
    pub fn new(
        level: Level,
        qualified_name: impl Into<String>,
        native_name: impl Into<String>,
    ) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            native_name: native_name.into(),
            level,
            attributes: Attributes::default(),
            parent: None,
        }
    }

    /// Create a database entity.
    pub fn database(qualified_name: impl Into<String>, native_name: impl Into<String>) -> Self {
        Self::new(Level::Database, qualified_name, native_name)
    }

    /// Create a schema entity.
    pub fn schema(qualified_name: impl Into<String>, native_name: impl Into<String>) -> Self {
        Self::new(Level::Schema, qualified_name, native_name)
    }

    /// Create a table entity.
    pub fn table(qualified_name: impl Into<String>, native_name: impl Into<String>) -> Self {
        Self::new(Level::Table, qualified_name, native_name)
    }

    /// Create a view entity.
    pub fn view(qualified_name: impl Into<String>, native_name: impl Into<String>) -> Self {
        Self::new(Level::View, qualified_name, native_name)
    }

    /// Create a column entity.
    pub fn column(qualified_name: impl Into<String>, native_name: impl Into<String>) -> Self {
        Self::new(Level::Column, qualified_name, native_name)
    }

    /// Set the attributes.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set the owning entity's target identity.
    pub fn with_parent(mut self, parent: TargetId) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// An entity that already exists in the target store.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct TargetRecord {
    /// Store-assigned identity.
    pub target_id: TargetId,
    /// Qualified name recorded at creation or last update.
    pub qualified_name: String,
    /// Native name recorded at creation or last update.
    pub native_name: String,
    /// Attribute snapshot.
    pub attributes: Attributes,
}

impl TargetRecord {
    /// Create a record snapshot.
    pub fn new(
        target_id: impl Into<TargetId>,
        qualified_name: impl Into<String>,
        attributes: Attributes,
    ) -> Self {
        let qualified_name = qualified_name.into();
        Self {
            target_id: target_id.into(),
            native_name: qualified_name
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .to_string(),
            qualified_name,
            attributes,
        }
    }

    /// Build the snapshot a store would hold after writing `entity`.
    pub fn from_entity(target_id: TargetId, entity: &CatalogEntity) -> Self {
        Self {
            target_id,
            qualified_name: entity.qualified_name.clone(),
            native_name: entity.native_name.clone(),
            attributes: entity.attributes.clone(),
        }
    }

    /// Whether the source entity's state diverges from this snapshot.
    pub fn differs_from(&self, entity: &CatalogEntity) -> bool {
        self.native_name != entity.native_name || self.attributes.differs_from(&entity.attributes)
    }
}
