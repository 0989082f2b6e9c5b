//! Foreign-key links and the relationship edges built from them.

use super::TargetId;
use rkyv::{Archive, Deserialize, Serialize};

/// A foreign key observed in the source, expressed as column qualified names.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ForeignKeyLink {
    /// Qualified name of the referencing (importing) column.
    pub imported_qualified_name: String,
    /// Qualified name of the referenced (exporting) column.
    pub exported_qualified_name: String,
    /// Name of the source constraint, when the source reports one.
    #[serde(default)]
    pub constraint_name: Option<String>,
}

impl ForeignKeyLink {
    /// Create a link between two column qualified names.
    pub fn new(imported: impl Into<String>, exported: impl Into<String>) -> Self {
        Self {
            imported_qualified_name: imported.into(),
            exported_qualified_name: exported.into(),
            constraint_name: None,
        }
    }

    /// Set the constraint name.
    pub fn with_constraint_name(mut self, name: impl Into<String>) -> Self {
        self.constraint_name = Some(name.into());
        self
    }
}

/// Properties attached to a foreign-key relationship in the target store.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(default)]
pub struct ForeignKeyProperties {
    /// Relationship name, usually the constraint name.
    pub name: Option<String>,
    /// Free text description.
    pub description: Option<String>,
    /// Confidence that the link is correct, 0-100.
    pub confidence: Option<u8>,
    /// Person or team responsible for the relationship.
    pub steward: Option<String>,
    /// Where the relationship was discovered.
    pub source: Option<String>,
}

impl ForeignKeyProperties {
    /// Properties for a specific link, naming the edge after its constraint.
    pub fn for_link(&self, link: &ForeignKeyLink) -> Self {
        Self {
            name: link.constraint_name.clone().or_else(|| self.name.clone()),
            ..self.clone()
        }
    }
}

/// A relationship edge between two target-side columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipEdge {
    /// Referencing column.
    pub from: TargetId,
    /// Referenced column.
    pub to: TargetId,
    /// Edge properties.
    pub properties: ForeignKeyProperties,
}
