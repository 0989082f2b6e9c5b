//! Hierarchy levels.

use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;

/// One tier of the catalog hierarchy.
#[derive(
    Debug,
    Clone,
    Copy,
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
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// A database hosted by the source system. Root of the hierarchy.
    Database,
    /// A schema inside a database.
    Schema,
    /// A table inside a schema.
    Table,
    /// A view inside a schema.
    View,
    /// A column of a table or view.
    Column,
}

impl Level {
    /// All levels in traversal order.
    pub const ALL: [Level; 5] = [
        Level::Database,
        Level::Schema,
        Level::Table,
        Level::View,
        Level::Column,
    ];

    /// Whether entities of this level are the root of the hierarchy.
    pub fn is_root(&self) -> bool {
        matches!(self, Level::Database)
    }

    /// Whether entities of this level own columns.
    pub fn has_columns(&self) -> bool {
        matches!(self, Level::Table | Level::View)
    }

    /// Stable lowercase name used in keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Database => "database",
            Level::Schema => "schema",
            Level::Table => "table",
            Level::View => "view",
            Level::Column => "column",
        }
    }

    /// Single byte tag used in storage keys.
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Level::Database => b'd',
            Level::Schema => b's',
            Level::Table => b't',
            Level::View => b'v',
            Level::Column => b'c',
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
