//! Catalog entity model.
//!
//! Every node of the synchronized hierarchy (database, schema, table, view,
//! column) is represented uniformly as a [`CatalogEntity`] on the source side
//! and as a [`TargetRecord`] once it exists in the repository.

mod attributes;
mod entity;
mod level;
mod relationship;

pub use attributes::Attributes;
pub use entity::{CatalogEntity, TargetId, TargetRecord};
pub use level::Level;
pub use relationship::{ForeignKeyLink, ForeignKeyProperties, RelationshipEdge};
