//! Refresh cycle configuration.

use crate::catalog::ForeignKeyProperties;
use crate::page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Default value recorded as the source of discovered relationships.
pub const DEFAULT_RELATIONSHIP_SOURCE: &str = "metasync";

/// Configuration for refresh cycles.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Number of items requested per page from either collaborator.
    pub page_size: usize,

    /// Whether views are mirrored alongside tables.
    pub include_views: bool,

    /// Whether foreign keys are turned into relationship edges.
    pub resolve_foreign_keys: bool,

    /// Properties attached to every relationship edge created.
    pub foreign_key_properties: ForeignKeyProperties,
}

impl SyncConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            include_views: true,
            resolve_foreign_keys: true,
            foreign_key_properties: ForeignKeyProperties {
                source: Some(DEFAULT_RELATIONSHIP_SOURCE.to_string()),
                ..Default::default()
            },
        }
    }

    /// Set the page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Set whether views are mirrored.
    pub fn with_views(mut self, include: bool) -> Self {
        self.include_views = include;
        self
    }

    /// Set whether foreign keys are resolved.
    pub fn with_foreign_keys(mut self, resolve: bool) -> Self {
        self.resolve_foreign_keys = resolve;
        self
    }

    /// Set the properties attached to relationship edges.
    pub fn with_foreign_key_properties(mut self, properties: ForeignKeyProperties) -> Self {
        self.foreign_key_properties = properties;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
