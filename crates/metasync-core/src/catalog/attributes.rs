//! Typed attribute record carried by every catalog entity.

use rkyv::{Archive, Deserialize, Serialize};
use std::collections::BTreeMap;

/// Descriptive properties of a catalog entity.
///
/// Fields that do not apply at a level stay `None`. Change detection is a
/// field-by-field comparison of the [normalized](Attributes::normalized)
/// forms, so an empty string and a missing value are the same thing, and an
/// unspecified nullability means nullable.
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
pub struct Attributes {
    /// Human readable name, if different from the native name.
    pub display_name: Option<String>,
    /// Free text description (e.g. a `COMMENT ON` value).
    pub description: Option<String>,
    /// Owning role or user.
    pub owner: Option<String>,
    /// Character encoding (databases).
    pub encoding: Option<String>,
    /// SQL data type (columns).
    pub data_type: Option<String>,
    /// 1-based position within the owning table (columns).
    pub ordinal_position: Option<u32>,
    /// Whether the column accepts NULL.
    pub nullable: Option<bool>,
    /// Column default expression.
    pub default_value: Option<String>,
    /// Maximum character length (columns).
    pub max_length: Option<u32>,
    /// Any further source properties, ordered by name.
    pub properties: BTreeMap<String, String>,
}

impl Attributes {
    /// Create an empty attribute record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the display name.
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Set the owner.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Set the encoding.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Set the column data type.
    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Set the column ordinal position.
    pub fn with_ordinal_position(mut self, position: u32) -> Self {
        self.ordinal_position = Some(position);
        self
    }

    /// Set column nullability.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Set the column default expression.
    pub fn with_default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Set the maximum length.
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Add an additional property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Return a copy with defaults applied to every optional field.
    pub fn normalized(&self) -> Self {
        Self {
            display_name: non_blank(&self.display_name),
            description: non_blank(&self.description),
            owner: non_blank(&self.owner),
            encoding: non_blank(&self.encoding),
            data_type: non_blank(&self.data_type),
            ordinal_position: self.ordinal_position,
            nullable: Some(self.nullable.unwrap_or(true)),
            default_value: non_blank(&self.default_value),
            max_length: self.max_length,
            properties: self.properties.clone(),
        }
    }

    /// Whether the two records describe different entity states.
    pub fn differs_from(&self, other: &Attributes) -> bool {
        self.normalized() != other.normalized()
    }

    /// Names of the fields whose normalized values differ.
    pub fn changed_fields(&self, other: &Attributes) -> Vec<&'static str> {
        let a = self.normalized();
        let b = other.normalized();
        let mut changed = Vec::new();

        if a.display_name != b.display_name {
            changed.push("display_name");
        }
        if a.description != b.description {
            changed.push("description");
        }
        if a.owner != b.owner {
            changed.push("owner");
        }
        if a.encoding != b.encoding {
            changed.push("encoding");
        }
        if a.data_type != b.data_type {
            changed.push("data_type");
        }
        if a.ordinal_position != b.ordinal_position {
            changed.push("ordinal_position");
        }
        if a.nullable != b.nullable {
            changed.push("nullable");
        }
        if a.default_value != b.default_value {
            changed.push("default_value");
        }
        if a.max_length != b.max_length {
            changed.push("max_length");
        }
        if a.properties != b.properties {
            changed.push("properties");
        }

        changed
    }
}

/// Blank values become `None`; anything else is kept exactly as given.
fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_records_do_not_differ() {
        let a = Attributes::new()
            .with_data_type("integer")
            .with_ordinal_position(1)
            .with_property("collation", "C");
        assert!(!a.differs_from(&a.clone()));
    }

    #[test]
    fn test_blank_strings_equal_missing() {
        let a = Attributes::new().with_description("");
        let b = Attributes::new();
        assert!(!a.differs_from(&b));

        let a = Attributes::new().with_owner("  ");
        assert!(!a.differs_from(&b));
    }

    #[test]
    fn test_whitespace_edits_are_changes() {
        let a = Attributes::new().with_description("x");
        let b = Attributes::new().with_description("x ");
        assert!(a.differs_from(&b));
        assert_eq!(a.changed_fields(&b), vec!["description"]);
        assert_eq!(b.normalized().description.as_deref(), Some("x "));
    }

    #[test]
    fn test_nullable_defaults_to_true() {
        let a = Attributes::new().with_nullable(true);
        let b = Attributes::new();
        assert!(!a.differs_from(&b));

        let c = Attributes::new().with_nullable(false);
        assert!(c.differs_from(&b));
    }

    #[test]
    fn test_changed_fields() {
        let a = Attributes::new()
            .with_data_type("integer")
            .with_description("order id");
        let b = Attributes::new()
            .with_data_type("bigint")
            .with_description("order id")
            .with_property("identity", "always");

        assert_eq!(a.changed_fields(&b), vec!["data_type", "properties"]);
    }

    #[test]
    fn test_property_order_is_irrelevant() {
        let a = Attributes::new().with_property("a", "1").with_property("b", "2");
        let b = Attributes::new().with_property("b", "2").with_property("a", "1");
        assert!(!a.differs_from(&b));
    }

    #[test]
    fn test_deserialize_with_missing_fields() {
        let attrs: Attributes = serde_json::from_str(r#"{"data_type": "text"}"#).unwrap();
        assert_eq!(attrs.data_type.as_deref(), Some("text"));
        assert!(attrs.properties.is_empty());
    }
}
