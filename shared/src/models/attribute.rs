//! Attribute Model
//!
//! Custom-field attributes attached to products. The reconciler registers a
//! fixed set of "index field" slots here so that product values are keyed by
//! stable attribute ids rather than raw ERP field names.

use serde::{Deserialize, Serialize};

/// Attribute value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
pub enum AttributeKind {
    String,
    Boolean,
}

impl AttributeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::String => "string",
            AttributeKind::Boolean => "boolean",
        }
    }
}

/// Attribute entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Attribute {
    pub id: i64,
    /// Stable lookup key, e.g. `field1`
    pub address: String,
    pub title: String,
    #[cfg_attr(feature = "db", sqlx(rename = "attr_group"))]
    pub group: String,
    pub kind: AttributeKind,
}
