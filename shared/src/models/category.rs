//! Category Model

use serde::{Deserialize, Serialize};

use super::EntityStatus;

/// Category entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Category {
    pub id: i64,
    /// ERP-side identity; the join key between ERP and local records
    pub external_id: i64,
    /// Parent category (local id); `None` is the tree root
    pub parent_id: Option<i64>,
    pub title: String,
    /// URL slug, possibly prefixed with the parent chain's addresses
    pub address: String,
    pub sort_order: i32,
    pub description: String,
    pub field1: String,
    pub field2: String,
    pub field3: String,
    pub status: EntityStatus,
    /// Unix millis of the last reconciliation write
    pub updated_at: i64,
}

/// Incoming category data for an upsert, keyed by `external_id`.
///
/// Carried separately from [`Category`] because the parent pointer is not
/// resolvable until the whole snapshot has been ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDraft {
    pub external_id: i64,
    pub title: String,
    pub address: String,
    pub sort_order: i32,
    pub description: String,
    pub field1: String,
    pub field2: String,
    pub field3: String,
}
