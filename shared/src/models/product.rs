//! Product Model

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::EntityStatus;

/// Product entity
///
/// Prices are stored in cents. `attributes` and `relations` live in junction
/// tables and are populated by application code, not by row mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub external_id: i64,
    /// Category reference (local id, required)
    pub category_id: i64,
    pub title: String,
    pub address: String,
    pub sort_order: i32,
    pub description: String,
    pub extra: String,
    pub vendor_code: String,
    pub barcode: String,
    /// Retail price in cents
    pub price: i64,
    /// Wholesale price in cents
    pub price_wholesale: i64,
    /// Cost price in cents
    pub price_first: i64,
    pub stock: f64,
    pub weight: f64,
    pub unit: String,
    pub country: String,
    pub manufacturer: String,
    pub tags: String,
    pub field1: String,
    pub field2: String,
    pub field3: String,
    pub field4: String,
    pub field5: String,
    pub status: EntityStatus,
    pub updated_at: i64,

    // -- Relations (junction tables, skipped by FromRow) --

    /// Attribute values: attribute id -> value
    #[cfg_attr(feature = "db", sqlx(skip))]
    #[serde(default)]
    pub attributes: HashMap<i64, String>,
    /// Related products: related product id -> suggested quantity
    #[cfg_attr(feature = "db", sqlx(skip))]
    #[serde(default)]
    pub relations: HashMap<i64, f64>,
}

/// Incoming product data for an upsert, keyed by `external_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDraft {
    pub external_id: i64,
    pub category_id: i64,
    pub title: String,
    pub address: String,
    pub sort_order: i32,
    pub description: String,
    pub extra: String,
    pub vendor_code: String,
    pub barcode: String,
    pub price: i64,
    pub price_wholesale: i64,
    pub price_first: i64,
    pub stock: f64,
    pub weight: f64,
    pub unit: String,
    pub country: String,
    pub manufacturer: String,
    pub tags: String,
    pub field1: String,
    pub field2: String,
    pub field3: String,
    pub field4: String,
    pub field5: String,
}
