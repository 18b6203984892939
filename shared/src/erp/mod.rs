//! ERP wire types.
//!
//! Field names mirror the ERP's documented JSON shape; everything numeric is
//! decoded through [`serde_flex`] because the feed mixes numbers and numeric
//! strings freely. Records deliberately carry raw (still url-encoded) text —
//! decoding is the reconciler's business.

pub mod serde_flex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use validator::Validate;

/// Category row from the flat `catalog/list` feed.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ErpCategoryRecord {
    #[serde(rename = "idZvena", deserialize_with = "serde_flex::i64_flex")]
    pub external_id: i64,
    /// Declared parent external id; 0 means root
    #[serde(rename = "idParent", deserialize_with = "serde_flex::i64_flex", default)]
    pub parent_external_id: i64,
    #[serde(rename = "nameZvena", deserialize_with = "serde_flex::string_flex", default)]
    #[validate(length(min = 1, message = "category title is required"))]
    pub title: String,
    #[serde(rename = "poryadok", deserialize_with = "serde_flex::i32_flex", default)]
    pub sort_order: i32,
    /// Url-encoded description text
    #[serde(rename = "opisanie", deserialize_with = "serde_flex::string_flex", default)]
    pub description: String,
    #[serde(rename = "link", deserialize_with = "serde_flex::string_flex", default)]
    pub address: String,
    #[serde(rename = "ind1", deserialize_with = "serde_flex::string_flex", default)]
    pub field1: String,
    #[serde(rename = "ind2", deserialize_with = "serde_flex::string_flex", default)]
    pub field2: String,
    #[serde(rename = "ind3", deserialize_with = "serde_flex::string_flex", default)]
    pub field3: String,
    /// Semicolon-delimited remote file names
    #[serde(rename = "foto", deserialize_with = "serde_flex::string_flex", default)]
    pub photo: String,
}

/// Product row from the paginated `item/list` feed.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ErpItemRecord {
    #[serde(rename = "idTovar", deserialize_with = "serde_flex::i64_flex")]
    pub external_id: i64,
    /// External id of the owning category
    #[serde(rename = "vStrukture", deserialize_with = "serde_flex::i64_flex", default)]
    pub category_external_id: i64,
    #[serde(rename = "name", deserialize_with = "serde_flex::string_flex", default)]
    #[validate(length(min = 1, message = "product title is required"))]
    pub title: String,
    #[serde(rename = "poryadok", deserialize_with = "serde_flex::i32_flex", default)]
    pub sort_order: i32,
    #[serde(rename = "opisanie", deserialize_with = "serde_flex::string_flex", default)]
    pub description: String,
    #[serde(rename = "opisanieDop", deserialize_with = "serde_flex::string_flex", default)]
    pub extra: String,
    #[serde(rename = "link", deserialize_with = "serde_flex::string_flex", default)]
    pub address: String,
    #[serde(rename = "artikul", deserialize_with = "serde_flex::string_flex", default)]
    pub vendor_code: String,
    #[serde(rename = "strihKod", deserialize_with = "serde_flex::string_flex", default)]
    pub barcode: String,
    /// Cost price
    #[serde(rename = "sebestomost", deserialize_with = "serde_flex::cents_flex", default)]
    pub price_first: i64,
    #[serde(rename = "price", deserialize_with = "serde_flex::cents_flex", default)]
    pub price: i64,
    #[serde(rename = "opt_price", deserialize_with = "serde_flex::cents_flex", default)]
    pub price_wholesale: i64,
    /// Unit of measure, often with a trailing dot ("шт.")
    #[serde(rename = "edIzmer", deserialize_with = "serde_flex::string_flex", default)]
    pub unit: String,
    #[serde(rename = "ves", deserialize_with = "serde_flex::f64_flex", default)]
    pub weight: f64,
    #[serde(rename = "strana", deserialize_with = "serde_flex::string_flex", default)]
    pub country: String,
    #[serde(rename = "proizv", deserialize_with = "serde_flex::string_flex", default)]
    pub manufacturer: String,
    #[serde(rename = "tags", deserialize_with = "serde_flex::string_flex", default)]
    pub tags: String,
    #[serde(rename = "changeDate", deserialize_with = "serde_flex::string_flex", default)]
    pub changed_at: String,
    #[serde(rename = "kolvo", deserialize_with = "serde_flex::f64_flex", default)]
    pub stock: f64,
    #[serde(rename = "ind1", deserialize_with = "serde_flex::string_flex", default)]
    pub field1: String,
    #[serde(rename = "ind2", deserialize_with = "serde_flex::string_flex", default)]
    pub field2: String,
    #[serde(rename = "ind3", deserialize_with = "serde_flex::string_flex", default)]
    pub field3: String,
    #[serde(rename = "ind4", deserialize_with = "serde_flex::string_flex", default)]
    pub field4: String,
    /// Interpreted as a multi-value boolean tag list
    #[serde(rename = "ind5", deserialize_with = "serde_flex::string_flex", default)]
    pub field5: String,
    #[serde(rename = "foto", deserialize_with = "serde_flex::string_flex", default)]
    pub photo: String,
}

/// Row from the paginated `item/related` feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ErpRelationRecord {
    #[serde(rename = "idTovar1", deserialize_with = "serde_flex::i64_flex")]
    pub product_external_id: i64,
    #[serde(rename = "idTovar2", deserialize_with = "serde_flex::i64_flex")]
    pub related_external_id: i64,
    #[serde(rename = "kolvo", deserialize_with = "serde_flex::f64_flex", default = "default_quantity")]
    pub quantity: f64,
}

fn default_quantity() -> f64 {
    1.0
}

/// Response of `item/count`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErpCountResponse {
    #[serde(deserialize_with = "serde_flex::i64_flex", default)]
    pub count: i64,
}

/// Outbound line item serialized into the order payload's `tovarJson`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub name: String,
    pub quantity: f64,
    /// Line total (unit price × quantity), in currency units
    pub price: f64,
}

/// Sentinel order number the ERP returns when it rejects a submission.
pub const REJECTED_ORDER_NUMBER: &str = "-1";

/// Extract the ERP order number from an order-submission response.
///
/// The ERP sometimes wraps the result object in a single-element array;
/// unwrap it before looking for `nomerZakaza`. Returns `None` when the
/// response has any other shape.
pub fn order_number(response: &Value) -> Option<String> {
    let object = match response {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    };
    match object.get("nomerZakaza")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reference lists the ERP exposes for configuration (storages, legal
/// entities, payment accounts, contractors, document schemes, operators).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErpDirectory {
    pub schemes: BTreeMap<String, String>,
    pub storages: BTreeMap<String, String>,
    pub accounts: BTreeMap<String, String>,
    pub legal_entities: BTreeMap<String, String>,
    pub contractors: BTreeMap<String, String>,
    pub operators: BTreeMap<String, String>,
}

/// Collect `{key_field: value_field}` pairs from an array of objects,
/// tolerating missing fields and non-string scalars.
pub fn pluck(rows: &Value, key_field: &str, value_field: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Value::Array(items) = rows {
        for item in items {
            let key = item.get(key_field).map(scalar_to_string).unwrap_or_default();
            let value = item.get(value_field).map(scalar_to_string).unwrap_or_default();
            if !key.is_empty() {
                out.insert(key, value);
            }
        }
    }
    out
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
