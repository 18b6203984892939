//! Order Model
//!
//! Orders are created by the storefront checkout (an external collaborator)
//! and mutated exactly once by the order exporter, which records the ERP's
//! order number as `external_id`. Ambiguous ERP responses land in `system`
//! as diagnostic data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// ERP order number; set exactly once on successful export
    pub external_id: Option<String>,
    /// Line items: product id -> quantity
    pub items: HashMap<i64, f64>,
    pub client: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub comment: String,
    pub shipping_at: Option<DateTime<Utc>>,
    /// Registered customer id, `None` for anonymous checkout
    pub user_id: Option<i64>,
    /// Raw diagnostic payload from the last failed/ambiguous export attempt
    pub system: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create order payload (used by the checkout collaborator and tests).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderCreate {
    #[serde(default)]
    pub items: HashMap<i64, f64>,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub comment: String,
    pub shipping_at: Option<DateTime<Utc>>,
    pub user_id: Option<i64>,
}

/// How an order should be routed to the ERP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Stock reservation placed by phone or from the cart
    Reservation,
    /// Commercial quote request
    Quote,
    /// Plain anonymous checkout
    Checkout,
}

impl Default for OrderType {
    fn default() -> Self {
        OrderType::Checkout
    }
}

/// Routing hints accompanying an export request.
///
/// `document_number`/`document_line` address an existing ERP document when a
/// reservation extends one; `contact_id` binds the order to a known ERP
/// contact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderRouting {
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default)]
    pub contact_id: String,
    #[serde(default)]
    pub document_number: String,
    #[serde(default)]
    pub document_line: String,
    #[serde(default)]
    pub passport: String,
}
