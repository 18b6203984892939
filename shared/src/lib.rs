//! Shared domain types for the catalog synchronization engine.
//!
//! Holds the local catalog models (categories, products, attributes, orders,
//! media), the ERP wire-record types with tolerant deserialization, and small
//! utilities used by both the engine and its tests.

pub mod erp;
pub mod models;
pub mod util;

pub use models::{
    Attribute, AttributeKind, Category, CategoryDraft, EntityStatus, ImageRequest, MediaEntityType,
    MediaFile, Order, OrderCreate, OrderRouting, OrderType, Product, ProductDraft,
};
