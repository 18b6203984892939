//! Order Repository
//!
//! Orders map their line items as a JSON column (product id -> quantity), so
//! rows are mapped by hand instead of through FromRow.

use super::{RepoError, RepoResult};
use chrono::{DateTime, Utc};
use shared::models::{Order, OrderCreate};
use shared::util::{now_millis, snowflake_id};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

#[derive(Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, data: OrderCreate) -> RepoResult<Order> {
        let id = snowflake_id();
        let now = now_millis();
        let items_json = serde_json::to_string(&data.items)
            .map_err(|e| RepoError::Validation(format!("Unserializable order items: {e}")))?;

        sqlx::query(
            "INSERT INTO catalog_order (id, external_id, items, client, address, phone, email, \
             comment, shipping_at, user_id, system, created_at, updated_at) \
             VALUES (?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
        )
        .bind(id)
        .bind(&items_json)
        .bind(&data.client)
        .bind(&data.address)
        .bind(&data.phone)
        .bind(&data.email)
        .bind(&data.comment)
        .bind(data.shipping_at)
        .bind(data.user_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepoError::Database("Failed to create order".into()))
    }

    pub async fn find_by_id(&self, id: i64) -> RepoResult<Option<Order>> {
        let row = sqlx::query("SELECT * FROM catalog_order WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(map_order).transpose()
    }

    /// Record the ERP order number, exactly once.
    ///
    /// Returns `false` when the order already carries an external id — the
    /// guard that makes a second export attempt a no-op.
    pub async fn set_external_id(&self, id: i64, external_id: &str) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE catalog_order SET external_id = ?, updated_at = ? \
             WHERE id = ? AND external_id IS NULL",
        )
        .bind(external_id)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Store the raw payload of a failed or ambiguous export attempt.
    pub async fn set_diagnostic(&self, id: i64, payload: &serde_json::Value) -> RepoResult<()> {
        let json = payload.to_string();
        sqlx::query("UPDATE catalog_order SET system = ?, updated_at = ? WHERE id = ?")
            .bind(json)
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn map_order(row: SqliteRow) -> RepoResult<Order> {
    let items_json: String = row.try_get("items")?;
    let items: HashMap<i64, f64> = serde_json::from_str(&items_json)
        .map_err(|e| RepoError::Database(format!("Corrupt order items column: {e}")))?;
    let system_json: Option<String> = row.try_get("system")?;
    let system = match system_json {
        Some(raw) => Some(
            serde_json::from_str(&raw)
                .map_err(|e| RepoError::Database(format!("Corrupt order system column: {e}")))?,
        ),
        None => None,
    };
    let shipping_at: Option<DateTime<Utc>> = row.try_get("shipping_at")?;

    Ok(Order {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        items,
        client: row.try_get("client")?,
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        comment: row.try_get("comment")?,
        shipping_at,
        user_id: row.try_get("user_id")?,
        system,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
