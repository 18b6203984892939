//! Product Repository

use super::{ConflictKind, RepoResult, UpsertOutcome};
use shared::models::{EntityStatus, Product, ProductDraft};
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;
use std::collections::HashMap;

#[derive(Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> RepoResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM product WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    pub async fn find_by_external_id(&self, external_id: i64) -> RepoResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM product WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    pub async fn find_by_status(&self, status: EntityStatus) -> RepoResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM product WHERE status = ? ORDER BY sort_order, id",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    /// Live products updated since the given timestamp (Unix millis)
    pub async fn find_updated_since(&self, since: i64) -> RepoResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM product WHERE status = ? AND updated_at > ? ORDER BY sort_order, id",
        )
        .bind(EntityStatus::Work)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    /// Upsert by external id with the same conflict tagging as categories.
    pub async fn upsert(&self, draft: &ProductDraft) -> RepoResult<UpsertOutcome> {
        let title_owner = sqlx::query_as::<_, Product>(
            "SELECT * FROM product WHERE title = ? AND external_id != ? LIMIT 1",
        )
        .bind(&draft.title)
        .bind(draft.external_id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(owner) = title_owner {
            return Ok(UpsertOutcome::Conflict(ConflictKind::Title {
                existing: owner.id,
            }));
        }

        let address_owner = sqlx::query_as::<_, Product>(
            "SELECT * FROM product WHERE address = ? AND address != '' AND external_id != ? LIMIT 1",
        )
        .bind(&draft.address)
        .bind(draft.external_id)
        .fetch_optional(&self.pool)
        .await?;
        if address_owner.is_some() {
            return Ok(UpsertOutcome::Conflict(ConflictKind::Address));
        }

        match self.find_by_external_id(draft.external_id).await? {
            Some(existing) => {
                self.write_fields(existing.id, draft).await?;
                Ok(UpsertOutcome::Updated(existing.id))
            }
            None => {
                let id = snowflake_id();
                sqlx::query(
                    "INSERT INTO product (id, external_id, category_id, title, address, \
                     sort_order, description, extra, vendor_code, barcode, price, \
                     price_wholesale, price_first, stock, weight, unit, country, manufacturer, \
                     tags, field1, field2, field3, field4, field5, status, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(id)
                .bind(draft.external_id)
                .bind(draft.category_id)
                .bind(&draft.title)
                .bind(&draft.address)
                .bind(draft.sort_order)
                .bind(&draft.description)
                .bind(&draft.extra)
                .bind(&draft.vendor_code)
                .bind(&draft.barcode)
                .bind(draft.price)
                .bind(draft.price_wholesale)
                .bind(draft.price_first)
                .bind(draft.stock)
                .bind(draft.weight)
                .bind(&draft.unit)
                .bind(&draft.country)
                .bind(&draft.manufacturer)
                .bind(&draft.tags)
                .bind(&draft.field1)
                .bind(&draft.field2)
                .bind(&draft.field3)
                .bind(&draft.field4)
                .bind(&draft.field5)
                .bind(EntityStatus::Work)
                .bind(now_millis())
                .execute(&self.pool)
                .await?;
                Ok(UpsertOutcome::Created(id))
            }
        }
    }

    /// Title-collision fallback: overwrite the colliding row, adopting its
    /// external id.
    pub async fn adopt(&self, id: i64, draft: &ProductDraft) -> RepoResult<()> {
        sqlx::query("UPDATE product SET external_id = ? WHERE id = ?")
            .bind(draft.external_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.write_fields(id, draft).await
    }

    async fn write_fields(&self, id: i64, draft: &ProductDraft) -> RepoResult<()> {
        sqlx::query(
            "UPDATE product SET category_id = ?, title = ?, address = ?, sort_order = ?, \
             description = ?, extra = ?, vendor_code = ?, barcode = ?, price = ?, \
             price_wholesale = ?, price_first = ?, stock = ?, weight = ?, unit = ?, \
             country = ?, manufacturer = ?, tags = ?, field1 = ?, field2 = ?, field3 = ?, \
             field4 = ?, field5 = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(draft.category_id)
        .bind(&draft.title)
        .bind(&draft.address)
        .bind(draft.sort_order)
        .bind(&draft.description)
        .bind(&draft.extra)
        .bind(&draft.vendor_code)
        .bind(&draft.barcode)
        .bind(draft.price)
        .bind(draft.price_wholesale)
        .bind(draft.price_first)
        .bind(draft.stock)
        .bind(draft.weight)
        .bind(&draft.unit)
        .bind(&draft.country)
        .bind(&draft.manufacturer)
        .bind(&draft.tags)
        .bind(&draft.field1)
        .bind(&draft.field2)
        .bind(&draft.field3)
        .bind(&draft.field4)
        .bind(&draft.field5)
        .bind(EntityStatus::Work)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_address(&self, id: i64, address: &str) -> RepoResult<()> {
        sqlx::query("UPDATE product SET address = ? WHERE id = ?")
            .bind(address)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace a product's attribute values in one transaction
    pub async fn set_attribute_values(
        &self,
        product_id: i64,
        values: &[(i64, String)],
    ) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM product_attribute WHERE product_id = ?")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        for (attribute_id, value) in values {
            sqlx::query(
                "INSERT INTO product_attribute (product_id, attribute_id, value) VALUES (?, ?, ?)",
            )
            .bind(product_id)
            .bind(attribute_id)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn attribute_values(&self, product_id: i64) -> RepoResult<HashMap<i64, String>> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT attribute_id, value FROM product_attribute WHERE product_id = ?",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Replace a product's relation map in one transaction (batched write,
    /// called once per product after the full feed is consumed)
    pub async fn set_relations(
        &self,
        product_id: i64,
        relations: &HashMap<i64, f64>,
    ) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM product_relation WHERE product_id = ?")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        for (related_id, quantity) in relations {
            sqlx::query(
                "INSERT INTO product_relation (product_id, related_id, quantity) VALUES (?, ?, ?)",
            )
            .bind(product_id)
            .bind(related_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn relations(&self, product_id: i64) -> RepoResult<HashMap<i64, f64>> {
        let rows = sqlx::query_as::<_, (i64, f64)>(
            "SELECT related_id, quantity FROM product_relation WHERE product_id = ?",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Batched status transition
    pub async fn set_status(&self, ids: &[i64], status: EntityStatus) -> RepoResult<u64> {
        let mut affected = 0;
        let mut tx = self.pool.begin().await?;
        for id in ids {
            let result = sqlx::query("UPDATE product SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status)
                .bind(now_millis())
                .bind(id)
                .execute(&mut *tx)
                .await?;
            affected += result.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }
}
