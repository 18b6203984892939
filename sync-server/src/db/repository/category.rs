//! Category Repository

use super::{ConflictKind, RepoResult, UpsertOutcome};
use shared::models::{Category, CategoryDraft, EntityStatus};
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All categories regardless of status, ordered by sort_order
    pub async fn find_all(&self) -> RepoResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT * FROM category ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    pub async fn find_by_status(&self, status: EntityStatus) -> RepoResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT * FROM category WHERE status = ? ORDER BY sort_order, id",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    pub async fn find_by_id(&self, id: i64) -> RepoResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM category WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    pub async fn find_by_external_id(&self, external_id: i64) -> RepoResult<Option<Category>> {
        let category =
            sqlx::query_as::<_, Category>("SELECT * FROM category WHERE external_id = ?")
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(category)
    }

    /// Upsert by external id, reporting uniqueness conflicts as a tag.
    ///
    /// Title conflicts carry the colliding row's id so the reconciler can
    /// fall back to updating that row instead.
    pub async fn upsert(&self, draft: &CategoryDraft) -> RepoResult<UpsertOutcome> {
        let title_owner = sqlx::query_as::<_, Category>(
            "SELECT * FROM category WHERE title = ? AND external_id != ? LIMIT 1",
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

        let address_owner = sqlx::query_as::<_, Category>(
            "SELECT * FROM category WHERE address = ? AND address != '' AND external_id != ? LIMIT 1",
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
                    "INSERT INTO category (id, external_id, title, address, sort_order, \
                     description, field1, field2, field3, status, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(id)
                .bind(draft.external_id)
                .bind(&draft.title)
                .bind(&draft.address)
                .bind(draft.sort_order)
                .bind(&draft.description)
                .bind(&draft.field1)
                .bind(&draft.field2)
                .bind(&draft.field3)
                .bind(EntityStatus::Work)
                .bind(now_millis())
                .execute(&self.pool)
                .await?;
                Ok(UpsertOutcome::Created(id))
            }
        }
    }

    /// Overwrite a row with the draft, adopting its external id.
    ///
    /// Used for the title-collision fallback: the colliding row becomes the
    /// local representation of the incoming ERP record.
    pub async fn adopt(&self, id: i64, draft: &CategoryDraft) -> RepoResult<()> {
        sqlx::query("UPDATE category SET external_id = ? WHERE id = ?")
            .bind(draft.external_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.write_fields(id, draft).await
    }

    async fn write_fields(&self, id: i64, draft: &CategoryDraft) -> RepoResult<()> {
        sqlx::query(
            "UPDATE category SET title = ?, address = ?, sort_order = ?, description = ?, \
             field1 = ?, field2 = ?, field3 = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&draft.title)
        .bind(&draft.address)
        .bind(draft.sort_order)
        .bind(&draft.description)
        .bind(&draft.field1)
        .bind(&draft.field2)
        .bind(&draft.field3)
        .bind(EntityStatus::Work)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_parent(&self, id: i64, parent_id: Option<i64>) -> RepoResult<()> {
        sqlx::query("UPDATE category SET parent_id = ? WHERE id = ?")
            .bind(parent_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_address(&self, id: i64, address: &str) -> RepoResult<()> {
        sqlx::query("UPDATE category SET address = ? WHERE id = ?")
            .bind(address)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Batched status transition
    pub async fn set_status(&self, ids: &[i64], status: EntityStatus) -> RepoResult<u64> {
        let mut affected = 0;
        let mut tx = self.pool.begin().await?;
        for id in ids {
            let result = sqlx::query("UPDATE category SET status = ?, updated_at = ? WHERE id = ?")
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
