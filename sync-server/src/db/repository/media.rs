//! Media Repository
//!
//! Downloaded files linked to catalog entities. Re-materializing an entity
//! replaces its whole link set, preserving display order.

use super::RepoResult;
use shared::models::{MediaEntityType, MediaFile};
use shared::util::snowflake_id;
use sqlx::SqlitePool;

/// New media link payload
#[derive(Debug, Clone)]
pub struct MediaFileCreate {
    pub hash: String,
    pub name: String,
    pub content_type: String,
}

#[derive(Clone)]
pub struct MediaRepository {
    pool: SqlitePool,
}

impl MediaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace all files linked to an entity, in the given display order.
    /// Returns the inserted rows.
    pub async fn replace_for_entity(
        &self,
        entity_type: MediaEntityType,
        entity_id: i64,
        files: &[MediaFileCreate],
    ) -> RepoResult<Vec<MediaFile>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM media_file WHERE entity_type = ? AND entity_id = ?")
            .bind(entity_type)
            .bind(entity_id)
            .execute(&mut *tx)
            .await?;

        let mut inserted = Vec::with_capacity(files.len());
        for (order, file) in files.iter().enumerate() {
            let id = snowflake_id();
            sqlx::query(
                "INSERT INTO media_file (id, entity_type, entity_id, hash, name, content_type, \
                 display_order) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(entity_type)
            .bind(entity_id)
            .bind(&file.hash)
            .bind(&file.name)
            .bind(&file.content_type)
            .bind(order as i32)
            .execute(&mut *tx)
            .await?;
            inserted.push(MediaFile {
                id,
                entity_type,
                entity_id,
                hash: file.hash.clone(),
                name: file.name.clone(),
                content_type: file.content_type.clone(),
                display_order: order as i32,
            });
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn list_for_entity(
        &self,
        entity_type: MediaEntityType,
        entity_id: i64,
    ) -> RepoResult<Vec<MediaFile>> {
        let files = sqlx::query_as::<_, MediaFile>(
            "SELECT * FROM media_file WHERE entity_type = ? AND entity_id = ? \
             ORDER BY display_order",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }
}
