//! Attribute Repository

use super::{RepoError, RepoResult};
use shared::models::{Attribute, AttributeKind};
use shared::util::snowflake_id;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AttributeRepository {
    pool: SqlitePool,
}

impl AttributeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_all(&self) -> RepoResult<Vec<Attribute>> {
        let attributes =
            sqlx::query_as::<_, Attribute>("SELECT * FROM attribute ORDER BY address")
                .fetch_all(&self.pool)
                .await?;
        Ok(attributes)
    }

    /// Find attribute by its stable address key
    pub async fn find_by_address(&self, address: &str) -> RepoResult<Option<Attribute>> {
        let attribute = sqlx::query_as::<_, Attribute>("SELECT * FROM attribute WHERE address = ?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(attribute)
    }

    pub async fn create(
        &self,
        address: &str,
        title: &str,
        group: &str,
        kind: AttributeKind,
    ) -> RepoResult<Attribute> {
        if address.is_empty() {
            return Err(RepoError::Validation("attribute address is required".into()));
        }
        let id = snowflake_id();
        sqlx::query(
            "INSERT INTO attribute (id, address, title, attr_group, kind) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(address)
        .bind(title)
        .bind(group)
        .bind(kind)
        .execute(&self.pool)
        .await?;
        Ok(Attribute {
            id,
            address: address.to_string(),
            title: title.to_string(),
            group: group.to_string(),
            kind,
        })
    }
}
