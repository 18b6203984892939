//! Attribute Registry
//!
//! Guarantees the fixed set of ERP index-field attributes exists before a
//! pass writes any product values, mapping slot names to stable local ids.

use crate::db::repository::{AttributeRepository, RepoResult};
use shared::models::AttributeKind;

/// Index-field slots carried as plain string attributes. The fifth slot is a
/// multi-value tag list and expands into per-tag boolean attributes instead.
pub const STRING_SLOTS: usize = 4;

const SLOT_GROUP: &str = "erp";
const TAG_GROUP: &str = "erp-tags";

/// Slot name -> attribute id mapping resolved at pass start.
#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
    pub slots: [i64; STRING_SLOTS],
}

pub struct AttributeRegistry {
    repo: AttributeRepository,
}

impl AttributeRegistry {
    pub fn new(repo: AttributeRepository) -> Self {
        Self { repo }
    }

    /// Look up an attribute by its address key, creating it when absent.
    /// Running twice never creates duplicates.
    pub async fn ensure(
        &self,
        address: &str,
        title: &str,
        group: &str,
        kind: AttributeKind,
    ) -> RepoResult<i64> {
        if let Some(existing) = self.repo.find_by_address(address).await? {
            return Ok(existing.id);
        }
        let created = self.repo.create(address, title, group, kind).await?;
        tracing::info!(address = %address, id = created.id, "Registered attribute");
        Ok(created.id)
    }

    /// Register the index-field slots, once per pass.
    pub async fn ensure_index_fields(&self) -> RepoResult<IndexFields> {
        let mut slots = [0i64; STRING_SLOTS];
        for (i, slot) in slots.iter_mut().enumerate() {
            let number = i + 1;
            *slot = self
                .ensure(
                    &format!("field{number}"),
                    &format!("Index field {number}"),
                    SLOT_GROUP,
                    AttributeKind::String,
                )
                .await?;
        }
        Ok(IndexFields { slots })
    }

    /// Register a boolean tag attribute from the fifth index-field slot.
    pub async fn ensure_tag(&self, tag: &str) -> RepoResult<i64> {
        let address = format!("tag-{}", shared::util::slugify(tag));
        self.ensure(&address, tag, TAG_GROUP, AttributeKind::Boolean)
            .await
    }
}
