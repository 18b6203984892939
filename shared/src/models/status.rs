//! Entity lifecycle status.

use serde::{Deserialize, Serialize};

/// Soft-delete status shared by categories and products.
///
/// `Work` entities are live; `Delete` entities are retained for referential
/// integrity (orders keep pointing at them) but excluded from sync and
/// publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
pub enum EntityStatus {
    Work,
    Delete,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Work => "work",
            EntityStatus::Delete => "delete",
        }
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
