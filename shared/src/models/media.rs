//! Media file records and image download requests.

use serde::{Deserialize, Serialize};

/// Entity kinds that can own downloaded media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
pub enum MediaEntityType {
    Category,
    Product,
}

impl MediaEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaEntityType::Category => "category",
            MediaEntityType::Product => "product",
        }
    }
}

impl std::fmt::Display for MediaEntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A downloaded file linked to a catalog entity.
///
/// Files are content-addressed: `name` is `{sha256 hex}.{ext}` under the
/// engine's images directory. Re-materializing an entity replaces all of its
/// previously linked rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct MediaFile {
    pub id: i64,
    pub entity_type: MediaEntityType,
    pub entity_id: i64,
    /// SHA256 of the file contents (hex)
    pub hash: String,
    /// Stored file name, `{hash}.{ext}`
    pub name: String,
    pub content_type: String,
    pub display_order: i32,
}

impl MediaFile {
    /// Public path this file is served under.
    pub fn public_path(&self) -> String {
        format!("/files/{}", self.name)
    }
}

/// Image download request collected during a reconciliation pass.
///
/// Ephemeral: handed to the image materializer job, never persisted.
/// `photo_ref` is the ERP's semicolon-delimited list of remote file names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    pub photo_ref: String,
    pub entity_type: MediaEntityType,
    pub entity_id: i64,
}
