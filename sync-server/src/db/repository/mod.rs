//! Repository Module
//!
//! CRUD access to the local catalog store. Upserts return a tagged outcome
//! instead of raising on uniqueness conflicts, so the reconciler can branch
//! on the tag.

pub mod attribute;
pub mod category;
pub mod media;
pub mod order;
pub mod product;

pub use attribute::AttributeRepository;
pub use category::CategoryRepository;
pub use media::MediaRepository;
pub use order::OrderRepository;
pub use product::ProductRepository;

use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepoError::NotFound(err.to_string()),
            other => RepoError::Database(other.to_string()),
        }
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

/// What kind of uniqueness conflict blocked an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The title is already taken by a row with a different external id;
    /// carries that row's local id so the caller can fall back to updating it
    Title { existing: i64 },
    /// Only the address collides
    Address,
}

/// Outcome of an `external_id`-keyed upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(i64),
    Updated(i64),
    Conflict(ConflictKind),
}
