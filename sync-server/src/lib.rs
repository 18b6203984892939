//! Catalog synchronization engine.
//!
//! Keeps a storefront's catalog in step with an external trade/warehouse ERP:
//! pulls the paginated catalog snapshot and reconciles it (create / update /
//! soft-delete with tree rebuild), exports locally created orders exactly
//! once, materializes remote photos into linked media, and pushes local
//! product edits back as bulk updates.

pub mod core;
pub mod db;
pub mod gateway;
pub mod sync;
pub mod utils;

pub use crate::core::{
    EngineEvent, ErpConfig, EventBus, Job, JobContext, JobHandle, JobOutcome, JobQueue, JobState,
    LogNotifier, Notifier, OrphanPolicy, PricingPolicy, StockCheckPolicy, SyncConfig, SyncContext,
};
pub use crate::db::DbService;
pub use crate::gateway::{ApiMethod, ErpGateway, HttpErpGateway};
pub use crate::sync::{
    CatalogDownloadJob, CatalogUploadJob, DownloadImagesJob, EventListener, ExportStatus,
    SendOrderJob, SyncError,
};
