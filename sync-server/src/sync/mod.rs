//! Synchronization tasks: reconciler, order export, image materialization,
//! catalog publish, and the event listener wiring storefront signals to jobs.

pub mod attributes;
pub mod images;
pub mod order_export;
pub mod publisher;
pub mod reconciler;

pub use attributes::{AttributeRegistry, IndexFields};
pub use images::DownloadImagesJob;
pub use order_export::{ExportStatus, SendOrderJob};
pub use publisher::CatalogUploadJob;
pub use reconciler::{CatalogDownloadJob, PassSummary};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::core::jobs::JobQueue;
use crate::core::{EngineEvent, SyncContext};
use crate::db::repository::RepoError;

/// Errors aborting a sync task.
///
/// Per-item problems (lookup misses, validation conflicts) are handled and
/// logged in place; only unexpected conditions bubble up here and fail the
/// current pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Repo(#[from] RepoError),

    #[error("Category {external_id} has an unresolvable parent")]
    OrphanRejected { external_id: i64 },

    #[error("Order {0} not found")]
    OrderNotFound(i64),

    #[error("Payload error: {0}")]
    Payload(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Listener turning storefront events into background jobs.
///
/// Subscribes to the engine bus and dispatches: order creation triggers an
/// export, product edits and catalog imports trigger an auto-upload (when
/// configured), payment signals are forwarded to the notifier.
pub struct EventListener {
    ctx: SyncContext,
    queue: JobQueue,
    shutdown: CancellationToken,
}

impl EventListener {
    pub fn new(ctx: SyncContext, queue: JobQueue, shutdown: CancellationToken) -> Self {
        Self {
            ctx,
            queue,
            shutdown,
        }
    }

    pub async fn run(self) {
        tracing::info!("EventListener started");
        let mut events = self.ctx.bus.subscribe();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("EventListener shutting down");
                    break;
                }

                result = events.recv() => {
                    match result {
                        Ok(event) => self.handle(event).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("EventListener lagged {n} events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Event bus closed, EventListener stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&self, event: EngineEvent) {
        match event {
            EngineEvent::OrderCreated { order_id, routing } => {
                self.queue.enqueue(Box::new(SendOrderJob::new(
                    self.ctx.clone(),
                    order_id,
                    routing,
                )));
            }
            EngineEvent::OrderPaid { order_id } => {
                match self.ctx.orders().find_by_id(order_id).await {
                    Ok(Some(order)) => self.ctx.notifier.payment_received(&order),
                    Ok(None) => {
                        tracing::warn!(order_id, "Paid order not found");
                    }
                    Err(e) => {
                        tracing::error!(order_id, error = %e, "Failed to load paid order");
                    }
                }
            }
            EngineEvent::ProductEdited { .. } | EngineEvent::CatalogImported => {
                if self.ctx.config.auto_upload {
                    self.queue
                        .enqueue(Box::new(CatalogUploadJob::new(self.ctx.clone(), true)));
                }
            }
            EngineEvent::ReindexRequested | EngineEvent::ImagesDownloaded { .. } => {
                // Consumed by external collaborators (search, image
                // conversion); nothing to do here.
            }
        }
    }
}
