//! Engine event bus
//!
//! Broadcast channel connecting the engine to its external collaborators.
//! The engine subscribes to storefront signals (order created, product
//! edited, catalog imported, order paid) and publishes its own completions
//! (images downloaded, catalog imported, reindex requested).

use shared::models::OrderRouting;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Storefront checkout created an order
    OrderCreated { order_id: i64, routing: OrderRouting },
    /// Payment confirmed for an already-exported order
    OrderPaid { order_id: i64 },
    /// A product was edited locally
    ProductEdited { product_id: i64 },
    /// A catalog import finished (local import or a completed sync pass)
    CatalogImported,
    /// The reconciler asks the search collaborator to rebuild its index
    ReindexRequested,
    /// Image materialization finished for these media files
    ImagesDownloaded { file_ids: Vec<i64> },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::OrderCreated { .. } => "order:created",
            EngineEvent::OrderPaid { .. } => "order:paid",
            EngineEvent::ProductEdited { .. } => "product:edited",
            EngineEvent::CatalogImported => "catalog:imported",
            EngineEvent::ReindexRequested => "search:reindex",
            EngineEvent::ImagesDownloaded { .. } => "image:downloaded",
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: EngineEvent) {
        tracing::debug!(event = %event.name(), "Event published");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
