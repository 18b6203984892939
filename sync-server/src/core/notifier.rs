//! Outbound notification seam
//!
//! Confirmation mail and admin notices are composed by an external
//! collaborator; the engine only signals it through this trait.

use shared::models::Order;

pub trait Notifier: Send + Sync {
    /// The ERP accepted an order and assigned it a number
    fn order_confirmed(&self, order: &Order);

    /// A previously exported order was paid
    fn payment_received(&self, order: &Order);
}

/// Default notifier: records the signal in the log and nothing else.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn order_confirmed(&self, order: &Order) {
        tracing::info!(
            order_id = order.id,
            external_id = order.external_id.as_deref().unwrap_or(""),
            "Order confirmed by ERP"
        );
    }

    fn payment_received(&self, order: &Order) {
        tracing::info!(order_id = order.id, "Order payment received");
    }
}
