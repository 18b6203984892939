//! Order Exporter
//!
//! Pushes a locally created order to the ERP, exactly once. The recorded
//! `external_id` is the idempotency guard: an order that already carries one
//! is never submitted again.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::core::config::{PricingPolicy, StockCheckPolicy};
use crate::core::jobs::{Job, JobContext, JobOutcome};
use crate::core::SyncContext;
use crate::gateway::ApiMethod;
use crate::sync::SyncError;
use shared::erp::{self, OrderLine, REJECTED_ORDER_NUMBER};
use shared::models::{Order, OrderRouting, OrderType};

/// How an export attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    /// ERP confirmed the order and assigned a number
    Done,
    /// ERP accepted the call but did not confirm order creation; the raw
    /// response was stored as diagnostic data
    DoneWithDiagnostics,
    /// Order already exported; no gateway call was made
    Cancelled,
    Failed,
}

/// Background job exporting one order.
pub struct SendOrderJob {
    ctx: SyncContext,
    order_id: i64,
    routing: OrderRouting,
}

impl SendOrderJob {
    pub fn new(ctx: SyncContext, order_id: i64, routing: OrderRouting) -> Self {
        Self {
            ctx,
            order_id,
            routing,
        }
    }

    /// Submission endpoint for the order's routing.
    fn endpoint(&self) -> &'static str {
        match self.routing.order_type {
            OrderType::Reservation => {
                if self.routing.document_number.is_empty() {
                    "order/cart/rezervTel"
                } else {
                    "custom/addRezervTovarTblKontaktSite"
                }
            }
            OrderType::Quote => "order/cart/kpTel",
            OrderType::Checkout => "order/cart/anonym",
        }
    }

    /// Whether the ERP should verify stock for this order.
    fn stock_check_flag(&self, order: &Order) -> &'static str {
        let check = match self.ctx.config.stock_check_policy {
            StockCheckPolicy::Always => true,
            StockCheckPolicy::RegisteredOnly => order.user_id.is_some(),
            StockCheckPolicy::Never => false,
        };
        if check { "1" } else { "0" }
    }

    /// Build the line-item list. Only products the ERP knows (those carrying
    /// an external id) are exportable; wholesale prices apply when configured
    /// and the order has a registered user.
    async fn build_lines(&self, order: &Order) -> Result<Vec<OrderLine>, SyncError> {
        let wholesale = self.ctx.config.pricing_policy == PricingPolicy::Wholesale
            && order.user_id.is_some();

        let repo = self.ctx.products();
        let mut lines = Vec::new();
        for (&product_id, &quantity) in &order.items {
            let Some(product) = repo.find_by_id(product_id).await? else {
                tracing::warn!(product_id, "Order line product missing, skipped");
                continue;
            };
            if product.external_id == 0 {
                tracing::warn!(product_id, "Order line product has no external id, skipped");
                continue;
            }
            let unit_cents = if wholesale {
                product.price_wholesale
            } else {
                product.price
            };
            let line_total = Decimal::new(unit_cents, 2) * Decimal::from_f64_retain(quantity)
                .unwrap_or_default();
            lines.push(OrderLine {
                id: product.external_id,
                name: product.title.clone(),
                quantity,
                price: line_total.to_f64().unwrap_or(0.0),
            });
        }
        Ok(lines)
    }

    async fn export(&self, order: &Order) -> Result<ExportStatus, SyncError> {
        let config = &self.ctx.config;
        let lines = self.build_lines(order).await?;
        let lines_json = serde_json::to_string(&lines)
            .map_err(|e| SyncError::Payload(format!("Unserializable order lines: {e}")))?;
        let shipping = order
            .shipping_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();

        let params = vec![
            ("sklad".to_string(), config.storage.clone()),
            ("urlico".to_string(), config.legal_entity.clone()),
            ("ds".to_string(), config.checkout.clone()),
            ("kontragent".to_string(), config.contractor.clone()),
            ("shema".to_string(), config.scheme.clone()),
            ("valuta".to_string(), config.erp.currency.clone()),
            ("userID".to_string(), config.operator.clone()),
            ("nameKontakt".to_string(), order.client.clone()),
            ("adresKontakt".to_string(), order.address.clone()),
            ("telefonKontakt".to_string(), order.phone.clone()),
            ("other1Kontakt".to_string(), order.email.clone()),
            ("other2Kontakt".to_string(), self.routing.passport.clone()),
            ("dateDost".to_string(), shipping),
            ("komment".to_string(), order.comment.clone()),
            ("tovarJson".to_string(), lines_json),
            ("idKontakt".to_string(), self.routing.contact_id.clone()),
            ("nomDoc".to_string(), self.routing.document_number.clone()),
            ("nomerStr".to_string(), self.routing.document_line.clone()),
            ("nalich".to_string(), self.stock_check_flag(order).to_string()),
            ("so".to_string(), String::new()),
        ];

        let response = self
            .ctx
            .gateway
            .call(ApiMethod::Post, self.endpoint(), &params)
            .await;

        let orders = self.ctx.orders();
        match erp::order_number(&response) {
            Some(number) if number == REJECTED_ORDER_NUMBER => {
                // Sentinel rejection: diagnostic, not success
                tracing::warn!(order_id = order.id, "ERP rejected the order");
                orders.set_diagnostic(order.id, &response).await?;
                Ok(ExportStatus::Failed)
            }
            Some(number) => {
                if orders.set_external_id(order.id, &number).await? {
                    tracing::info!(order_id = order.id, external_id = %number, "Order exported");
                    if let Some(updated) = orders.find_by_id(order.id).await? {
                        self.ctx.notifier.order_confirmed(&updated);
                    }
                    Ok(ExportStatus::Done)
                } else {
                    // Raced with another export; the first writer wins
                    tracing::warn!(order_id = order.id, "Order already exported concurrently");
                    Ok(ExportStatus::Cancelled)
                }
            }
            None => {
                let is_empty = matches!(&response, Value::Array(items) if items.is_empty())
                    || response.is_null();
                if is_empty {
                    tracing::warn!(order_id = order.id, "ERP returned no data for order export");
                    return Ok(ExportStatus::Failed);
                }
                // The call went through but the ERP did not confirm creation;
                // preserve the payload for diagnosis and report the
                // distinction to the caller.
                tracing::warn!(
                    order_id = order.id,
                    payload = %response,
                    "Ambiguous ERP order response stored as diagnostic"
                );
                orders.set_diagnostic(order.id, &response).await?;
                Ok(ExportStatus::DoneWithDiagnostics)
            }
        }
    }

    /// Export entry point used by the job wrapper and tests.
    pub async fn execute(&self) -> Result<ExportStatus, SyncError> {
        let orders = self.ctx.orders();
        let Some(order) = orders.find_by_id(self.order_id).await? else {
            return Err(SyncError::OrderNotFound(self.order_id));
        };

        // Idempotency guard: once exported, a second attempt is a no-op
        if order.external_id.is_some() {
            tracing::info!(order_id = order.id, "Order already exported, cancelling");
            return Ok(ExportStatus::Cancelled);
        }

        self.export(&order).await
    }
}

#[async_trait]
impl Job for SendOrderJob {
    fn name(&self) -> &'static str {
        "order:send"
    }

    async fn run(self: Box<Self>, ctx: &JobContext) -> JobOutcome {
        ctx.set_progress(10);
        match self.execute().await {
            Ok(ExportStatus::Done) | Ok(ExportStatus::DoneWithDiagnostics) => JobOutcome::Done,
            Ok(ExportStatus::Cancelled) => JobOutcome::Cancelled,
            Ok(ExportStatus::Failed) => JobOutcome::Failed,
            Err(e) => {
                tracing::error!(order_id = self.order_id, error = %e, "Order export failed");
                JobOutcome::Failed
            }
        }
    }
}
