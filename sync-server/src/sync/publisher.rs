//! Catalog Publisher
//!
//! The "upload" direction: serializes local products into the ERP's
//! bulk-update XML payload and pushes them in fixed-size batches. A batch the
//! ERP rejects is logged; the run carries on.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::core::jobs::{Job, JobContext, JobOutcome};
use crate::core::SyncContext;
use crate::gateway::ApiMethod;
use crate::sync::SyncError;
use shared::models::{EntityStatus, MediaEntityType, Product};
use shared::util::{now_millis, rescale};

/// "Recently updated" window for event-triggered uploads
const UPDATED_WINDOW_MS: i64 = 5 * 60 * 1000;

pub struct CatalogUploadJob {
    ctx: SyncContext,
    /// Restrict the push to recently updated products
    only_updated: bool,
}

impl CatalogUploadJob {
    pub fn new(ctx: SyncContext, only_updated: bool) -> Self {
        Self { ctx, only_updated }
    }

    async fn upload(&self, job: &JobContext) -> Result<usize, SyncError> {
        let products = if self.only_updated {
            let since = now_millis() - UPDATED_WINDOW_MS;
            let recent = self.ctx.products().find_updated_since(since).await?;
            tracing::info!(count = recent.len(), "Uploading only recently updated products");
            recent
        } else {
            self.ctx.products().find_by_status(EntityStatus::Work).await?
        };

        if products.is_empty() {
            return Ok(0);
        }

        let image_urls = self.collect_image_urls(&products).await?;

        let batch_size = self.ctx.config.upload_batch_size.max(1);
        let total_batches = products.len().div_ceil(batch_size);

        for (index, batch) in products.chunks(batch_size).enumerate() {
            if job.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let payload = build_batch_xml(batch, &image_urls);
            let params = vec![("tovarxml".to_string(), payload)];
            let response = self
                .ctx
                .gateway
                .call(ApiMethod::Post, "item/updateTovarSite", &params)
                .await;

            if response.as_array().is_some_and(|items| items.is_empty()) {
                tracing::warn!(batch = index, "ERP rejected or ignored upload batch");
            } else {
                tracing::info!(batch = index, count = batch.len(), "Uploaded catalog batch");
            }

            job.set_progress(rescale(
                (index + 1) as f64,
                0.0,
                total_batches as f64,
                0.0,
                100.0,
            ) as u8);
        }

        Ok(products.len())
    }

    /// Public URLs of the media linked to each product.
    async fn collect_image_urls(
        &self,
        products: &[Product],
    ) -> Result<HashMap<i64, Vec<String>>, SyncError> {
        let media = self.ctx.media();
        let host = self.ctx.config.public_host.trim_end_matches('/');
        let mut urls: HashMap<i64, Vec<String>> = HashMap::new();
        for product in products {
            let files = media
                .list_for_entity(MediaEntityType::Product, product.id)
                .await?;
            if files.is_empty() {
                continue;
            }
            urls.insert(
                product.id,
                files
                    .iter()
                    .map(|file| format!("{host}{}", file.public_path()))
                    .collect(),
            );
        }
        Ok(urls)
    }
}

/// Serialize one batch into the ERP's `<Attributes>` document.
fn build_batch_xml(products: &[Product], image_urls: &HashMap<i64, Vec<String>>) -> String {
    let mut output = String::from("<Attributes>");
    for product in products {
        let images = image_urls
            .get(&product.id)
            .map(|urls| urls.join(","))
            .unwrap_or_default();
        output.push_str(&format!(
            "\n    <ProductAttribute idTovar=\"{}\">\n        <ProductAttributeValue>\n",
            product.external_id
        ));
        let fields: [(&str, String); 21] = [
            ("name", xml_escape(&product.title)),
            ("opisanie", xml_escape(&product.description)),
            ("opisanieDop", xml_escape(&product.extra)),
            ("artikul", xml_escape(&product.vendor_code)),
            ("edIzmer", xml_escape(&product.unit)),
            ("strihKod", xml_escape(&product.barcode)),
            ("poryadok", product.sort_order.to_string()),
            ("foto", xml_escape(&images)),
            ("link", xml_escape(&product.address)),
            ("sebestoim", cents_to_decimal(product.price_first)),
            ("price", cents_to_decimal(product.price)),
            ("opt_price", cents_to_decimal(product.price_wholesale)),
            ("kolvo", product.stock.to_string()),
            ("ind1", xml_escape(&product.field1)),
            ("ind2", xml_escape(&product.field2)),
            ("ind3", xml_escape(&product.field3)),
            ("ind4", xml_escape(&product.field4)),
            ("ind5", xml_escape(&product.field5)),
            ("tags", xml_escape(&product.tags)),
            ("ves", product.weight.to_string()),
            ("proizv", xml_escape(&product.manufacturer)),
        ];
        for (tag, value) in fields {
            output.push_str(&format!("            <{tag}>{value}</{tag}>\n"));
        }
        output.push_str(&format!(
            "            <strana>{}</strana>\n        </ProductAttributeValue>\n    </ProductAttribute>",
            xml_escape(&product.country)
        ));
    }
    output.push_str("</Attributes>");
    output
}

fn cents_to_decimal(cents: i64) -> String {
    Decimal::new(cents, 2).normalize().to_string()
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
impl Job for CatalogUploadJob {
    fn name(&self) -> &'static str {
        "catalog:upload"
    }

    async fn run(self: Box<Self>, ctx: &JobContext) -> JobOutcome {
        match self.upload(ctx).await {
            Ok(count) => {
                tracing::info!(count, "Catalog upload complete");
                JobOutcome::Done
            }
            Err(SyncError::Cancelled) => JobOutcome::Cancelled,
            Err(e) => {
                tracing::error!(error = %e, "Catalog upload failed");
                JobOutcome::Failed
            }
        }
    }
}
