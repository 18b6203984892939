//! Image Materializer
//!
//! Turns the photo references collected during a reconciliation pass into
//! downloaded, linked media files. Files are content-addressed by SHA256 and
//! written atomically (tmp file + rename); an entity's previous links are
//! replaced wholesale. Individual failures are logged and skipped — never
//! fatal to the batch.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::core::jobs::{Job, JobContext, JobOutcome};
use crate::core::{EngineEvent, SyncContext};
use crate::db::repository::media::MediaFileCreate;
use crate::sync::SyncError;
use shared::models::{ImageRequest, MediaEntityType};
use shared::util::rescale;

pub struct DownloadImagesJob {
    ctx: SyncContext,
    list: Vec<ImageRequest>,
}

impl DownloadImagesJob {
    pub fn new(ctx: SyncContext, list: Vec<ImageRequest>) -> Self {
        Self { ctx, list }
    }

    /// Does the target entity still exist (in any status)?
    async fn entity_exists(&self, request: &ImageRequest) -> Result<bool, SyncError> {
        let found = match request.entity_type {
            MediaEntityType::Category => self
                .ctx
                .categories()
                .find_by_id(request.entity_id)
                .await?
                .is_some(),
            MediaEntityType::Product => self
                .ctx
                .products()
                .find_by_id(request.entity_id)
                .await?
                .is_some(),
        };
        Ok(found)
    }

    /// Download one remote file into the images directory.
    ///
    /// Idempotent: an existing content-addressed file is reused. Returns the
    /// link payload, or `None` when the fetch failed.
    async fn materialize_file(&self, name: &str, images_dir: &Path) -> Option<MediaFileCreate> {
        let remote = match self.ctx.gateway.fetch_file(name).await {
            Some(remote) => remote,
            None => {
                tracing::warn!(
                    name = %name,
                    url = %self.ctx.gateway.file_url(name),
                    "File not loaded"
                );
                return None;
            }
        };

        let hash = hex::encode(Sha256::digest(&remote.bytes));
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin")
            .to_ascii_lowercase();
        let file_name = format!("{hash}.{extension}");
        let content_type = remote.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(name)
                .first()
                .map(|mime| mime.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string())
        });

        let file_path = images_dir.join(&file_name);
        if !file_path.exists() {
            // Atomic write: tmp file + rename to avoid corrupt files on crash
            let tmp_path = images_dir.join(format!("{file_name}.tmp"));
            if let Err(e) = tokio::fs::write(&tmp_path, &remote.bytes).await {
                tracing::warn!(name = %name, error = %e, "Failed to write tmp image file");
                return None;
            }
            if let Err(e) = tokio::fs::rename(&tmp_path, &file_path).await {
                tracing::warn!(name = %name, error = %e, "Failed to rename tmp image file");
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return None;
            }
            tracing::info!(name = %name, hash = %hash, size = remote.bytes.len(), "Image downloaded");
        }

        Some(MediaFileCreate {
            hash,
            name: file_name,
            content_type,
        })
    }

    async fn materialize(&self, job: &JobContext) -> Result<Vec<i64>, SyncError> {
        let images_dir = self.ctx.config.images_dir();
        if let Err(e) = tokio::fs::create_dir_all(&images_dir).await {
            return Err(SyncError::Payload(format!(
                "Cannot create images directory: {e}"
            )));
        }

        let media = self.ctx.media();
        let total = self.list.len();
        let mut convertible: Vec<i64> = Vec::new();

        for (index, request) in self.list.iter().enumerate() {
            if job.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            if request.photo_ref.trim().is_empty() {
                continue;
            }

            if !self.entity_exists(request).await? {
                tracing::warn!(
                    entity_type = %request.entity_type,
                    entity_id = request.entity_id,
                    "Entity not found, files not linked"
                );
                continue;
            }

            // One link payload per `;`-delimited name, in feed order
            let mut files: Vec<MediaFileCreate> = Vec::new();
            for name in request.photo_ref.split(';') {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                if let Some(file) = self.materialize_file(name, &images_dir).await {
                    files.push(file);
                }
            }

            let linked = media
                .replace_for_entity(request.entity_type, request.entity_id, &files)
                .await?;
            for file in &linked {
                if file.content_type.starts_with("image/") {
                    convertible.push(file.id);
                }
            }

            job.set_progress(rescale(
                (index + 1) as f64,
                0.0,
                total as f64,
                0.0,
                100.0,
            ) as u8);
        }

        Ok(convertible)
    }
}

#[async_trait]
impl Job for DownloadImagesJob {
    fn name(&self) -> &'static str {
        "images:download"
    }

    async fn run(self: Box<Self>, ctx: &JobContext) -> JobOutcome {
        match self.materialize(ctx).await {
            Ok(convertible) => {
                if !convertible.is_empty() {
                    // Conversion is a downstream job owned by an external
                    // collaborator; signal it with the new file ids.
                    self.ctx.bus.publish(EngineEvent::ImagesDownloaded {
                        file_ids: convertible,
                    });
                }
                JobOutcome::Done
            }
            Err(SyncError::Cancelled) => JobOutcome::Cancelled,
            Err(e) => {
                tracing::error!(error = %e, "Image materialization failed");
                JobOutcome::Failed
            }
        }
    }
}
