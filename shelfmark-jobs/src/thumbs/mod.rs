//! The `REGENERATE_THUMBNAIL` policy.

pub mod image;
pub mod preview;
pub mod screenshot;
pub mod youtube;

use std::sync::Arc;

use async_trait::async_trait;
use shelfmark_db::EntryStore;
use shelfmark_job_queue::{Job, JobError, JobHandler};
use shelfmark_storage::FileStorage;
use tracing::{debug, info};

use crate::job_types;
use preview::PreviewImageFetcher;
use screenshot::Screenshotter;

const SMALL_WIDTH: u32 = 360;
const LARGE_WIDTH: u32 = 1280;

/// Preview images under this size are usually logos or icons.
const MIN_PREVIEW_BYTES: usize = 10_000;
const MIN_PREVIEW_WIDTH: u32 = 400;
const MIN_PREVIEW_HEIGHT: u32 = 200;

/// Chooses an image source by precedence and writes two resized JPEG
/// variants back through the storage collaborator.
///
/// Source order, first success wins: manual override URL (payload, then the
/// entry's persisted field), platform-canonical thumbnail, page preview
/// image passing the quality heuristics, full-page screenshot.
pub struct RegenerateThumbnailHandler {
    entries: EntryStore,
    storage: FileStorage,
    preview: Arc<dyn PreviewImageFetcher>,
    screenshotter: Arc<dyn Screenshotter>,
}

impl RegenerateThumbnailHandler {
    pub fn new(
        entries: EntryStore,
        storage: FileStorage,
        preview: Arc<dyn PreviewImageFetcher>,
        screenshotter: Arc<dyn Screenshotter>,
    ) -> Self {
        Self {
            entries,
            storage,
            preview,
            screenshotter,
        }
    }

    async fn try_youtube_thumb(&self, url: &str) -> Option<Vec<u8>> {
        let video_id = youtube::extract_video_id(url)?;
        self.preview
            .download(&youtube::hq_thumbnail_url(&video_id))
            .await
    }

    async fn try_preview_image(&self, url: &str) -> Option<Vec<u8>> {
        let image_url = self.preview.find_preview_image_url(url).await?;
        let bytes = self.preview.download(&image_url).await?;
        if !should_use_preview_image(url, &image_url, &bytes) {
            debug!(url, image_url, "preview image rejected by heuristics");
            return None;
        }
        Some(bytes)
    }
}

#[async_trait]
impl JobHandler for RegenerateThumbnailHandler {
    fn job_type(&self) -> &'static str {
        job_types::REGENERATE_THUMBNAIL
    }

    async fn process(&self, job: &Job) -> Result<(), JobError> {
        let entry = self
            .entries
            .get_by_id(job.entry_id)
            .await?
            .ok_or(JobError::MissingEntry(job.entry_id))?;

        let manual_url = job.payload_str("url").or_else(|| {
            entry
                .manual_thumbnail_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_owned)
        });

        let source_image = if let Some(manual_url) = manual_url {
            info!(entry_id = %entry.id, url = %manual_url, "using manual thumbnail source");
            self.preview.download(&manual_url).await.ok_or_else(|| {
                JobError::Upstream(format!(
                    "failed to download manual thumbnail from {manual_url}"
                ))
            })?
        } else if let Some(bytes) = self.try_youtube_thumb(&entry.url).await {
            debug!(entry_id = %entry.id, "using platform thumbnail source");
            bytes
        } else if let Some(bytes) = self.try_preview_image(&entry.url).await {
            debug!(entry_id = %entry.id, "using page preview image source");
            bytes
        } else {
            debug!(entry_id = %entry.id, "falling back to page screenshot");
            self.screenshotter.screenshot(&entry.url).await?
        };

        let jpeg_small = image::to_jpeg_thumbnail(&source_image, SMALL_WIDTH)?;
        let jpeg_large = image::to_jpeg_thumbnail(&source_image, LARGE_WIDTH)?;

        let stored_small = self.storage.save_thumbnail_jpeg(entry.id, None, &jpeg_small)?;
        let stored_large = self
            .storage
            .save_thumbnail_jpeg(entry.id, Some("large"), &jpeg_large)?;
        self.entries
            .update_thumbnail_paths(entry.id, &stored_small.storage_path, &stored_large.storage_path)
            .await?;

        info!(
            entry_id = %entry.id,
            small = %stored_small.storage_path,
            large = %stored_large.storage_path,
            "thumbnail regenerated"
        );
        Ok(())
    }
}

/// Acceptance heuristics for page preview images, with per-site overrides.
pub fn should_use_preview_image(page_url: &str, image_url: &str, bytes: &[u8]) -> bool {
    // Many "logo" preview images are tiny; prefer a screenshot in that case.
    if bytes.len() < MIN_PREVIEW_BYTES {
        return false;
    }

    let page_lower = page_url.to_lowercase();
    let image_lower = image_url.to_lowercase();

    // Instagram screenshots tend to show login walls; their preview images
    // are reliably good.
    if page_lower.contains("instagram.com") {
        return true;
    }

    // Reddit often sets the preview to a small site logo.
    if page_lower.contains("reddit.com")
        && (image_lower.contains("redditstatic")
            || image_lower.contains("logo")
            || image_lower.contains("icon"))
    {
        return false;
    }

    match ::image::load_from_memory(bytes) {
        Ok(decoded) => {
            let (w, h) = (decoded.width(), decoded.height());
            if w == 0 || h == 0 {
                return false;
            }
            // Typical preview images are 1200x630; reject tiny ones.
            w >= MIN_PREVIEW_WIDTH && h >= MIN_PREVIEW_HEIGHT
        }
        // Unknown format but non-trivial bytes; allow.
        Err(_) => true,
    }
}
