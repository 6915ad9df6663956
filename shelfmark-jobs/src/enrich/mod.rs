//! The `ENRICH_ENTRY` policy.

pub mod page;
pub mod parser;
pub mod platform;

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use shelfmark_db::{AttachmentKind, AttachmentStore, EntryStore};
use shelfmark_job_queue::{Job, JobError, JobHandler};
use shelfmark_storage::FileStorage;
use tracing::{debug, info};

use crate::fetch::truncate;
use crate::job_types;
use crate::llm::{InlineImage, TextGenerator};
use crate::tags;
use page::PageSummaryFetcher;
use platform::PlatformMetadataFetcher;

const DOCUMENT_TEXT_MAX: usize = 15_000;

/// Gathers context about a saved link, asks the text-generation collaborator
/// for a structured result and applies conservative merge rules.
///
/// The core invariant: existing fields and user-curated tags are never
/// overwritten unless the payload carries `force` or nothing user-meaningful
/// exists yet.
pub struct EnrichEntryHandler {
    entries: EntryStore,
    attachments: AttachmentStore,
    storage: FileStorage,
    page_fetcher: Arc<dyn PageSummaryFetcher>,
    platform_fetchers: Vec<Arc<dyn PlatformMetadataFetcher>>,
    generator: Arc<dyn TextGenerator>,
}

impl EnrichEntryHandler {
    pub fn new(
        entries: EntryStore,
        attachments: AttachmentStore,
        storage: FileStorage,
        page_fetcher: Arc<dyn PageSummaryFetcher>,
        platform_fetchers: Vec<Arc<dyn PlatformMetadataFetcher>>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            entries,
            attachments,
            storage,
            page_fetcher,
            platform_fetchers,
            generator,
        }
    }
}

#[async_trait]
impl JobHandler for EnrichEntryHandler {
    fn job_type(&self) -> &'static str {
        job_types::ENRICH_ENTRY
    }

    async fn process(&self, job: &Job) -> Result<(), JobError> {
        let entry = self
            .entries
            .get_by_id(job.entry_id)
            .await?
            .ok_or(JobError::MissingEntry(job.entry_id))?;
        let attachment_list = self.attachments.list_for_entry(entry.id).await?;
        let force = job.payload_flag("force");

        let mut images: Vec<InlineImage> = Vec::new();
        let mut context = String::new();
        let _ = writeln!(context, "URL: {}", entry.url);
        if let Some(title) = entry.title.as_deref().filter(|t| !t.trim().is_empty()) {
            let _ = writeln!(context, "Existing Title: {title}");
        }
        if let Some(description) = entry
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
        {
            let _ = writeln!(context, "Existing Description: {description}");
        }
        context.push('\n');

        info!(entry_id = %entry.id, url = %entry.url, "starting enrichment");

        // Site-specific extra metadata (best-effort).
        for fetcher in &self.platform_fetchers {
            if let Some(metadata) = fetcher.fetch(&entry.url).await {
                context.push_str(&metadata.render_context());
            }
        }

        if !attachment_list.is_empty() {
            context.push_str(
                "The user provided attachments. Use them to infer a good description and tags.\n",
            );
            for attachment in &attachment_list {
                if !self.storage.exists(&attachment.storage_path) {
                    continue;
                }
                match attachment.kind {
                    AttachmentKind::Text => {
                        let bytes = self.storage.load_bytes(&attachment.storage_path)?;
                        let text = String::from_utf8_lossy(&bytes);
                        let _ = writeln!(context, "\nDocument: {}", attachment.original_name);
                        let _ = writeln!(context, "{}", truncate(&text, DOCUMENT_TEXT_MAX));
                    }
                    AttachmentKind::Image => {
                        let bytes = self.storage.load_bytes(&attachment.storage_path)?;
                        images.push(InlineImage {
                            mime_type: attachment.mime_type.clone(),
                            bytes,
                        });
                        let _ = writeln!(
                            context,
                            "\nImage: {} (see attached image)",
                            attachment.original_name
                        );
                    }
                    AttachmentKind::Other => continue,
                }
            }
        } else {
            // A failing page fetch still allows the model to work on
            // URL-only context.
            let page = self.page_fetcher.fetch(&entry.url).await.unwrap_or_default();

            // Even without the model, HTML metadata can often fill missing
            // title/description. Write that early so a later model failure
            // still leaves a useful partial result.
            let meta_title = page
                .title
                .as_deref()
                .filter(|t| should_update(entry.title.as_deref(), Some(*t), force));
            let meta_description = page
                .meta_description
                .as_deref()
                .filter(|d| should_update(entry.description.as_deref(), Some(*d), force));
            if meta_title.is_some() || meta_description.is_some() {
                self.entries
                    .update_core(entry.id, meta_title, meta_description, None, None)
                    .await?;
            }

            context.push_str("Fetched page content:\n");
            if let Some(title) = page.title.as_deref().filter(|t| !t.trim().is_empty()) {
                let _ = writeln!(context, "Title: {title}");
            }
            if let Some(description) = page
                .meta_description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
            {
                let _ = writeln!(context, "Meta description: {description}");
            }
            if let Some(text) = page.body_text.as_deref().filter(|t| !t.trim().is_empty()) {
                let _ = writeln!(context, "\nText:\n{text}");
            }
        }

        let prompt = build_prompt(&context);
        info!(entry_id = %entry.id, inline_images = images.len(), "requesting model enrichment");
        let model_text = self.generator.generate(&prompt, &images).await?;
        let enrichment = parser::parse_from_model_text(&model_text)?;
        debug!(entry_id = %entry.id, tags = ?enrichment.tags, "model enrichment received");

        let new_title = enrichment
            .title
            .as_deref()
            .filter(|t| should_update(entry.title.as_deref(), Some(*t), force));
        let new_description = enrichment
            .description
            .as_deref()
            .filter(|d| should_update(entry.description.as_deref(), Some(*d), force));
        let new_detailed = enrichment
            .detailed_description
            .as_deref()
            .filter(|d| should_update(entry.detailed_description.as_deref(), Some(*d), force));

        if new_title.is_some() || new_description.is_some() || new_detailed.is_some() {
            self.entries
                .update_core(entry.id, new_title, new_description, new_detailed, None)
                .await?;
        }

        // Obvious URL-derived tags stay, and stay in front, even when forcing.
        let proposed = tags::normalize(&enrichment.tags);
        let merged = tags::merge_tags(&tags::tags_for_url(&entry.url), &proposed);

        let replace_tags =
            force || entry.tags.is_empty() || tags::is_only_obvious_tags(&entry.tags, &entry.url);
        info!(
            entry_id = %entry.id,
            title_update = new_title.is_some(),
            tags_update = replace_tags,
            "applying enrichment results"
        );

        if replace_tags {
            self.entries.replace_tags(entry.id, &merged).await?;
        }

        Ok(())
    }
}

/// The merge rule applied independently per field: never write an empty
/// proposal, always write under force, otherwise only fill gaps.
pub fn should_update(existing: Option<&str>, proposed: Option<&str>, force: bool) -> bool {
    let Some(proposed) = proposed else {
        return false;
    };
    if proposed.trim().is_empty() {
        return false;
    }
    if force {
        return true;
    }
    existing.map(|e| e.trim().is_empty()).unwrap_or(true)
}

fn build_prompt(context: &str) -> String {
    format!(
        r#"You are helping build a personal repository of website links. Generate a concise, useful description and a small set of tags.

Output MUST be a single JSON object (no markdown), with this exact shape:
{{
  "title": "optional short title",
  "description": "useful description, 2-8 sentences (can be 1-2 short paragraphs)",
  "detailedDescription": "longer description with key details; can be multiple short paragraphs and/or bullet points",
  "tags": ["lowercase tag", "another tag"]
}}

Description rules:
- be informative (what it is, why it matters, key entities)
- aim for ~400-900 characters unless the page is very small

Detailed description rules:
- include any concrete facts you can extract (people, dates, runtime/length, notable attributes)
- if nothing extra is known, you can repeat/expand the short description

Tag rules:
- keep tags short, lowercase, and specific
- 3 to 8 tags
- include topical tags when obvious (examples: youtube, music, news, politics, gaming, climate, coding, rust)
- include named-entity tags if clearly present (examples: asmongold, path of exile)

Context:
{context}
"#
    )
}
