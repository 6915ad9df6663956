//! Built-in job policies for the Shelfmark backend.
//!
//! Two handlers implement the [`JobHandler`](shelfmark_job_queue::JobHandler)
//! trait:
//!
//! - `ENRICH_ENTRY` - gathers best-effort context about a saved link, asks
//!   the generative-text collaborator for a structured result and applies
//!   conservative merge rules so user edits are never clobbered unless
//!   forced.
//! - `REGENERATE_THUMBNAIL` - picks an image source by precedence (manual
//!   override, platform thumbnail, page preview image, full-page
//!   screenshot) and produces two resized JPEG variants.
//!
//! The collaborators each handler talks to (page fetchers, the LLM client,
//! the headless-browser screenshotter) are injected as trait objects so the
//! policies can be exercised without the network.

pub mod enrich;
pub mod fetch;
pub mod llm;
pub mod tags;
pub mod thumbs;

pub use enrich::EnrichEntryHandler;
pub use thumbs::RegenerateThumbnailHandler;

/// Job type constants for type-safe job references.
pub mod job_types {
    pub const ENRICH_ENTRY: &str = "ENRICH_ENTRY";
    pub const REGENERATE_THUMBNAIL: &str = "REGENERATE_THUMBNAIL";
}
