//! Site-specific metadata lookups used to seed the enrichment context.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::fetch::{fetch_text, REQUEST_TIMEOUT};
use crate::thumbs::youtube::extract_video_id;

static LD_JSON_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .unwrap()
});

const MAX_STARS: usize = 5;

/// Structured facts recovered from a known platform.
#[derive(Debug, Clone)]
pub enum PlatformMetadata {
    YouTube {
        title: String,
        author_name: Option<String>,
    },
    Imdb {
        stars: Vec<String>,
        duration: Option<String>,
        date_published: Option<String>,
    },
}

impl PlatformMetadata {
    /// Render as context lines for the model prompt.
    pub fn render_context(&self) -> String {
        let mut out = String::new();
        match self {
            Self::YouTube { title, author_name } => {
                out.push_str("YouTube Metadata:\n");
                out.push_str(&format!("- Title: {title}\n"));
                if let Some(author) = author_name {
                    out.push_str(&format!("- Channel: {author}\n"));
                }
            }
            Self::Imdb {
                stars,
                duration,
                date_published,
            } => {
                out.push_str("IMDb metadata:\n");
                if let Some(date) = date_published.as_deref().filter(|d| !d.trim().is_empty()) {
                    out.push_str(&format!("- Release date: {date}\n"));
                }
                if let Some(runtime) = duration.as_deref().filter(|d| !d.trim().is_empty()) {
                    out.push_str(&format!("- Runtime: {runtime}\n"));
                }
                if !stars.is_empty() {
                    out.push_str(&format!("- Stars: {}\n", stars.join(", ")));
                }
            }
        }
        out.push('\n');
        out
    }
}

/// Best-effort platform lookup; `None` both for non-matching URLs and for
/// any fetch/parse failure.
#[async_trait]
pub trait PlatformMetadataFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<PlatformMetadata>;
}

/// Public YouTube oEmbed lookup for video title and channel.
pub struct YouTubeOembedFetcher {
    http: reqwest::Client,
}

impl YouTubeOembedFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PlatformMetadataFetcher for YouTubeOembedFetcher {
    async fn fetch(&self, url: &str) -> Option<PlatformMetadata> {
        if url.trim().is_empty() || extract_video_id(url).is_none() {
            return None;
        }

        let oembed = Url::parse_with_params(
            "https://www.youtube.com/oembed",
            &[("format", "json"), ("url", url)],
        )
        .ok()?;
        let response = self
            .http
            .get(oembed)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let root: Value = response.json().await.ok()?;

        let title = non_blank(&root, "title")?;
        let author_name = non_blank(&root, "author_name");
        Some(PlatformMetadata::YouTube { title, author_name })
    }
}

/// Scrapes IMDb title pages for their JSON-LD structured data.
pub struct ImdbJsonLdFetcher {
    http: reqwest::Client,
}

impl ImdbJsonLdFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PlatformMetadataFetcher for ImdbJsonLdFetcher {
    async fn fetch(&self, url: &str) -> Option<PlatformMetadata> {
        if !looks_like_imdb_title_url(url) {
            return None;
        }
        let html = fetch_text(&self.http, url).await?;
        extract_imdb_metadata(&html)
    }
}

/// Walk every JSON-LD block for a Movie/TV-like node with usable facts.
pub fn extract_imdb_metadata(html: &str) -> Option<PlatformMetadata> {
    for block in LD_JSON_BLOCK.captures_iter(html) {
        let raw = block.get(1)?.as_str().trim();
        if raw.is_empty() {
            continue;
        }
        let Ok(node) = serde_json::from_str::<Value>(raw) else {
            continue;
        };
        if let Some(meta) = extract_from_node(&node) {
            return Some(meta);
        }
    }
    None
}

fn extract_from_node(node: &Value) -> Option<PlatformMetadata> {
    if let Some(items) = node.as_array() {
        return items.iter().find_map(extract_from_node);
    }
    if !node.is_object() {
        return None;
    }

    let node_type = node.get("@type").and_then(Value::as_str)?.to_lowercase();
    if !(node_type.contains("movie")
        || node_type.contains("tvseries")
        || node_type.contains("tv")
        || node_type.contains("episode"))
    {
        return None;
    }

    // Often ISO-8601 like PT2H10M.
    let duration = non_blank(node, "duration");
    let date_published = non_blank(node, "datePublished");

    let mut stars = Vec::new();
    match node.get("actor") {
        Some(Value::Array(actors)) => {
            for actor in actors {
                if let Some(name) = non_blank(actor, "name") {
                    stars.push(name);
                }
                if stars.len() >= MAX_STARS {
                    break;
                }
            }
        }
        Some(actor @ Value::Object(_)) => {
            if let Some(name) = non_blank(actor, "name") {
                stars.push(name);
            }
        }
        _ => {}
    }

    if duration.is_none() && date_published.is_none() && stars.is_empty() {
        return None;
    }

    Some(PlatformMetadata::Imdb {
        stars,
        duration,
        date_published,
    })
}

fn non_blank(node: &Value, field: &str) -> Option<String> {
    node.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn looks_like_imdb_title_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    host.to_lowercase().ends_with("imdb.com") && parsed.path().contains("/title/tt")
}
