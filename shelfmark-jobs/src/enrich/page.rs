//! Generic page summary fetch: title, meta description and readable text.

use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::fetch::{fetch_text, truncate};

const TITLE_MAX: usize = 300;
const DESCRIPTION_MAX: usize = 1000;
const BODY_TEXT_MAX: usize = 15_000;

static META_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").unwrap());
static META_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)([a-z][a-z0-9:_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static TITLE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static DROP_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>").unwrap()
});
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());

/// What a generic fetch of the page yields. All fields are best-effort.
#[derive(Debug, Clone, Default)]
pub struct PageSummary {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub body_text: Option<String>,
}

/// Best-effort page summary source. Absence (`None`) is the visible form of
/// the "swallow and continue" policy; callers degrade to URL-only context.
#[async_trait]
pub trait PageSummaryFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<PageSummary>;
}

/// Fetches the page over HTTP and extracts metadata from the markup.
pub struct HttpPageSummaryFetcher {
    http: reqwest::Client,
}

impl HttpPageSummaryFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PageSummaryFetcher for HttpPageSummaryFetcher {
    async fn fetch(&self, url: &str) -> Option<PageSummary> {
        let html = fetch_text(&self.http, url).await?;
        Some(summarize_html(&html))
    }
}

/// Extract title/meta-description/body text from raw HTML.
pub fn summarize_html(html: &str) -> PageSummary {
    let metas = collect_meta(html);

    let title = first_non_blank(&[
        metas.get("og:title").map(String::as_str),
        metas.get("twitter:title").map(String::as_str),
        TITLE_TAG
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str()),
    ])
    .map(|t| truncate(&decode_entities(&collapse_whitespace(t)), TITLE_MAX).to_string());

    let meta_description = first_non_blank(&[
        metas.get("og:description").map(String::as_str),
        metas.get("twitter:description").map(String::as_str),
        metas.get("description").map(String::as_str),
    ])
    .map(|d| truncate(&decode_entities(&collapse_whitespace(d)), DESCRIPTION_MAX).to_string());

    let stripped = DROP_BLOCKS.replace_all(html, " ");
    let text_only = ANY_TAG.replace_all(&stripped, " ");
    let body = collapse_whitespace(&decode_entities(&text_only));
    let body_text = if body.is_empty() {
        None
    } else {
        Some(truncate(&body, BODY_TEXT_MAX).to_string())
    };

    PageSummary {
        title,
        meta_description,
        body_text,
    }
}

/// Map of meta `property`/`name` to `content`, first occurrence winning.
pub(crate) fn collect_meta(html: &str) -> HashMap<String, String> {
    let mut metas = HashMap::new();
    for tag in META_TAG.find_iter(html) {
        let mut key: Option<String> = None;
        let mut content: Option<String> = None;
        for attr in META_ATTR.captures_iter(tag.as_str()) {
            let name = attr[1].to_ascii_lowercase();
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            match name.as_str() {
                "property" | "name" => key = Some(value.to_ascii_lowercase()),
                "content" => content = Some(value),
                _ => {}
            }
        }
        if let (Some(key), Some(content)) = (key, content) {
            metas.entry(key).or_insert(content);
        }
    }
    metas
}

fn first_non_blank<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|s| !s.trim().is_empty())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
