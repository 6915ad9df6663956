//! Page preview image discovery (og:image / twitter:image).

use async_trait::async_trait;
use url::Url;

use crate::enrich::page::collect_meta;
use crate::fetch::{download_bytes, fetch_text};

/// Finds and downloads candidate preview images. Both operations are
/// best-effort; absence covers non-2xx responses, transport errors and
/// pages without preview markup.
#[async_trait]
pub trait PreviewImageFetcher: Send + Sync {
    async fn find_preview_image_url(&self, page_url: &str) -> Option<String>;
    async fn download(&self, url: &str) -> Option<Vec<u8>>;
}

pub struct HttpPreviewImageFetcher {
    http: reqwest::Client,
}

impl HttpPreviewImageFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PreviewImageFetcher for HttpPreviewImageFetcher {
    async fn find_preview_image_url(&self, page_url: &str) -> Option<String> {
        let html = fetch_text(&self.http, page_url).await?;
        find_preview_image_in_html(&html, page_url)
    }

    async fn download(&self, url: &str) -> Option<Vec<u8>> {
        download_bytes(&self.http, url).await
    }
}

/// Extract the preview image URL from markup, resolving relative values
/// against the page URL.
pub fn find_preview_image_in_html(html: &str, page_url: &str) -> Option<String> {
    let metas = collect_meta(html);
    let candidate = metas
        .get("og:image")
        .or_else(|| metas.get("twitter:image"))
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())?;

    match Url::parse(candidate) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(_) => Url::parse(page_url)
            .and_then(|base| base.join(candidate))
            .map(|joined| joined.to_string())
            .ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_og_image() {
        let html = r#"
            <meta property="og:image" content="https://cdn.example/og.png">
            <meta name="twitter:image" content="https://cdn.example/tw.png">
        "#;
        assert_eq!(
            find_preview_image_in_html(html, "https://example.com/post").as_deref(),
            Some("https://cdn.example/og.png")
        );
    }

    #[test]
    fn falls_back_to_twitter_image() {
        let html = r#"<meta name="twitter:image" content="https://cdn.example/tw.png">"#;
        assert_eq!(
            find_preview_image_in_html(html, "https://example.com/post").as_deref(),
            Some("https://cdn.example/tw.png")
        );
    }

    #[test]
    fn resolves_relative_urls_against_the_page() {
        let html = r#"<meta property="og:image" content="/img/preview.jpg">"#;
        assert_eq!(
            find_preview_image_in_html(html, "https://example.com/post/1").as_deref(),
            Some("https://example.com/img/preview.jpg")
        );
    }

    #[test]
    fn no_preview_markup_yields_none() {
        assert!(find_preview_image_in_html("<html></html>", "https://example.com").is_none());
    }
}
