//! YouTube URL helpers shared by the thumbnail and enrichment policies.

use url::Url;

/// Extract the video id from watch, short-link and shorts URL shapes.
pub fn extract_video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();

    if host.ends_with("youtu.be") {
        let id = parsed.path().trim_start_matches('/');
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }

    if host.ends_with("youtube.com") {
        if let Some((_, id)) = parsed.query_pairs().find(|(k, v)| k == "v" && !v.trim().is_empty())
        {
            return Some(id.into_owned());
        }
        if let Some(rest) = parsed.path().strip_prefix("/shorts/") {
            let id = rest.split('/').next().unwrap_or_default();
            if !id.trim().is_empty() {
                return Some(id.to_string());
            }
        }
    }

    None
}

/// Canonical high-quality thumbnail for a video id.
pub fn hq_thumbnail_url(video_id: &str) -> String {
    format!("https://img.youtube.com/vi/{video_id}/hqdefault.jpg")
}
