//! Tag normalization and URL-derived "obvious" tags.

use url::Url;

/// Trim, lowercase, collapse internal whitespace and dedupe while keeping
/// first-seen order. Empty results are dropped.
pub fn normalize(raw_tags: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for raw in raw_tags {
        let tag = raw
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if tag.is_empty() || seen.contains(&tag) {
            continue;
        }
        seen.push(tag);
    }
    seen
}

/// Tags mechanically derivable from a URL's host and path, as opposed to
/// user- or model-curated ones.
pub fn tags_for_url(url: &str) -> Vec<String> {
    if url.trim().is_empty() {
        return Vec::new();
    }
    let Some(host) = host_of(url) else {
        return Vec::new();
    };

    let mut tags: Vec<String> = Vec::new();
    let mut push = |tag: &str| {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    };

    if host.ends_with("imdb.com") {
        push("imdb");
    }
    if host.ends_with("reddit.com") {
        push("reddit");
        if let Some(sub) = subreddit_of(url) {
            push(&sub);
        }
    }
    if host.ends_with("redgifs.com") {
        push("redgifs");
    }
    if host.ends_with("pornhub.com") {
        push("pornhub");
    }
    if host.ends_with("youtu.be") || host.ends_with("youtube.com") {
        push("youtube");
        if url.contains("/shorts/") {
            push("youtube-shorts");
        }
    }

    tags
}

/// Merge two ordered tag lists, first list winning the ordering, then
/// normalize the result.
pub fn merge_tags(preferred_first: &[String], appended: &[String]) -> Vec<String> {
    let mut merged = preferred_first.to_vec();
    merged.extend_from_slice(appended);
    normalize(&merged)
}

/// True when the entry's current tags are exactly the URL-derived obvious
/// set, meaning nothing user-curated would be lost by replacing them.
pub fn is_only_obvious_tags(current_tags: &[String], url: &str) -> bool {
    if current_tags.is_empty() {
        return true;
    }
    let obvious = normalize(&tags_for_url(url));
    let current = normalize(current_tags);
    current.len() == obvious.len() && obvious.iter().all(|t| current.contains(t))
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

fn subreddit_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("r") {
            let sub = segments.next()?.trim().to_lowercase();
            if !sub.is_empty() {
                return Some(sub);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_trims_lowercases_and_dedupes() {
        let tags = strs(&["  Rust ", "rust", "Path  of   Exile", "", "   "]);
        assert_eq!(normalize(&tags), vec!["rust", "path of exile"]);
    }

    #[test]
    fn youtube_urls_get_platform_tags() {
        assert_eq!(
            tags_for_url("https://www.youtube.com/watch?v=abc123"),
            vec!["youtube"]
        );
        assert_eq!(
            tags_for_url("https://youtube.com/shorts/xyz"),
            vec!["youtube", "youtube-shorts"]
        );
        assert_eq!(tags_for_url("https://youtu.be/abc123"), vec!["youtube"]);
    }

    #[test]
    fn reddit_urls_include_subreddit() {
        assert_eq!(
            tags_for_url("https://www.reddit.com/r/Rust/comments/123/title/"),
            vec!["reddit", "rust"]
        );
        assert_eq!(tags_for_url("https://reddit.com/"), vec!["reddit"]);
    }

    #[test]
    fn unknown_or_invalid_urls_yield_nothing() {
        assert!(tags_for_url("https://example.com/a").is_empty());
        assert!(tags_for_url("not a url").is_empty());
        assert!(tags_for_url("").is_empty());
    }

    #[test]
    fn merge_keeps_first_list_order() {
        let merged = merge_tags(&strs(&["youtube"]), &strs(&["Music", "youtube", "live"]));
        assert_eq!(merged, vec!["youtube", "music", "live"]);
    }

    #[test]
    fn obvious_tag_guard() {
        let url = "https://www.youtube.com/watch?v=abc";
        assert!(is_only_obvious_tags(&[], url));
        assert!(is_only_obvious_tags(&strs(&["YouTube"]), url));
        // A manually curated tag beyond the obvious set blocks replacement.
        assert!(!is_only_obvious_tags(&strs(&["youtube", "favorites"]), url));
        // Different tags entirely also block it.
        assert!(!is_only_obvious_tags(&strs(&["music"]), url));
    }
}
