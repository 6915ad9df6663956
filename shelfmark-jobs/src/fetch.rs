//! Shared outbound HTTP plumbing for the job policies.

use std::time::Duration;

use tracing::debug;

pub const USER_AGENT: &str = "shelfmark/0.1";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client used by all outbound fetches. Handlers bound their own request
/// timeouts; the worker loop has none of its own.
pub fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Best-effort download. Non-2xx statuses, transport errors and empty
/// bodies all degrade to `None`.
pub async fn download_bytes(client: &reqwest::Client, url: &str) -> Option<Vec<u8>> {
    let response = match client
        .get(url)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            debug!(url, error = %err, "download failed");
            return None;
        }
    };
    if !response.status().is_success() {
        debug!(url, status = %response.status(), "download rejected");
        return None;
    }
    let bytes = response.bytes().await.ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some(bytes.to_vec())
}

/// Best-effort text fetch with the same degradation rules as
/// [`download_bytes`].
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Option<String> {
    let response = client
        .get(url)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.text().await.ok()
}

/// Truncate to at most `max` bytes on a char boundary.
pub fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_is_boundary_safe() {
        assert_eq!(truncate("abcdef", 4), "abcd");
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("aé", 2), "a");
    }
}
