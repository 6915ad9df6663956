//! Full-page screenshot fallback via a headless browser.
//!
//! The browser is driven over the DevTools protocol: a chromium child
//! process is started with a remote debugging port, we attach to a fresh
//! target over the websocket, navigate, dismiss known consent/login
//! overlays, and capture a PNG of the viewport.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use shelfmark_job_queue::JobError;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

const UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
const VIEWPORT: (u32, u32) = (1280, 720);
const DEBUGGER_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Captures a screenshot of a live page. Failures are transient from the
/// job's perspective (browser missing counts as configuration).
#[async_trait]
pub trait Screenshotter: Send + Sync {
    async fn screenshot(&self, url: &str) -> Result<Vec<u8>, JobError>;
}

pub struct CdpScreenshotter {
    binary: String,
    http: reqwest::Client,
    navigation_timeout: Duration,
    settle_delay: Duration,
}

impl CdpScreenshotter {
    pub fn new(
        binary: impl Into<String>,
        http: reqwest::Client,
        navigation_timeout: Duration,
        settle_delay: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            http,
            navigation_timeout,
            settle_delay,
        }
    }

    async fn capture(&self, url: &str) -> Result<Vec<u8>, JobError> {
        let port = free_port()?;
        let profile_dir = std::env::temp_dir().join(format!("shelfmark-browser-{}", uuid::Uuid::new_v4()));

        let mut child = self.spawn_browser(port, &profile_dir)?;
        let result = self.drive(port, url).await;

        if let Err(err) = child.start_kill() {
            debug!(error = %err, "browser already exited");
        }
        let _ = child.wait().await;
        let _ = std::fs::remove_dir_all(&profile_dir);

        result
    }

    fn spawn_browser(&self, port: u16, profile_dir: &PathBuf) -> Result<Child, JobError> {
        Command::new(&self.binary)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--window-size={},{}", VIEWPORT.0, VIEWPORT.1))
            .arg(format!("--user-agent={UA}"))
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg(format!("--remote-debugging-port={port}"))
            .arg("--lang=en-US")
            .arg("about:blank")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                JobError::Configuration(format!(
                    "failed to start browser '{}': {e}",
                    self.binary
                ))
            })
    }

    async fn drive(&self, port: u16, url: &str) -> Result<Vec<u8>, JobError> {
        let ws_url = self.wait_for_debugger(port).await?;
        let (ws, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| JobError::Upstream(format!("devtools connect failed: {e}")))?;
        let mut conn = CdpConnection::new(ws);

        let target = conn
            .call(None, "Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        let target_id = target
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| JobError::Upstream("devtools returned no targetId".into()))?
            .to_string();

        let attached = conn
            .call(
                None,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| JobError::Upstream("devtools returned no sessionId".into()))?
            .to_string();
        let session = Some(session_id.as_str());

        conn.call(session, "Page.enable", json!({})).await?;
        conn.call(session, "Page.navigate", json!({ "url": url })).await?;
        conn.wait_event(session, "Page.domContentEventFired", self.navigation_timeout)
            .await
            .map_err(|_| {
                JobError::Upstream(format!(
                    "page load timed out after {}ms: {url}",
                    self.navigation_timeout.as_millis()
                ))
            })?;

        // Let above-the-fold content render.
        tokio::time::sleep(self.settle_delay).await;

        if let Some(profile) = site_profile(url) {
            tokio::time::sleep(profile.pre_dismiss_delay).await;
            if let Err(err) = conn
                .call(session, "Runtime.evaluate", json!({ "expression": profile.dismiss_script }))
                .await
            {
                debug!(error = %err, "overlay dismissal script failed");
            }
            tokio::time::sleep(profile.post_dismiss_delay).await;
            if profile.scroll_to_top {
                // Popup clicks can shift scroll; capture from the very top.
                let _ = conn
                    .call(
                        session,
                        "Runtime.evaluate",
                        json!({ "expression": "window.scrollTo(0, 0)" }),
                    )
                    .await;
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }

        let shot = conn
            .call(session, "Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let data = shot
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| JobError::Upstream("screenshot response carried no data".into()))?;

        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| JobError::Upstream(format!("screenshot payload was not base64: {e}")))
    }

    async fn wait_for_debugger(&self, port: u16) -> Result<String, JobError> {
        let version_url = format!("http://127.0.0.1:{port}/json/version");
        let deadline = tokio::time::Instant::now() + DEBUGGER_STARTUP_TIMEOUT;
        loop {
            if let Ok(response) = self.http.get(&version_url).send().await {
                if let Ok(root) = response.json::<Value>().await {
                    if let Some(ws_url) = root.get("webSocketDebuggerUrl").and_then(Value::as_str) {
                        return Ok(ws_url.to_string());
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(JobError::Upstream(
                    "browser devtools endpoint did not come up".into(),
                ));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

#[async_trait]
impl Screenshotter for CdpScreenshotter {
    async fn screenshot(&self, url: &str) -> Result<Vec<u8>, JobError> {
        self.capture(url).await
    }
}

/// One DevTools websocket with request/response correlation. Events arriving
/// while a call is outstanding are buffered for later `wait_event` calls.
struct CdpConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
    pending_events: Vec<Value>,
}

impl CdpConnection {
    fn new(ws: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            ws,
            next_id: 0,
            pending_events: Vec::new(),
        }
    }

    async fn call(
        &mut self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value, JobError> {
        self.next_id += 1;
        let id = self.next_id;
        let mut message = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            message["sessionId"] = json!(session_id);
        }

        self.ws
            .send(Message::Text(message.to_string().into()))
            .await
            .map_err(|e| JobError::Upstream(format!("devtools send failed: {e}")))?;

        let receive = async {
            loop {
                let Some(frame) = self.ws.next().await else {
                    return Err(JobError::Upstream("devtools connection closed".into()));
                };
                let frame =
                    frame.map_err(|e| JobError::Upstream(format!("devtools recv failed: {e}")))?;
                let Message::Text(text) = frame else { continue };
                let Ok(value) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if value.get("id").and_then(Value::as_u64) == Some(id) {
                    if let Some(error) = value.get("error") {
                        return Err(JobError::Upstream(format!("devtools error: {error}")));
                    }
                    return Ok(value.get("result").cloned().unwrap_or(Value::Null));
                }
                if value.get("method").is_some() {
                    self.pending_events.push(value);
                }
            }
        };

        tokio::time::timeout(COMMAND_TIMEOUT, receive)
            .await
            .map_err(|_| JobError::Upstream(format!("devtools call timed out: {method}")))?
    }

    async fn wait_event(
        &mut self,
        session_id: Option<&str>,
        method: &str,
        timeout: Duration,
    ) -> Result<Value, JobError> {
        let matches = |value: &Value| {
            value.get("method").and_then(Value::as_str) == Some(method)
                && match session_id {
                    Some(session_id) => {
                        value.get("sessionId").and_then(Value::as_str) == Some(session_id)
                    }
                    None => true,
                }
        };

        if let Some(index) = self.pending_events.iter().position(matches) {
            return Ok(self.pending_events.remove(index));
        }

        let receive = async {
            loop {
                let Some(frame) = self.ws.next().await else {
                    return Err(JobError::Upstream("devtools connection closed".into()));
                };
                let frame =
                    frame.map_err(|e| JobError::Upstream(format!("devtools recv failed: {e}")))?;
                let Message::Text(text) = frame else { continue };
                let Ok(value) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if matches(&value) {
                    return Ok(value);
                }
                if value.get("method").is_some() {
                    self.pending_events.push(value);
                }
            }
        };

        tokio::time::timeout(timeout, receive)
            .await
            .map_err(|_| JobError::Upstream(format!("timed out waiting for {method}")))?
    }
}

fn free_port() -> Result<u16, JobError> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .map_err(|e| JobError::Upstream(format!("no free local port: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| JobError::Upstream(format!("no free local port: {e}")))?
        .port();
    drop(listener);
    Ok(port)
}

/// Per-site capture tweaks for pages whose overlays otherwise dominate the
/// screenshot.
struct SiteProfile {
    pre_dismiss_delay: Duration,
    dismiss_script: &'static str,
    post_dismiss_delay: Duration,
    scroll_to_top: bool,
}

fn site_profile(url: &str) -> Option<SiteProfile> {
    let host = Url::parse(url).ok()?.host_str()?.to_lowercase();

    if host.contains("instagram.com") {
        // Instagram stacks cookie consent and login prompts and is slow to
        // render public content.
        return Some(SiteProfile {
            pre_dismiss_delay: Duration::from_millis(2000),
            dismiss_script: INSTAGRAM_DISMISS_SCRIPT,
            post_dismiss_delay: Duration::from_millis(1000),
            scroll_to_top: false,
        });
    }
    if host.contains("reddit.com") {
        return Some(SiteProfile {
            pre_dismiss_delay: Duration::from_millis(1000),
            dismiss_script: REDDIT_DISMISS_SCRIPT,
            post_dismiss_delay: Duration::from_millis(500),
            scroll_to_top: true,
        });
    }
    if host.ends_with("redgifs.com") {
        return Some(SiteProfile {
            pre_dismiss_delay: Duration::ZERO,
            dismiss_script: CONSENT_DISMISS_SCRIPT,
            post_dismiss_delay: Duration::from_millis(400),
            scroll_to_top: false,
        });
    }
    None
}

/// Generic cookie/age consent wording.
const CONSENT_DISMISS_SCRIPT: &str = r#"
(() => {
  const labels = ['accept all', 'i agree', 'accept', 'agree'];
  for (const button of document.querySelectorAll('button')) {
    const text = (button.textContent || '').trim().toLowerCase();
    if (labels.includes(text)) { button.click(); return 'clicked:' + text; }
  }
  return 'none';
})()
"#;

const INSTAGRAM_DISMISS_SCRIPT: &str = r#"
(() => {
  const clicked = [];
  const byText = ['allow all cookies', 'accept all', 'accept', 'not now'];
  for (const button of document.querySelectorAll('button')) {
    const text = (button.textContent || '').trim().toLowerCase();
    if (byText.includes(text)) { button.click(); clicked.push(text); }
  }
  for (const close of document.querySelectorAll("button[aria-label='Close'], svg[aria-label='Close']")) {
    close.click();
    clicked.push('close');
  }
  return clicked.join(',') || 'none';
})()
"#;

/// Reddit's "Accept All" reloads the page; prefer the close/reject controls.
const REDDIT_DISMISS_SCRIPT: &str = r#"
(() => {
  const clicked = [];
  for (const close of document.querySelectorAll("button[aria-label='Close']")) {
    close.click();
    clicked.push('close');
  }
  for (const button of document.querySelectorAll('button')) {
    const text = (button.textContent || '').trim().toLowerCase();
    if (text === 'reject optional cookies' || text === 'reject' || text === 'x') {
      button.click();
      clicked.push(text);
    }
  }
  return clicked.join(',') || 'none';
})()
"#;

/// Screenshotter used when no browser is configured: always fails the
/// source so precedence falls through to a terminal error.
pub struct DisabledScreenshotter;

#[async_trait]
impl Screenshotter for DisabledScreenshotter {
    async fn screenshot(&self, url: &str) -> Result<Vec<u8>, JobError> {
        warn!(url, "screenshot requested but no browser is configured");
        Err(JobError::Configuration(
            "screenshot capture is not configured".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_profiles_match_known_hosts() {
        assert!(site_profile("https://www.instagram.com/p/abc/").is_some());
        assert!(site_profile("https://old.reddit.com/r/rust/").is_some());
        assert!(site_profile("https://www.redgifs.com/watch/x").is_some());
        assert!(site_profile("https://example.com/").is_none());
        assert!(site_profile("not a url").is_none());
    }

    #[test]
    fn reddit_profile_scrolls_back_to_top() {
        let profile = site_profile("https://reddit.com/r/rust").unwrap();
        assert!(profile.scroll_to_top);
        let profile = site_profile("https://instagram.com/x").unwrap();
        assert!(!profile.scroll_to_top);
    }

    #[test]
    fn free_port_is_nonzero() {
        assert!(free_port().unwrap() > 0);
    }

    #[tokio::test]
    async fn disabled_screenshotter_fails_fatally() {
        let err = DisabledScreenshotter
            .screenshot("https://example.com")
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
