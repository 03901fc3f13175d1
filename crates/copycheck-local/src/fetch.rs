use crate::extract;
use copycheck_core::{http_url, Error, PageFetcher, Result};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-attempt timeout (network + body).
    pub timeout: Duration,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: usize,
    /// Extra attempts after a transient failure (timeout, connect error, 429, 5xx).
    pub retries: u32,
    pub retry_backoff: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_bytes: 5 * 1024 * 1024,
            retries: 1,
            retry_backoff: Duration::from_millis(250),
            user_agent: format!("copycheck/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Slack for body decoding and text extraction after the last attempt.
const EXTRACT_GRACE: Duration = Duration::from_secs(1);

impl FetchConfig {
    /// Worst-case wall time of one `fetch_text`: every attempt timing out, plus backoff sleeps.
    ///
    /// Callers that wrap a fetch in their own timeout should use at least this, or retries
    /// never get a chance to run.
    pub fn total_budget(&self) -> Duration {
        let attempts = self.retries.saturating_add(1);
        let backoff_steps = self.retries * attempts / 2;
        self.timeout * attempts + self.retry_backoff * backoff_steps + EXTRACT_GRACE
    }
}

#[derive(Debug)]
enum Failure {
    /// Worth another attempt.
    Transient(String),
    Permanent(String),
}

struct Body {
    status: u16,
    content_type: Option<String>,
    bytes: Vec<u8>,
    truncated: bool,
}

/// reqwest-backed page fetcher that returns visible text or `""`.
#[derive(Debug, Clone)]
pub struct LocalPageFetcher {
    client: reqwest::Client,
    cfg: FetchConfig,
}

impl LocalPageFetcher {
    pub fn new(cfg: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(10))
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client, cfg })
    }

    fn classify(e: &reqwest::Error) -> Failure {
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            Failure::Transient(e.to_string())
        } else {
            Failure::Permanent(e.to_string())
        }
    }

    async fn attempt(&self, url: &url::Url) -> std::result::Result<Body, Failure> {
        let resp = self
            .client
            .get(url.clone())
            .timeout(self.cfg.timeout)
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;

        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(Failure::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(Failure::Permanent(format!("HTTP {status}")));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Self::classify(&e))?;
            if bytes.len().saturating_add(chunk.len()) > self.cfg.max_bytes {
                let can_take = self.cfg.max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(Body {
            status: status.as_u16(),
            content_type,
            bytes,
            truncated,
        })
    }
}

#[async_trait::async_trait]
impl PageFetcher for LocalPageFetcher {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch_text(&self, url: &str) -> String {
        let parsed = match http_url(url) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(url, error = %e, "skipping page");
                return String::new();
            }
        };
        let t0 = Instant::now();
        let mut attempt = 0u32;
        let body = loop {
            match self.attempt(&parsed).await {
                Ok(b) => break b,
                Err(Failure::Transient(msg)) if attempt < self.cfg.retries => {
                    attempt += 1;
                    tracing::debug!(url, attempt, error = %msg, "transient fetch failure; retrying");
                    tokio::time::sleep(self.cfg.retry_backoff * attempt).await;
                }
                Err(Failure::Transient(msg)) | Err(Failure::Permanent(msg)) => {
                    tracing::warn!(url, error = %msg, "page fetch failed; skipping");
                    return String::new();
                }
            }
        };

        let text = extract::page_text(body.content_type.as_deref(), &body.bytes);
        if text.is_empty() {
            tracing::warn!(
                url,
                status = body.status,
                content_type = body.content_type.as_deref().unwrap_or(""),
                "no extractable text"
            );
        } else {
            tracing::debug!(
                url,
                chars = text.chars().count(),
                truncated = body.truncated,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "page fetched"
            );
        }
        text
    }
}
