use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use copycheck_core::{Error, Result, SearchProvider, SearchQuery, SearchResponse, SearchResult};

fn timeout_ms_from_query(q: &SearchQuery) -> u64 {
    // Provider requests can hang indefinitely without an explicit timeout.
    q.timeout_ms.unwrap_or(8_000).clamp(1_000, 60_000)
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn google_api_key_from_env() -> Option<String> {
    env("COPYCHECK_GOOGLE_API_KEY").or_else(|| env("GOOGLE_API_KEY"))
}

fn google_cse_id_from_env() -> Option<String> {
    env("COPYCHECK_GOOGLE_CSE_ID").or_else(|| env("GOOGLE_CSE_ID"))
}

fn brave_api_key_from_env() -> Option<String> {
    env("COPYCHECK_BRAVE_API_KEY").or_else(|| env("BRAVE_SEARCH_API_KEY"))
}

fn searxng_endpoint_from_env() -> Option<String> {
    env("COPYCHECK_SEARXNG_ENDPOINT")
}

/// Which search providers have credentials in the environment (names only, never values).
pub fn configured_providers() -> Vec<&'static str> {
    let mut out = Vec::new();
    if google_api_key_from_env().is_some() && google_cse_id_from_env().is_some() {
        out.push("google");
    }
    if brave_api_key_from_env().is_some() {
        out.push("brave");
    }
    if searxng_endpoint_from_env().is_some() {
        out.push("searxng");
    }
    out
}

/// Build a provider by name. `auto` takes the first configured of google, brave, searxng.
///
/// Missing credentials are a configuration error; callers should surface it before doing work.
pub fn provider_from_env(name: &str, client: reqwest::Client) -> Result<Arc<dyn SearchProvider>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "google" => Ok(Arc::new(GoogleSearchProvider::from_env(client)?)),
        "brave" => Ok(Arc::new(BraveSearchProvider::from_env(client)?)),
        "searxng" => Ok(Arc::new(SearxngSearchProvider::from_env(client)?)),
        "auto" => match configured_providers().first() {
            Some(p) => provider_from_env(p, client),
            None => Err(Error::NotConfigured(
                "no search provider configured (set GOOGLE_API_KEY + GOOGLE_CSE_ID, \
                 BRAVE_SEARCH_API_KEY, or COPYCHECK_SEARXNG_ENDPOINT)"
                    .to_string(),
            )),
        },
        other => Err(Error::NotConfigured(format!(
            "unknown search provider {other:?} (allowed: auto, google, brave, searxng)"
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct GoogleSearchProvider {
    client: reqwest::Client,
    api_key: String,
    cse_id: String,
}

#[derive(Debug, Clone)]
pub struct BraveSearchProvider {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Clone)]
pub struct SearxngSearchProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleSearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = google_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured("missing COPYCHECK_GOOGLE_API_KEY (or GOOGLE_API_KEY)".to_string())
        })?;
        let cse_id = google_cse_id_from_env().ok_or_else(|| {
            Error::NotConfigured("missing COPYCHECK_GOOGLE_CSE_ID (or GOOGLE_CSE_ID)".to_string())
        })?;
        Ok(Self {
            client,
            api_key,
            cse_id,
        })
    }

    fn endpoint() -> String {
        env("COPYCHECK_GOOGLE_ENDPOINT")
            .unwrap_or_else(|| "https://www.googleapis.com/customsearch/v1".to_string())
    }
}

impl BraveSearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = brave_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing COPYCHECK_BRAVE_API_KEY (or BRAVE_SEARCH_API_KEY)".to_string(),
            )
        })?;
        Ok(Self { client, api_key })
    }

    fn endpoint() -> String {
        env("COPYCHECK_BRAVE_ENDPOINT")
            .unwrap_or_else(|| "https://api.search.brave.com/res/v1/web/search".to_string())
    }
}

impl SearxngSearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let endpoint = searxng_endpoint_from_env().ok_or_else(|| {
            Error::NotConfigured("missing COPYCHECK_SEARXNG_ENDPOINT".to_string())
        })?;
        Ok(Self { client, endpoint })
    }

    fn endpoint_search(&self) -> String {
        // Accept either a base URL (…/), or a full /search endpoint.
        let mut base = self.endpoint.trim().trim_end_matches('/').to_string();
        if !base.ends_with("/search") {
            base.push_str("/search");
        }
        base
    }
}

fn timings(t0: Instant) -> BTreeMap<String, u128> {
    let mut timings_ms = BTreeMap::new();
    timings_ms.insert("search".to_string(), t0.elapsed().as_millis());
    timings_ms
}

#[derive(Debug, Deserialize)]
struct GoogleSearchResponse {
    items: Option<Vec<GoogleItem>>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    link: Option<String>,
    title: Option<String>,
    snippet: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for GoogleSearchProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let timeout_ms = timeout_ms_from_query(q);

        let mut req = self.client.get(Self::endpoint()).query(&[
            ("key", self.api_key.as_str()),
            ("cx", self.cse_id.as_str()),
            ("q", q.query.as_str()),
        ]);
        if let Some(n) = q.max_results {
            // The Custom Search API rejects num > 10.
            req = req.query(&[("num", n.clamp(1, 10).to_string())]);
        }

        let resp = req
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("google search HTTP {status}")));
        }

        let parsed: GoogleSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let results = parsed
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|it| {
                Some(SearchResult {
                    link: it.link?,
                    title: it.title,
                    snippet: it.snippet,
                    source: "google".to_string(),
                })
            })
            .collect();

        Ok(SearchResponse {
            results,
            provider: "google".to_string(),
            timings_ms: timings(t0),
        })
    }
}

#[derive(Debug, Deserialize)]
struct BraveWebSearchResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    results: Option<Vec<BraveWebResult>>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    url: String,
    title: Option<String>,
    description: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for BraveSearchProvider {
    fn name(&self) -> &'static str {
        "brave"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let timeout_ms = timeout_ms_from_query(q);

        let mut req = self
            .client
            .get(Self::endpoint())
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", q.query.as_str())]);
        if let Some(n) = q.max_results {
            req = req.query(&[("count", n.clamp(1, 20).to_string())]);
        }

        let resp = req
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("brave search HTTP {status}")));
        }

        let parsed: BraveWebSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let results = parsed
            .web
            .and_then(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchResult {
                link: r.url,
                title: r.title,
                snippet: r.description,
                source: "brave".to_string(),
            })
            .collect();

        Ok(SearchResponse {
            results,
            provider: "brave".to_string(),
            timings_ms: timings(t0),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearxngSearchResponse {
    results: Option<Vec<SearxngResult>>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    title: Option<String>,
    // SearXNG uses `content` for snippets in JSON format.
    content: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for SearxngSearchProvider {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let max_results = q.max_results.unwrap_or(10).min(20);
        let timeout_ms = timeout_ms_from_query(q);

        let resp = self
            .client
            .get(self.endpoint_search())
            .query(&[("q", q.query.as_str()), ("format", "json")])
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("searxng search HTTP {status}")));
        }

        let parsed: SearxngSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let results = parsed
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                Some(SearchResult {
                    link: r.url?,
                    title: r.title,
                    snippet: r.content,
                    source: "searxng".to_string(),
                })
            })
            .take(max_results)
            .collect();

        Ok(SearchResponse {
            results,
            provider: "searxng".to_string(),
            timings_ms: timings(t0),
        })
    }
}
