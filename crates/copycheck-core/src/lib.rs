use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("embedding failed: {0}")]
    Embed(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

impl Error {
    /// Stable machine-readable code (used by the CLI's JSON error output).
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidUrl(_) => "invalid_url",
            Error::Fetch(_) => "fetch_failed",
            Error::Search(_) => "search_failed",
            Error::Embed(_) => "embed_failed",
            Error::NotConfigured(_) => "not_configured",
            Error::InvalidOptions(_) => "invalid_options",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parse a URL and require an http(s) scheme.
pub fn http_url(raw: &str) -> Result<url::Url> {
    let u = url::Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;
    match u.scheme() {
        "http" | "https" => Ok(u),
        other => Err(Error::InvalidUrl(format!("unsupported scheme {other:?}: {raw}"))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: Option<usize>,
    /// Timeout for the provider request.
    pub timeout_ms: Option<u64>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: None,
            timeout_ms: None,
        }
    }
}

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: Option<String>,
    pub link: String,
    pub snippet: Option<String>,
    /// Provider that produced the hit.
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

/// Retrieves the visible text of a page.
///
/// Implementations never fail: any error (timeout, network, non-text content) is logged
/// and reported as an empty string, which callers treat as "no content".
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch_text(&self, url: &str) -> String;
}

/// Answer of an embedding provider for one batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Embeddings {
    /// One slot per input text. `None` means that single item could not be embedded.
    Available(Vec<Option<Vec<f32>>>),
    /// The provider cannot embed anything right now (not configured, down, batch failed).
    Unavailable,
}

#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn embed(&self, texts: &[String]) -> Embeddings;
}

/// Which strategy produced a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    Semantic,
    Lexical,
}

/// One retained comparison between an input chunk and a segment of a fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub chunk: String,
    pub source: String,
    pub matched_text: String,
    pub similarity: f64,
    pub mode: ScoringMode,
}

impl MatchCandidate {
    pub fn dedup_key(&self) -> (&str, &str, &str) {
        (&self.chunk, &self.source, &self.matched_text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlagiarismReport {
    pub text: String,
    pub results: Vec<MatchCandidate>,
    pub plagiarism_percentage: f64,
}

impl PlagiarismReport {
    pub fn empty(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            results: Vec::new(),
            plagiarism_percentage: 0.0,
        }
    }

    /// Percentage rounded to two decimals for presentation.
    pub fn percentage_display(&self) -> String {
        format!("{:.2}", self.plagiarism_percentage)
    }
}

/// How the report percentage is derived from the surviving matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentagePolicy {
    /// Share of input chunks with at least one match.
    #[default]
    DistinctChunks,
    /// Surviving match count over chunk count, capped at 100.
    MatchCount,
}

impl std::str::FromStr for PercentagePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "distinct_chunks" => Ok(Self::DistinctChunks),
            "match_count" => Ok(Self::MatchCount),
            other => Err(Error::InvalidOptions(format!(
                "unknown percentage policy {other:?} (allowed: distinct_chunks, match_count)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeOptions {
    /// Soft character cap for input chunks.
    pub chunk_max_len: usize,
    /// How many search hits per chunk are fetched and compared.
    pub top_results: usize,
    /// Minimum score for a comparison to be kept. No default: callers must choose.
    pub similarity_threshold: f64,
}

impl AnalyzeOptions {
    pub const DEFAULT_CHUNK_MAX_LEN: usize = 300;
    pub const DEFAULT_TOP_RESULTS: usize = 3;

    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            chunk_max_len: Self::DEFAULT_CHUNK_MAX_LEN,
            top_results: Self::DEFAULT_TOP_RESULTS,
            similarity_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = self.similarity_threshold;
        if !t.is_finite() || !(0.0..=1.0).contains(&t) {
            return Err(Error::InvalidOptions(format!(
                "similarity_threshold must be within [0, 1], got {t}"
            )));
        }
        Ok(())
    }
}
