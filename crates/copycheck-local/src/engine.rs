//! Per-chunk fan-out: search, fetch candidate pages, score, filter.
//!
//! Concurrency is bounded by two engine-owned semaphores. The chunk semaphore caps how many
//! chunk pipelines run at once; the fetch semaphore caps fetch+score tasks across all chunks.
//! Every external call sits behind its own timeout and degrades to "no matches" on failure.

use crate::cache::{ResultCache, DEFAULT_CACHE_TTL};
use crate::chunker;
use crate::fetch::FetchConfig;
use crate::similarity::SimilarityScorer;
use copycheck_core::{
    AnalyzeOptions, EmbeddingProvider, MatchCandidate, PageFetcher, SearchProvider, SearchQuery,
    SearchResult,
};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Hits requested per search; the cache stores the full page regardless of `top_results`.
const SEARCH_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Chunk pipelines in flight at once.
    pub chunk_concurrency: usize,
    /// Fetch+score tasks in flight at once, across all chunks.
    pub fetch_concurrency: usize,
    /// Soft cap used when splitting fetched pages into comparison segments.
    pub page_chunk_max_len: usize,
    /// Only the first N segments of a page are compared.
    pub max_page_segments: usize,
    pub cache_ttl: Duration,
    pub search_timeout: Duration,
    /// Outer bound on one page fetch, retries included. See [`FetchConfig::total_budget`].
    pub fetch_timeout: Duration,
    pub embed_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_concurrency: 3,
            fetch_concurrency: 3,
            page_chunk_max_len: 600,
            max_page_segments: 20,
            cache_ttl: DEFAULT_CACHE_TTL,
            search_timeout: Duration::from_secs(8),
            fetch_timeout: FetchConfig::default().total_budget(),
            embed_timeout: Duration::from_secs(20),
        }
    }
}

struct Inner {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    scorer: SimilarityScorer,
    cache: Arc<dyn ResultCache>,
    cfg: EngineConfig,
    chunk_permits: Arc<Semaphore>,
    fetch_permits: Arc<Semaphore>,
}

/// Cheap to clone; clones share providers, cache and both semaphores.
#[derive(Clone)]
pub struct MatchEngine {
    inner: Arc<Inner>,
}

impl MatchEngine {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        embedder: Arc<dyn EmbeddingProvider>,
        cache: Arc<dyn ResultCache>,
        cfg: EngineConfig,
    ) -> Self {
        // A zero-permit semaphore would park every task forever.
        let chunk_permits = Arc::new(Semaphore::new(cfg.chunk_concurrency.max(1)));
        let fetch_permits = Arc::new(Semaphore::new(cfg.fetch_concurrency.max(1)));
        let scorer = SimilarityScorer::new(embedder, cfg.embed_timeout);
        Self {
            inner: Arc::new(Inner {
                search,
                fetcher,
                scorer,
                cache,
                cfg,
                chunk_permits,
                fetch_permits,
            }),
        }
    }

    pub fn search_provider_name(&self) -> &'static str {
        self.inner.search.name()
    }

    pub fn embedder_name(&self) -> &'static str {
        self.inner.scorer.embedder_name()
    }

    /// All matches for one input chunk at or above the threshold. Never fails.
    pub async fn find_matches(&self, chunk: &str, opts: &AnalyzeOptions) -> Vec<MatchCandidate> {
        let _permit = match self.inner.chunk_permits.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return Vec::new(),
        };
        let t0 = Instant::now();

        if opts.top_results == 0 {
            return Vec::new();
        }
        let hits = self.search_cached(chunk).await;
        let urls = candidate_urls(&hits, opts.top_results);
        if urls.is_empty() {
            tracing::debug!(chars = chunk.chars().count(), "no search results for chunk");
            return Vec::new();
        }

        let chunk: Arc<str> = Arc::from(chunk);
        let tasks = urls.into_iter().map(|url| {
            let inner = self.inner.clone();
            let chunk = chunk.clone();
            let threshold = opts.similarity_threshold;
            let handle_url = url.clone();
            (
                handle_url,
                tokio::spawn(async move { match_page(inner, chunk, url, threshold).await }),
            )
        });
        let (urls, handles): (Vec<String>, Vec<_>) = tasks.unzip();

        let mut out = Vec::new();
        for (url, joined) in urls.iter().zip(join_all(handles).await) {
            match joined {
                Ok(mut found) => out.append(&mut found),
                Err(e) => tracing::warn!(url = %url, error = %e, "page task failed; skipping"),
            }
        }
        tracing::info!(
            candidates = urls.len(),
            matches = out.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "chunk compared"
        );
        out
    }

    /// Fan out over every chunk. Results are returned per chunk, in input order.
    pub async fn find_matches_all(
        &self,
        chunks: &[String],
        opts: &AnalyzeOptions,
    ) -> Vec<Vec<MatchCandidate>> {
        let handles: Vec<_> = chunks
            .iter()
            .map(|c| {
                let engine = self.clone();
                let chunk = c.clone();
                let opts = opts.clone();
                tokio::spawn(async move { engine.find_matches(&chunk, &opts).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(i, joined)| {
                joined.unwrap_or_else(|e| {
                    tracing::warn!(chunk_index = i, error = %e, "chunk task failed; skipping");
                    Vec::new()
                })
            })
            .collect()
    }

    /// Cache-first search. Failures and timeouts yield no results and are not cached.
    async fn search_cached(&self, query: &str) -> Vec<SearchResult> {
        let inner = &self.inner;
        if let Some(hit) = inner.cache.get(query) {
            tracing::debug!(results = hit.len(), "search cache hit");
            return hit;
        }

        let q = SearchQuery {
            query: query.to_string(),
            max_results: Some(SEARCH_PAGE_SIZE),
            timeout_ms: Some(inner.cfg.search_timeout.as_millis() as u64),
        };
        match tokio::time::timeout(inner.cfg.search_timeout, inner.search.search(&q)).await {
            Ok(Ok(resp)) => {
                tracing::debug!(
                    provider = %resp.provider,
                    results = resp.results.len(),
                    timings_ms = ?resp.timings_ms,
                    "search complete"
                );
                inner
                    .cache
                    .set(query, resp.results.clone(), inner.cfg.cache_ttl);
                resp.results
            }
            Ok(Err(e)) => {
                tracing::warn!(provider = inner.search.name(), error = %e, "search failed");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    provider = inner.search.name(),
                    timeout_ms = inner.cfg.search_timeout.as_millis() as u64,
                    "search timed out"
                );
                Vec::new()
            }
        }
    }
}

/// First `top` distinct links, in rank order.
fn candidate_urls(hits: &[SearchResult], top: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    hits.iter()
        .filter(|h| !h.link.trim().is_empty())
        .filter(|h| seen.insert(h.link.as_str()))
        .take(top)
        .map(|h| h.link.clone())
        .collect()
}

/// Fetch one candidate page, split it, and keep the segments at or above `threshold`.
///
/// Holds a fetch permit for the whole sequence.
async fn match_page(
    inner: Arc<Inner>,
    chunk: Arc<str>,
    url: String,
    threshold: f64,
) -> Vec<MatchCandidate> {
    let _permit = match inner.fetch_permits.clone().acquire_owned().await {
        Ok(p) => p,
        Err(_) => return Vec::new(),
    };

    let text = match tokio::time::timeout(inner.cfg.fetch_timeout, inner.fetcher.fetch_text(&url))
        .await
    {
        Ok(t) => t,
        Err(_) => {
            tracing::warn!(
                url = %url,
                timeout_ms = inner.cfg.fetch_timeout.as_millis() as u64,
                "page fetch timed out"
            );
            return Vec::new();
        }
    };
    if text.trim().is_empty() {
        return Vec::new();
    }

    let segments: Vec<String> = chunker::chunk(&text, inner.cfg.page_chunk_max_len)
        .into_iter()
        .take(inner.cfg.max_page_segments)
        .collect();
    let batch = inner.scorer.score_batch(&chunk, &segments).await;
    let mode = batch.mode;

    segments
        .into_iter()
        .zip(batch.scores)
        .filter_map(|(segment, score)| {
            let score = score?;
            tracing::debug!(url = %url, ?mode, score, "segment scored");
            (score >= threshold).then(|| MatchCandidate {
                chunk: chunk.to_string(),
                source: url.clone(),
                matched_text: segment,
                similarity: score,
                mode,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, MemoryCache};
    use crate::embed::NoEmbeddings;
    use copycheck_core::{Embeddings, Error, Result, ScoringMode, SearchResponse};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::UNIX_EPOCH;

    /// Tracks the current and peak number of concurrent callers.
    #[derive(Default)]
    struct Gauge {
        now: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let n = self.now.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(n, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.now.fetch_sub(1, Ordering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct FakeSearch {
        links: Vec<String>,
        fail: bool,
        delay: Duration,
        calls: AtomicUsize,
        gauge: Gauge,
    }

    impl FakeSearch {
        fn with_links(links: &[&str]) -> Self {
            Self {
                links: links.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl SearchProvider for FakeSearch {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn search(&self, _q: &SearchQuery) -> Result<SearchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gauge.enter();
            tokio::time::sleep(self.delay).await;
            self.gauge.leave();
            if self.fail {
                return Err(Error::Search("HTTP 500".to_string()));
            }
            Ok(SearchResponse {
                results: self
                    .links
                    .iter()
                    .map(|l| SearchResult {
                        title: None,
                        link: l.clone(),
                        snippet: None,
                        source: "fake".to_string(),
                    })
                    .collect(),
                provider: "fake".to_string(),
                timings_ms: Default::default(),
            })
        }
    }

    /// Serves fixed text per URL. `slow` URLs stall, `panic` URLs panic.
    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<String, String>,
        slow: Vec<String>,
        panic: Vec<String>,
        delay: Duration,
        calls: AtomicUsize,
        gauge: Gauge,
    }

    #[async_trait::async_trait]
    impl PageFetcher for FakeFetcher {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_text(&self, url: &str) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic.iter().any(|u| u == url) {
                panic!("fetcher blew up on {url}");
            }
            if self.slow.iter().any(|u| u == url) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.gauge.enter();
            tokio::time::sleep(self.delay).await;
            self.gauge.leave();
            self.pages.get(url).cloned().unwrap_or_default()
        }
    }

    /// Counts calls; embeds every text as a constant vector so all scores are 1.
    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn embed(&self, texts: &[String]) -> Embeddings {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Embeddings::Available(texts.iter().map(|_| Some(vec![1.0, 1.0])).collect())
        }
    }

    const CHUNK: &str = "AI helps doctors diagnose diseases.";

    fn pages(urls: &[&str], text: &str) -> HashMap<String, String> {
        urls.iter().map(|u| (u.to_string(), text.to_string())).collect()
    }

    fn engine(
        search: Arc<FakeSearch>,
        fetcher: Arc<FakeFetcher>,
        embedder: Arc<dyn EmbeddingProvider>,
        cfg: EngineConfig,
    ) -> MatchEngine {
        MatchEngine::new(search, fetcher, embedder, Arc::new(MemoryCache::new()), cfg)
    }

    #[tokio::test]
    async fn zero_search_results_means_no_fetch_or_embed_calls() {
        let search = Arc::new(FakeSearch::with_links(&[]));
        let fetcher = Arc::new(FakeFetcher::default());
        let embedder = Arc::new(CountingEmbedder::default());
        let e = engine(search.clone(), fetcher.clone(), embedder.clone(), EngineConfig::default());

        assert!(e.find_matches(CHUNK, &AnalyzeOptions::new(0.5)).await.is_empty());
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_slow_page_does_not_block_the_others() {
        let urls = ["https://a/", "https://b/", "https://c/"];
        let search = Arc::new(FakeSearch::with_links(&urls));
        let fetcher = Arc::new(FakeFetcher {
            pages: pages(&urls, CHUNK),
            slow: vec!["https://b/".to_string()],
            ..FakeFetcher::default()
        });
        let cfg = EngineConfig {
            fetch_timeout: Duration::from_millis(100),
            ..EngineConfig::default()
        };
        let e = engine(search, fetcher, Arc::new(NoEmbeddings), cfg);

        let found = e.find_matches(CHUNK, &AnalyzeOptions::new(0.9)).await;
        let mut sources: Vec<_> = found.iter().map(|m| m.source.as_str()).collect();
        sources.sort();
        assert_eq!(sources, vec!["https://a/", "https://c/"]);
        assert!(found.iter().all(|m| m.similarity == 1.0 && m.chunk == CHUNK));
    }

    #[tokio::test]
    async fn fetch_retry_after_a_stalled_attempt_fits_in_the_page_budget() {
        use crate::fetch::LocalPageFetcher;
        use axum::{http::header, routing::get, Router};

        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new().route(
            "/page",
            get({
                let hits = hits.clone();
                move || {
                    let hits = hits.clone();
                    async move {
                        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                        ([(header::CONTENT_TYPE, "text/plain")], CHUNK)
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/page", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let fetch_cfg = FetchConfig {
            timeout: Duration::from_millis(300),
            retries: 1,
            retry_backoff: Duration::from_millis(10),
            ..FetchConfig::default()
        };
        let cfg = EngineConfig {
            fetch_timeout: fetch_cfg.total_budget(),
            ..EngineConfig::default()
        };
        let e = MatchEngine::new(
            Arc::new(FakeSearch::with_links(&[url.as_str()])),
            Arc::new(LocalPageFetcher::new(fetch_cfg).unwrap()),
            Arc::new(NoEmbeddings),
            Arc::new(MemoryCache::new()),
            cfg,
        );

        let found = e.find_matches(CHUNK, &AnalyzeOptions::new(0.9)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, url);
    }

    #[test]
    fn default_page_budget_leaves_room_for_a_retry() {
        let fetch = FetchConfig::default();
        let engine = EngineConfig::default();
        assert!(engine.fetch_timeout > fetch.timeout * (fetch.retries + 1));
    }

    #[tokio::test]
    async fn panicking_page_task_contributes_nothing() {
        let urls = ["https://a/", "https://b/"];
        let search = Arc::new(FakeSearch::with_links(&urls));
        let fetcher = Arc::new(FakeFetcher {
            pages: pages(&urls, CHUNK),
            panic: vec!["https://a/".to_string()],
            ..FakeFetcher::default()
        });
        let e = engine(search, fetcher, Arc::new(NoEmbeddings), EngineConfig::default());
        let found = e.find_matches(CHUNK, &AnalyzeOptions::new(0.9)).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, "https://b/");
    }

    #[tokio::test]
    async fn scoring_mode_follows_embedder_availability() {
        let urls = ["https://a/"];
        let mk_fetcher = || {
            Arc::new(FakeFetcher {
                pages: pages(&urls, "Completely different words here."),
                ..FakeFetcher::default()
            })
        };

        let lexical = engine(
            Arc::new(FakeSearch::with_links(&urls)),
            mk_fetcher(),
            Arc::new(NoEmbeddings),
            EngineConfig::default(),
        );
        let found = lexical.find_matches(CHUNK, &AnalyzeOptions::new(0.0)).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mode, ScoringMode::Lexical);
        assert!(found[0].similarity < 1.0);

        let embedder = Arc::new(CountingEmbedder::default());
        let semantic = engine(
            Arc::new(FakeSearch::with_links(&urls)),
            mk_fetcher(),
            embedder.clone(),
            EngineConfig::default(),
        );
        let found = semantic.find_matches(CHUNK, &AnalyzeOptions::new(0.99)).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mode, ScoringMode::Semantic);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1, "one batch per page");
    }

    #[tokio::test]
    async fn threshold_filters_and_segments_are_capped() {
        let urls = ["https://a/"];
        // Ten sentences, each its own segment at this max length.
        let page = (0..10)
            .map(|i| if i % 2 == 0 { CHUNK.to_string() } else { format!("Unrelated filler number {i}.") })
            .collect::<Vec<_>>()
            .join(" ");
        let fetcher = Arc::new(FakeFetcher {
            pages: pages(&urls, &page),
            ..FakeFetcher::default()
        });
        let cfg = EngineConfig {
            page_chunk_max_len: 40,
            max_page_segments: 4,
            ..EngineConfig::default()
        };
        let e = engine(
            Arc::new(FakeSearch::with_links(&urls)),
            fetcher,
            Arc::new(NoEmbeddings),
            cfg,
        );
        let found = e.find_matches(CHUNK, &AnalyzeOptions::new(0.95)).await;
        // Segments 0 and 2 of the first four are exact copies.
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|m| m.matched_text == CHUNK));
    }

    #[tokio::test]
    async fn duplicate_links_are_fetched_once_and_top_results_limits_fetches() {
        let search = Arc::new(FakeSearch::with_links(&[
            "https://a/",
            "https://a/",
            "https://b/",
            "https://c/",
            "https://d/",
        ]));
        let fetcher = Arc::new(FakeFetcher {
            pages: pages(&["https://a/", "https://b/", "https://c/", "https://d/"], CHUNK),
            ..FakeFetcher::default()
        });
        let e = engine(search, fetcher.clone(), Arc::new(NoEmbeddings), EngineConfig::default());
        let found = e.find_matches(CHUNK, &AnalyzeOptions::new(0.9)).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        let mut sources: Vec<_> = found.iter().map(|m| m.source.clone()).collect();
        sources.sort();
        assert_eq!(sources, vec!["https://a/", "https://b/", "https://c/"]);

        let mut opts = AnalyzeOptions::new(0.9);
        opts.top_results = 0;
        assert!(e.find_matches("other chunk", &opts).await.is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cache_hit_skips_search_and_expiry_searches_again() {
        let clock = Arc::new(ManualClock::new(UNIX_EPOCH + Duration::from_secs(1_700_000_000)));
        let search = Arc::new(FakeSearch::with_links(&["https://a/"]));
        let e = MatchEngine::new(
            search.clone(),
            Arc::new(FakeFetcher::default()),
            Arc::new(NoEmbeddings),
            Arc::new(MemoryCache::with_clock(clock.clone())),
            EngineConfig {
                cache_ttl: Duration::from_secs(60),
                ..EngineConfig::default()
            },
        );
        let opts = AnalyzeOptions::new(0.5);

        e.find_matches(CHUNK, &opts).await;
        e.find_matches(CHUNK, &opts).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(61));
        e.find_matches(CHUNK, &opts).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_or_slow_searches_are_not_cached() {
        let failing = Arc::new(FakeSearch {
            fail: true,
            ..FakeSearch::with_links(&["https://a/"])
        });
        let e = engine(
            failing.clone(),
            Arc::new(FakeFetcher::default()),
            Arc::new(NoEmbeddings),
            EngineConfig::default(),
        );
        let opts = AnalyzeOptions::new(0.5);
        assert!(e.find_matches(CHUNK, &opts).await.is_empty());
        assert!(e.find_matches(CHUNK, &opts).await.is_empty());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);

        let slow = Arc::new(FakeSearch {
            delay: Duration::from_secs(30),
            ..FakeSearch::with_links(&["https://a/"])
        });
        let fetcher = Arc::new(FakeFetcher::default());
        let e = engine(
            slow.clone(),
            fetcher.clone(),
            Arc::new(NoEmbeddings),
            EngineConfig {
                search_timeout: Duration::from_millis(50),
                ..EngineConfig::default()
            },
        );
        assert!(e.find_matches(CHUNK, &opts).await.is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_caps_are_never_exceeded() {
        let urls = ["https://a/", "https://b/", "https://c/"];
        let search = Arc::new(FakeSearch {
            delay: Duration::from_millis(20),
            ..FakeSearch::with_links(&urls)
        });
        let fetcher = Arc::new(FakeFetcher {
            pages: pages(&urls, CHUNK),
            delay: Duration::from_millis(20),
            ..FakeFetcher::default()
        });
        let cfg = EngineConfig {
            chunk_concurrency: 2,
            fetch_concurrency: 2,
            ..EngineConfig::default()
        };
        let e = engine(search.clone(), fetcher.clone(), Arc::new(NoEmbeddings), cfg);

        let chunks: Vec<String> = (0..6).map(|i| format!("{CHUNK} Variant {i}.")).collect();
        let per_chunk = e.find_matches_all(&chunks, &AnalyzeOptions::new(0.0)).await;

        assert_eq!(per_chunk.len(), 6);
        for (chunk, found) in chunks.iter().zip(&per_chunk) {
            assert_eq!(found.len(), 3);
            assert!(found.iter().all(|m| &m.chunk == chunk), "results stay in input order");
        }
        assert_eq!(search.calls.load(Ordering::SeqCst), 6);
        assert!(search.gauge.peak() <= 2, "chunk cap exceeded: {}", search.gauge.peak());
        assert!(fetcher.gauge.peak() <= 2, "fetch cap exceeded: {}", fetcher.gauge.peak());
        assert!(fetcher.gauge.peak() >= 1);
    }

    #[test]
    fn candidate_urls_dedups_in_rank_order() {
        let hit = |l: &str| SearchResult {
            title: None,
            link: l.to_string(),
            snippet: None,
            source: "t".to_string(),
        };
        let hits = vec![hit("https://x/"), hit(""), hit("https://x/"), hit("https://y/")];
        assert_eq!(candidate_urls(&hits, 3), vec!["https://x/", "https://y/"]);
        assert_eq!(candidate_urls(&hits, 1), vec!["https://x/"]);
    }
}
