//! Plagiarism-check pipeline: chunk, search, fetch, score, aggregate.
//!
//! Provider implementations (search, fetch, embeddings) live alongside the pipeline; the
//! pipeline itself only sees the traits from `copycheck_core`.

use copycheck_core::{AnalyzeOptions, PercentagePolicy, PlagiarismReport, Result};
use std::time::Instant;

pub mod aggregate;
pub mod cache;
pub mod chunker;
pub mod embed;
pub mod engine;
pub mod extract;
pub mod fetch;
pub mod search;
pub mod similarity;

pub use cache::{FsCache, MemoryCache, ResultCache};
pub use chunker::chunk;
pub use engine::{EngineConfig, MatchEngine};
pub use fetch::{FetchConfig, LocalPageFetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Chunking,
    Searching,
    Aggregating,
    Done,
}

/// Public entry point: one document in, one report out.
#[derive(Clone)]
pub struct Analyzer {
    engine: MatchEngine,
    policy: PercentagePolicy,
}

impl Analyzer {
    pub fn new(engine: MatchEngine) -> Self {
        Self {
            engine,
            policy: PercentagePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PercentagePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Only invalid options fail; provider trouble shows up as fewer matches.
    pub async fn analyze(&self, text: &str, opts: &AnalyzeOptions) -> Result<PlagiarismReport> {
        opts.validate()?;
        let t0 = Instant::now();
        let mut stage = Stage::Idle;
        let mut advance = |next: Stage| {
            tracing::debug!(from = ?stage, to = ?next, "analyzer stage");
            stage = next;
        };

        advance(Stage::Chunking);
        let chunks = chunker::chunk(text, opts.chunk_max_len);

        advance(Stage::Searching);
        let per_chunk = if chunks.is_empty() {
            Vec::new()
        } else {
            self.engine.find_matches_all(&chunks, opts).await
        };

        advance(Stage::Aggregating);
        let report = aggregate::aggregate(text, &chunks, per_chunk, self.policy);

        advance(Stage::Done);
        tracing::info!(
            chunks = chunks.len(),
            matches = report.results.len(),
            percentage = report.plagiarism_percentage,
            provider = self.engine.search_provider_name(),
            embedder = self.engine.embedder_name(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "analysis complete"
        );
        Ok(report)
    }
}
