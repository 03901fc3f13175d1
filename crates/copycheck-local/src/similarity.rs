//! Similarity scoring: embeddings when the provider can serve them, character bigrams otherwise.
//!
//! The scoring mode is decided once per comparison batch (one input chunk against the
//! segments of one page), so scores inside a batch are always on the same scale.

use copycheck_core::{EmbeddingProvider, Embeddings, ScoringMode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Cosine similarity clamped to `[0, 1]`.
///
/// Mismatched lengths, empty vectors and zero-norm vectors all score `0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0f64;
    let mut na = 0f64;
    let mut nb = 0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let s = dot / (na.sqrt() * nb.sqrt());
    if s.is_finite() {
        s.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Sørensen–Dice coefficient over character bigrams, ignoring whitespace.
pub fn lexical_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().filter(|c| !c.is_whitespace()).collect();
    let b: Vec<char> = b.chars().filter(|c| !c.is_whitespace()).collect();
    if a == b {
        return if a.is_empty() { 0.0 } else { 1.0 };
    }
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }

    let mut bigrams: HashMap<(char, char), usize> = HashMap::with_capacity(a.len());
    for w in a.windows(2) {
        *bigrams.entry((w[0], w[1])).or_insert(0) += 1;
    }
    let mut inter = 0usize;
    for w in b.windows(2) {
        if let Some(n) = bigrams.get_mut(&(w[0], w[1])) {
            if *n > 0 {
                *n -= 1;
                inter += 1;
            }
        }
    }
    (2 * inter) as f64 / (a.len() + b.len() - 2) as f64
}

/// Per-batch scoring strategy.
pub trait SegmentScorer: Send {
    fn mode(&self) -> ScoringMode;
    /// Score segment `idx`. `None` means the segment cannot be scored and is skipped.
    fn score(&self, idx: usize, segment: &str) -> Option<f64>;
}

struct SemanticScorer {
    query: Vec<f32>,
    segments: Vec<Option<Vec<f32>>>,
}

impl SegmentScorer for SemanticScorer {
    fn mode(&self) -> ScoringMode {
        ScoringMode::Semantic
    }

    fn score(&self, idx: usize, _segment: &str) -> Option<f64> {
        let v = self.segments.get(idx)?.as_ref()?;
        Some(cosine_similarity(&self.query, v))
    }
}

struct LexicalScorer {
    query: String,
}

impl SegmentScorer for LexicalScorer {
    fn mode(&self) -> ScoringMode {
        ScoringMode::Lexical
    }

    fn score(&self, _idx: usize, segment: &str) -> Option<f64> {
        Some(lexical_similarity(&self.query, segment))
    }
}

/// Pick the strategy for one batch from the provider's answer.
///
/// `embeddings` is expected to hold the query at index 0 followed by the segments.
/// Semantic mode needs the query vector; without it every segment falls back to lexical.
pub fn strategy_for(query: &str, embeddings: Embeddings) -> Box<dyn SegmentScorer> {
    if let Embeddings::Available(mut vecs) = embeddings {
        if !vecs.is_empty() {
            let segments = vecs.split_off(1);
            if let Some(Some(q)) = vecs.pop() {
                if !q.is_empty() {
                    return Box::new(SemanticScorer { query: q, segments });
                }
            }
        }
    }
    Box::new(LexicalScorer {
        query: query.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBatch {
    pub mode: ScoringMode,
    /// One slot per segment, in input order. `None` = skipped.
    pub scores: Vec<Option<f64>>,
}

#[derive(Clone)]
pub struct SimilarityScorer {
    embedder: Arc<dyn EmbeddingProvider>,
    embed_timeout: Duration,
}

impl SimilarityScorer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, embed_timeout: Duration) -> Self {
        Self {
            embedder,
            embed_timeout,
        }
    }

    pub fn embedder_name(&self) -> &'static str {
        self.embedder.name()
    }

    async fn embed(&self, texts: &[String]) -> Embeddings {
        match tokio::time::timeout(self.embed_timeout, self.embedder.embed(texts)).await {
            Ok(e) => e,
            Err(_) => {
                tracing::warn!(
                    embedder = self.embedder.name(),
                    timeout_ms = self.embed_timeout.as_millis() as u64,
                    "embedding batch timed out; scoring lexically"
                );
                Embeddings::Unavailable
            }
        }
    }

    /// Score `query` against every segment with a single mode.
    pub async fn score_batch(&self, query: &str, segments: &[String]) -> ScoredBatch {
        if segments.is_empty() {
            return ScoredBatch {
                mode: ScoringMode::Lexical,
                scores: Vec::new(),
            };
        }
        let mut texts = Vec::with_capacity(segments.len() + 1);
        texts.push(query.to_string());
        texts.extend(segments.iter().cloned());

        let strategy = strategy_for(query, self.embed(&texts).await);
        let scores = segments
            .iter()
            .enumerate()
            .map(|(i, s)| strategy.score(i, s))
            .collect();
        ScoredBatch {
            mode: strategy.mode(),
            scores,
        }
    }

    pub async fn score(&self, a: &str, b: &str) -> f64 {
        let batch = self.score_batch(a, &[b.to_string()]).await;
        batch.scores.first().copied().flatten().unwrap_or(0.0)
    }
}
