use copycheck_core::{MatchCandidate, PercentagePolicy, PlagiarismReport};
use std::collections::HashSet;

/// Drop repeated (chunk, source, matched text) triples, keeping the first occurrence.
pub fn dedup_matches(matches: Vec<MatchCandidate>) -> Vec<MatchCandidate> {
    let mut seen: HashSet<(String, String, String)> = HashSet::with_capacity(matches.len());
    matches
        .into_iter()
        .filter(|m| {
            let (c, s, t) = m.dedup_key();
            seen.insert((c.to_string(), s.to_string(), t.to_string()))
        })
        .collect()
}

/// Percentage of the document judged copied. Zero chunks score zero.
pub fn plagiarism_percentage(
    chunks: &[String],
    results: &[MatchCandidate],
    policy: PercentagePolicy,
) -> f64 {
    if chunks.is_empty() {
        return 0.0;
    }
    let n = chunks.len() as f64;
    match policy {
        PercentagePolicy::DistinctChunks => {
            // Distinct by content: a repeated chunk text counts once in the numerator.
            let matched: HashSet<&str> = results.iter().map(|m| m.chunk.as_str()).collect();
            100.0 * matched.len() as f64 / n
        }
        PercentagePolicy::MatchCount => (100.0 * results.len() as f64 / n).min(100.0),
    }
}

pub fn aggregate(
    text: &str,
    chunks: &[String],
    per_chunk: Vec<Vec<MatchCandidate>>,
    policy: PercentagePolicy,
) -> PlagiarismReport {
    if chunks.is_empty() {
        return PlagiarismReport::empty(text);
    }
    let results = dedup_matches(per_chunk.into_iter().flatten().collect());
    let plagiarism_percentage = plagiarism_percentage(chunks, &results, policy);
    PlagiarismReport {
        text: text.to_string(),
        results,
        plagiarism_percentage,
    }
}
