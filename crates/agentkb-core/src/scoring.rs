//! Answer confidence scoring.

/// Strategy for turning retrieval coverage into a confidence value.
pub trait ConfidenceScorer: Send + Sync {
    /// `source_count` distinct sources were retrieved for a search that
    /// asked for `top_k` chunks. Returns a value in `[0.0, 1.0]`.
    fn score(&self, source_count: usize, top_k: usize) -> f64;
}

/// Confidence grows with the number of distinct sources, up to `top_k`.
///
/// Zero sources scores exactly `0.0`; otherwise the score is
/// `base + min(1, sources / top_k) * (1 - base)`.
#[derive(Debug, Clone, Copy)]
pub struct SourceCoverageScorer {
    pub base: f64,
}

impl Default for SourceCoverageScorer {
    fn default() -> Self {
        Self { base: 0.5 }
    }
}

impl ConfidenceScorer for SourceCoverageScorer {
    fn score(&self, source_count: usize, top_k: usize) -> f64 {
        if source_count == 0 || top_k == 0 {
            return 0.0;
        }
        let coverage = (source_count as f64 / top_k as f64).min(1.0);
        self.base + coverage * (1.0 - self.base)
    }
}
