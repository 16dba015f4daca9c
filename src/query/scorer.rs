//! BM25 relevance scoring.
//!
//! Statistics (page count, average page length, document frequency) are
//! global across every shard of a shard-group, so scores from different
//! shards are directly comparable when results are merged.

use serde::{Deserialize, Serialize};

/// Tunable BM25 parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Term frequency saturation
    pub k1: f32,
    /// Page length normalization (0 = none, 1 = full)
    pub b: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Scores pages against collection-wide statistics
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoringWeights,
    page_count: f32,
    avg_page_len: f32,
}

impl Scorer {
    pub fn new(weights: ScoringWeights, page_count: u64, avg_page_len: f32) -> Self {
        Self {
            weights,
            page_count: page_count as f32,
            avg_page_len: if avg_page_len > 0.0 { avg_page_len } else { 1.0 },
        }
    }

    /// Inverse document frequency; always positive
    pub fn idf(&self, doc_freq: u32) -> f32 {
        let df = doc_freq as f32;
        ((self.page_count - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Contribution of one term to a page's score
    pub fn term_score(&self, term_freq: u32, doc_freq: u32, page_len: u32) -> f32 {
        let tf = term_freq as f32;
        let ScoringWeights { k1, b } = self.weights;
        let norm = k1 * (1.0 - b + b * page_len as f32 / self.avg_page_len);
        self.idf(doc_freq) * (tf * (k1 + 1.0)) / (tf + norm)
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }
}
