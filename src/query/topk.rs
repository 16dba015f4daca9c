//! Top-k retrieval with early termination.
//!
//! Candidates carry their final BM25 score, but a candidate may still be
//! rejected by verification against the stored page text (phrase or exact
//! case checks). Candidates are therefore popped in descending score order
//! and verified one by one; processing stops as soon as `limit` candidates
//! have been accepted, since nothing left in the heap can outrank them.

use crate::query::multi::PageAddress;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A scored page awaiting verification
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub address: PageAddress,
    pub score: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on score; lower addresses first among equal scores
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.address.cmp(&self.address))
    }
}

/// Counters from one top-k pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TopKStats {
    pub total_candidates: usize,
    pub verified: usize,
    pub rejected: usize,
    pub early_terminated: bool,
}

/// Pops candidates best-first until enough have been accepted
pub struct TopKProcessor {
    candidates: BinaryHeap<Candidate>,
    accepted: usize,
    limit: usize,
    stats: TopKStats,
}

impl TopKProcessor {
    pub fn new(limit: usize) -> Self {
        Self {
            candidates: BinaryHeap::new(),
            accepted: 0,
            limit,
            stats: TopKStats::default(),
        }
    }

    pub fn add_candidates(&mut self, candidates: impl IntoIterator<Item = Candidate>) {
        for candidate in candidates {
            self.stats.total_candidates += 1;
            self.candidates.push(candidate);
        }
    }

    /// Next candidate to verify, or `None` once the limit is reached
    pub fn next_candidate(&mut self) -> Option<Candidate> {
        if self.accepted >= self.limit {
            if !self.candidates.is_empty() {
                self.stats.early_terminated = true;
            }
            return None;
        }
        self.candidates.pop()
    }

    /// The last candidate passed verification
    pub fn accept(&mut self) {
        self.stats.verified += 1;
        self.accepted += 1;
    }

    /// The last candidate failed verification
    pub fn reject(&mut self) {
        self.stats.verified += 1;
        self.stats.rejected += 1;
    }

    pub fn stats(&self) -> &TopKStats {
        &self.stats
    }

    #[inline]
    pub fn remaining_candidates(&self) -> usize {
        self.candidates.len()
    }
}
