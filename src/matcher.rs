//! Nearest-neighbour face matching.
//!
//! [`LinearScan`] compares the input against every candidate, so a call costs
//! O(n·d) for n registered faces of dimension d. That is fine at
//! organisation headcount; an indexed search can implement [`MatchStrategy`]
//! later without changing what callers see.

use crate::config::MatchConfig;
use crate::descriptor::FeatureVector;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult<K> {
    Matched { id: K, distance: f64 },
    NoMatch,
}

impl<K> MatchResult<K> {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }
}

pub trait MatchStrategy {
    /// Closest candidate strictly under the threshold, if any.
    fn find_best_match<K, I>(&self, input: &FeatureVector, candidates: I) -> MatchResult<K>
    where
        I: IntoIterator<Item = (K, FeatureVector)>;

    /// Whether `input` and `known` are close enough to be the same face.
    fn verify_identity(&self, input: &FeatureVector, known: &FeatureVector) -> bool;

    fn threshold(&self) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct LinearScan {
    threshold: f64,
}

impl LinearScan {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            threshold: config.threshold(),
        }
    }
}

impl Default for LinearScan {
    fn default() -> Self {
        Self::new(&MatchConfig::default())
    }
}

impl MatchStrategy for LinearScan {
    fn find_best_match<K, I>(&self, input: &FeatureVector, candidates: I) -> MatchResult<K>
    where
        I: IntoIterator<Item = (K, FeatureVector)>,
    {
        let mut best: Option<(K, f64)> = None;

        for (id, vector) in candidates {
            let distance = input.distance(&vector);
            // strict: the first of equally close candidates wins
            if best.as_ref().is_none_or(|(_, d)| distance < *d) {
                best = Some((id, distance));
            }
        }

        match best {
            Some((id, distance)) if distance < self.threshold => {
                MatchResult::Matched { id, distance }
            }
            _ => MatchResult::NoMatch,
        }
    }

    fn verify_identity(&self, input: &FeatureVector, known: &FeatureVector) -> bool {
        input.distance(known) < self.threshold
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}
