//! C6 — Representation maintainability scorer (spec §4.5 "Metric intake").
//!
//! For each non-init segment request, `score = segment_duration /
//! download_duration`: a score above 1 means the Representation downloaded
//! faster than it plays out. Tracked per Representation with a simple
//! count-weighted EWMA; once enough samples have landed, confidence moves
//! from LOW to HIGH and the score becomes trustworthy enough to drive
//! guess-mode and `known_stable_bitrate`.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    Low,
    High,
}

#[derive(Debug, Clone, Copy)]
struct RepresentationScore {
    ewma: f64,
    sample_count: usize,
}

/// Per-(media-type, Period) scorer instance (spec §5: "owned by one ABR
/// instance ... no cross-instance sharing").
#[derive(Debug, Clone)]
pub struct RepresentationScorer {
    scores: HashMap<String, RepresentationScore>,
    /// EWMA smoothing weight given to each new sample.
    alpha: f64,
    /// Samples needed before a Representation's score is HIGH confidence.
    high_confidence_sample_count: usize,
}

impl Default for RepresentationScorer {
    fn default() -> Self {
        RepresentationScorer::new(0.3, 3)
    }
}

impl RepresentationScorer {
    pub fn new(alpha: f64, high_confidence_sample_count: usize) -> Self {
        RepresentationScorer { scores: HashMap::new(), alpha, high_confidence_sample_count }
    }

    /// Record one completed non-init segment download.
    pub fn add_sample(&mut self, representation_id: &str, segment_duration: f64, download_duration: f64) {
        if download_duration <= 0.0 {
            return;
        }
        let score = segment_duration / download_duration;
        let entry = self.scores.entry(representation_id.to_string()).or_insert(RepresentationScore {
            ewma: score,
            sample_count: 0,
        });
        entry.ewma = if entry.sample_count == 0 {
            score
        } else {
            self.alpha * score + (1.0 - self.alpha) * entry.ewma
        };
        entry.sample_count += 1;
    }

    pub fn score(&self, representation_id: &str) -> Option<f64> {
        self.scores.get(representation_id).map(|s| s.ewma)
    }

    pub fn confidence(&self, representation_id: &str) -> Confidence {
        match self.scores.get(representation_id) {
            Some(s) if s.sample_count >= self.high_confidence_sample_count => Confidence::High,
            _ => Confidence::Low,
        }
    }

    /// `true` iff the Representation has a HIGH-confidence score at or
    /// above `threshold` (used by guess mode's "score/speed >= 1.4" gate
    /// and the `known_stable_bitrate` computation).
    pub fn meets_threshold(&self, representation_id: &str, threshold: f64) -> bool {
        self.confidence(representation_id) == Confidence::High
            && self.score(representation_id).is_some_and(|s| s >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_starts_low_and_becomes_high() {
        let mut scorer = RepresentationScorer::default();
        assert_eq!(scorer.confidence("v1"), Confidence::Low);
        scorer.add_sample("v1", 4.0, 2.0);
        scorer.add_sample("v1", 4.0, 2.0);
        assert_eq!(scorer.confidence("v1"), Confidence::Low);
        scorer.add_sample("v1", 4.0, 2.0);
        assert_eq!(scorer.confidence("v1"), Confidence::High);
    }

    #[test]
    fn score_above_one_means_download_faster_than_playback() {
        let mut scorer = RepresentationScorer::default();
        for _ in 0..5 {
            scorer.add_sample("v1", 4.0, 2.0);
        }
        assert!(scorer.score("v1").unwrap() > 1.9);
    }

    #[test]
    fn unknown_representation_has_no_score() {
        let scorer = RepresentationScorer::default();
        assert_eq!(scorer.score("ghost"), None);
    }
}
