//! C4 — Bandwidth estimator (spec §4.5 "Metric intake").
//!
//! Two exponentially-weighted moving averages over `(bytes, duration)`
//! samples, a fast one and a slow one, each weighted by the sample's
//! duration rather than by sample count so that one enormous segment
//! doesn't outweigh many small ones. The ABR estimator reads the more
//! conservative of the two as its "pessimistic" bandwidth.

use std::time::Duration;

/// One exponentially-weighted moving average with a given half-life,
/// expressed in the same unit as the sample weights (seconds of playtime
/// here).
#[derive(Debug, Clone, Copy)]
struct Ewma {
    half_life: f64,
    alpha: f64,
    estimate: f64,
    total_weight: f64,
}

impl Ewma {
    fn new(half_life: f64) -> Self {
        Ewma { half_life, alpha: (0.5_f64).powf(1.0 / half_life), estimate: 0.0, total_weight: 0.0 }
    }

    fn sample(&mut self, weight: f64, value: f64) {
        if weight <= 0.0 {
            return;
        }
        let adjusted_alpha = self.alpha.powf(weight);
        self.estimate = value * (1.0 - adjusted_alpha) + adjusted_alpha * self.estimate;
        self.total_weight += weight;
    }

    /// Bias-corrected estimate; early samples (low `total_weight`) are
    /// scaled up since the raw EWMA under-reports until it has "seen"
    /// roughly one half-life's worth of weight.
    fn estimate(&self) -> Option<f64> {
        if self.total_weight <= 0.0 {
            return None;
        }
        let zero_factor = 1.0 - (0.5_f64).powf(self.total_weight / self.half_life);
        Some(self.estimate / zero_factor)
    }
}

/// Throughput estimator combining a fast-reacting and a slow-reacting EWMA,
/// fed by completed-request samples.
#[derive(Debug, Clone, Copy)]
pub struct BandwidthEstimator {
    fast: Ewma,
    slow: Ewma,
    /// Below this byte size, a sample is assumed to be a disk/HTTP-cache hit
    /// rather than a genuine network measurement and is discarded (spec
    /// §4.5 "unless a heuristic flags the response as cached").
    min_sample_bytes: u64,
    /// A response this much faster than its size would take at the current
    /// slow estimate is treated as cached.
    cache_detection_ratio: f64,
}

impl Default for BandwidthEstimator {
    fn default() -> Self {
        BandwidthEstimator::new(2.0, 5.0)
    }
}

impl BandwidthEstimator {
    pub fn new(fast_half_life_s: f64, slow_half_life_s: f64) -> Self {
        BandwidthEstimator {
            fast: Ewma::new(fast_half_life_s),
            slow: Ewma::new(slow_half_life_s),
            min_sample_bytes: 16_000,
            cache_detection_ratio: 8.0,
        }
    }

    fn looks_cached(&self, bytes: u64, duration: Duration) -> bool {
        if bytes < self.min_sample_bytes {
            return true;
        }
        let Some(slow) = self.slow.estimate() else { return false };
        if slow <= 0.0 {
            return false;
        }
        let expected_seconds = (bytes as f64 * 8.0) / slow;
        duration.as_secs_f64() * self.cache_detection_ratio < expected_seconds
    }

    /// Ingest one completed-request sample. Returns `false` if the sample
    /// was discarded as a likely cache hit.
    pub fn sample(&mut self, bytes: u64, duration: Duration) -> bool {
        if duration.as_secs_f64() <= 0.0 || self.looks_cached(bytes, duration) {
            return false;
        }
        let seconds = duration.as_secs_f64();
        let bits_per_second = (bytes as f64 * 8.0) / seconds;
        self.fast.sample(seconds, bits_per_second);
        self.slow.sample(seconds, bits_per_second);
        true
    }

    /// The more conservative of the two estimates (spec §4.5 "pessimistic"
    /// bandwidth), or `None` before any sample has landed.
    pub fn pessimistic_estimate(&self) -> Option<f64> {
        match (self.fast.estimate(), self.slow.estimate()) {
            (Some(f), Some(s)) => Some(f.min(s)),
            (Some(f), None) => Some(f),
            (None, Some(s)) => Some(s),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_toward_steady_throughput() {
        let mut est = BandwidthEstimator::default();
        for _ in 0..20 {
            est.sample(1_000_000, Duration::from_secs(1));
        }
        let bw = est.pessimistic_estimate().unwrap();
        assert!((bw - 8_000_000.0).abs() / 8_000_000.0 < 0.05, "got {bw}");
    }

    #[test]
    fn tiny_fast_response_is_treated_as_cached() {
        let mut est = BandwidthEstimator::default();
        for _ in 0..10 {
            est.sample(2_000_000, Duration::from_secs(1));
        }
        let before = est.pessimistic_estimate().unwrap();
        let accepted = est.sample(2_000_000, Duration::from_millis(1));
        assert!(!accepted);
        assert_eq!(est.pessimistic_estimate().unwrap(), before);
    }

    #[test]
    fn no_samples_yields_no_estimate() {
        let est = BandwidthEstimator::default();
        assert!(est.pessimistic_estimate().is_none());
    }
}
