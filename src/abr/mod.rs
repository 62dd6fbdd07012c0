//! C8 — ABR estimator (spec §4.5).
//!
//! Combines the bandwidth estimator (C4), pending-requests store (C5), and
//! Representation scorer (C6) with buffer observations to choose a
//! Representation on every sample. One instance is owned per (media-type,
//! Period) pair (spec §5); nothing here is shared across instances.

use std::time::{Duration, Instant};

use crate::bandwidth::BandwidthEstimator;
use crate::config::EngineConfig;
use crate::pending_requests::PendingRequestsStore;
use crate::scorer::RepresentationScorer;

#[derive(Debug, Clone)]
pub struct RepresentationCandidate {
    pub id: String,
    pub bitrate: u64,
}

/// One playback-clock sample feeding the estimator (spec §4.5 inputs).
#[derive(Debug, Clone, Copy)]
pub struct PlaybackSample {
    pub buffer_gap: f64,
    pub position: f64,
    pub speed: f64,
    pub duration: f64,
    /// Distance to the live edge, seconds; `None` for VOD content.
    pub live_gap: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AbrEstimate {
    pub bitrate: u64,
    pub index: usize,
    pub urgent: bool,
    pub manual: bool,
    /// Last Representation with a HIGH-confidence score ≥ 1, divided by
    /// playback speed (spec §4.5 "Output").
    pub known_stable_bitrate: Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct GuessModeState {
    active_guess_index: Option<usize>,
    consecutive_wrong_guesses: u32,
    blocked_until: Option<Instant>,
}

/// Picks the highest Representation with `bitrate <= ceiling`, clamped to
/// `[min_auto, max_auto]`; falls back to the lowest-bitrate Representation
/// if none qualifies (spec §8 invariant).
fn choose_at_or_below(
    representations: &[RepresentationCandidate],
    ceiling: f64,
    min_auto: u64,
    max_auto: u64,
) -> usize {
    let mut best: Option<usize> = None;
    for (i, rep) in representations.iter().enumerate() {
        if (rep.bitrate as f64) <= ceiling && rep.bitrate >= min_auto && rep.bitrate <= max_auto {
            best = Some(i);
        }
    }
    best.unwrap_or(0)
}

pub struct AbrEstimator {
    config: EngineConfig,
    bandwidth: BandwidthEstimator,
    pending: PendingRequestsStore,
    scorer: RepresentationScorer,
    guess: GuessModeState,
    buffer_based_active: bool,
    manual_bitrate: Option<u64>,
    min_auto_bitrate: u64,
    max_auto_bitrate: u64,
}

impl AbrEstimator {
    pub fn new(config: EngineConfig) -> Self {
        AbrEstimator {
            config,
            bandwidth: BandwidthEstimator::default(),
            pending: PendingRequestsStore::new(),
            scorer: RepresentationScorer::default(),
            guess: GuessModeState::default(),
            buffer_based_active: false,
            manual_bitrate: None,
            min_auto_bitrate: 0,
            max_auto_bitrate: u64::MAX,
        }
    }

    pub fn set_manual_bitrate(&mut self, bitrate: Option<u64>) {
        self.manual_bitrate = bitrate;
    }

    pub fn set_auto_bounds(&mut self, min: u64, max: u64) {
        self.min_auto_bitrate = min;
        self.max_auto_bitrate = max;
    }

    pub fn pending_requests_mut(&mut self) -> &mut PendingRequestsStore {
        &mut self.pending
    }

    /// Ingest one completed request's metrics (spec §4.5 "Metric intake").
    /// `is_init` segments never update the Representation score.
    pub fn record_completed_request(
        &mut self,
        representation_id: &str,
        bytes: u64,
        duration: Duration,
        segment_duration: f64,
        is_init: bool,
    ) {
        self.bandwidth.sample(bytes, duration);
        if !is_init {
            self.scorer.add_sample(representation_id, segment_duration, duration.as_secs_f64());
        }
    }

    fn pessimistic_bandwidth(&self) -> Option<f64> {
        let base = self.bandwidth.pessimistic_estimate()?;
        match self.pending.lowest_in_flight_bandwidth() {
            Some(in_flight) if in_flight < base => Some(in_flight),
            _ => Some(base),
        }
    }

    fn known_stable_bitrate(&self, representations: &[RepresentationCandidate], speed: f64) -> Option<f64> {
        representations
            .iter()
            .rev()
            .find(|r| self.scorer.meets_threshold(&r.id, 1.0))
            .map(|r| r.bitrate as f64 / speed.max(0.001))
    }

    fn buffer_based_choice(
        &mut self,
        sample: &PlaybackSample,
        representations: &[RepresentationCandidate],
        current_bitrate: u64,
    ) -> Option<usize> {
        if !self.buffer_based_active && sample.buffer_gap > self.config.buffer_based_activation_gap {
            self.buffer_based_active = true;
        } else if self.buffer_based_active && sample.buffer_gap < self.config.buffer_based_deactivation_gap {
            self.buffer_based_active = false;
        }
        if !self.buffer_based_active {
            return None;
        }
        // Simplified BOLA-like utility: as buffer grows past the activation
        // threshold, allow proportionally higher bitrates.
        let factor = sample.buffer_gap / self.config.buffer_based_activation_gap;
        let ceiling = current_bitrate as f64 * factor;
        Some(choose_at_or_below(representations, ceiling, self.min_auto_bitrate, self.max_auto_bitrate))
    }

    fn guess_mode_choice(
        &mut self,
        now: Instant,
        sample: &PlaybackSample,
        representations: &[RepresentationCandidate],
        current_index: usize,
    ) -> Option<usize> {
        if let Some(blocked_until) = self.guess.blocked_until {
            if now < blocked_until {
                return None;
            }
        }
        let live_gap_ok = sample.live_gap.is_some_and(|g| g <= self.config.guess_mode_live_gap_ceiling);
        if !live_gap_ok || sample.buffer_gap < self.config.guess_mode_min_buffer_gap {
            return None;
        }
        let current_id = &representations[current_index].id;
        let score = self.scorer.score(current_id)?;
        if self.scorer.confidence(current_id) != crate::scorer::Confidence::High {
            return None;
        }
        if score / sample.speed.max(0.001) < self.config.guess_mode_min_score_ratio {
            return None;
        }
        let guess_index = current_index + 1;
        if guess_index >= representations.len() {
            return None;
        }
        self.guess.active_guess_index = Some(guess_index);
        Some(guess_index)
    }

    /// Record the outcome of an in-flight guess-mode request (spec §4.5):
    /// `wrong = true` aborts the guess and applies a cooldown; validation
    /// resets the streak.
    pub fn record_guess_outcome(&mut self, now: Instant, wrong: bool) {
        if wrong {
            self.guess.consecutive_wrong_guesses += 1;
            let cooldown = self.config.guess_mode_cooldown(self.guess.consecutive_wrong_guesses);
            self.guess.blocked_until = Some(now + cooldown);
        } else {
            self.guess.consecutive_wrong_guesses = 0;
            self.guess.blocked_until = None;
        }
        self.guess.active_guess_index = None;
    }

    pub fn consecutive_wrong_guesses(&self) -> u32 {
        self.guess.consecutive_wrong_guesses
    }

    pub fn blocked_until(&self) -> Option<Instant> {
        self.guess.blocked_until
    }

    /// Produce one estimate (spec §4.5 "Output").
    #[tracing::instrument(level = "trace", skip(self, sample, representations), fields(candidates = representations.len()))]
    pub fn estimate(
        &mut self,
        now: Instant,
        sample: &PlaybackSample,
        representations: &[RepresentationCandidate],
        current_index: usize,
    ) -> AbrEstimate {
        let known_stable_bitrate = self.known_stable_bitrate(representations, sample.speed);

        if representations.len() == 1 {
            return AbrEstimate { bitrate: representations[0].bitrate, index: 0, urgent: false, manual: false, known_stable_bitrate };
        }

        if let Some(manual) = self.manual_bitrate {
            let index = choose_at_or_below(representations, manual as f64, 0, u64::MAX);
            tracing::trace!(manual_bitrate = manual, chosen = representations[index].bitrate, "manual bitrate override in effect");
            return AbrEstimate {
                bitrate: representations[index].bitrate,
                index,
                urgent: false,
                manual: true,
                known_stable_bitrate,
            };
        }

        let pessimistic = self.pessimistic_bandwidth().unwrap_or(0.0);
        let bandwidth_index = choose_at_or_below(
            representations,
            pessimistic * sample.speed.max(0.001),
            self.min_auto_bitrate,
            self.max_auto_bitrate,
        );
        let current_bitrate = representations[current_index].bitrate;

        let buffer_index = self.buffer_based_choice(sample, representations, current_bitrate);
        let mut chosen_index = match buffer_index {
            Some(bi) if representations[bi].bitrate > representations[bandwidth_index].bitrate => bi,
            _ => bandwidth_index,
        };

        if let Some(guess_index) = self.guess_mode_choice(now, sample, representations, chosen_index) {
            tracing::debug!(guess_bitrate = representations[guess_index].bitrate, "guess mode probing representation above current");
            chosen_index = guess_index;
        }

        let chosen_bitrate = representations[chosen_index].bitrate;
        let urgent = chosen_bitrate < current_bitrate && self.current_request_will_overrun(sample);
        if urgent {
            tracing::debug!(current_bitrate, chosen_bitrate, "urgent downswitch: current request will overrun buffer");
        }

        AbrEstimate { bitrate: chosen_bitrate, index: chosen_index, urgent, manual: false, known_stable_bitrate }
    }

    fn current_request_will_overrun(&self, sample: &PlaybackSample) -> bool {
        self.pending.iter().any(|r| r.has_overrun() || r.elapsed().as_secs_f64() > sample.buffer_gap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reps(bitrates: &[u64]) -> Vec<RepresentationCandidate> {
        bitrates
            .iter()
            .enumerate()
            .map(|(i, &bitrate)| RepresentationCandidate { id: format!("v{i}"), bitrate })
            .collect()
    }

    fn sample(buffer_gap: f64, live_gap: Option<f64>) -> PlaybackSample {
        PlaybackSample { buffer_gap, position: 0.0, speed: 1.0, duration: 100.0, live_gap }
    }

    // Spec §8 scenario 3.
    #[test]
    fn bandwidth_based_choice_picks_highest_at_or_below_pessimistic() {
        let mut abr = AbrEstimator::new(EngineConfig::default());
        abr.record_completed_request("v0", 125_000, Duration::from_secs(1), 4.0, false); // 1 Mb/s
        let representations = reps(&[400_000, 2_000_000]);
        let estimate = abr.estimate(Instant::now(), &sample(3.0, None), &representations, 0);
        assert_eq!(estimate.bitrate, 400_000);
        assert!(!estimate.urgent);
        assert!(!estimate.manual);
    }

    #[test]
    fn known_stable_bitrate_tracks_highest_high_confidence_representation() {
        let mut abr = AbrEstimator::new(EngineConfig::default());
        for _ in 0..5 {
            abr.record_completed_request("v0", 500_000, Duration::from_secs(1), 4.0, false);
        }
        let representations = reps(&[400_000, 2_000_000]);
        let estimate = abr.estimate(Instant::now(), &sample(3.0, None), &representations, 0);
        assert_eq!(estimate.known_stable_bitrate, Some(400_000.0));
    }

    #[test]
    fn single_representation_always_chosen() {
        let mut abr = AbrEstimator::new(EngineConfig::default());
        let representations = reps(&[500_000]);
        let estimate = abr.estimate(Instant::now(), &sample(3.0, None), &representations, 0);
        assert_eq!(estimate.bitrate, 500_000);
    }

    #[test]
    fn manual_bitrate_overrides_auto_choice() {
        let mut abr = AbrEstimator::new(EngineConfig::default());
        abr.set_manual_bitrate(Some(1_000_000));
        let representations = reps(&[400_000, 1_500_000, 3_000_000]);
        let estimate = abr.estimate(Instant::now(), &sample(3.0, None), &representations, 0);
        assert_eq!(estimate.bitrate, 400_000);
        assert!(estimate.manual);
    }

    // Spec §8 scenario 4.
    #[test]
    fn guess_mode_cooldown_caps_after_three_wrong_guesses() {
        let mut abr = AbrEstimator::new(EngineConfig::default());
        let now = Instant::now();
        for _ in 0..3 {
            abr.record_guess_outcome(now, true);
        }
        assert_eq!(abr.consecutive_wrong_guesses(), 3);
        let blocked_until = abr.blocked_until().unwrap();
        assert!(blocked_until >= now + Duration::from_secs(360));
    }

    #[test]
    fn successful_guess_resets_wrong_guess_streak() {
        let mut abr = AbrEstimator::new(EngineConfig::default());
        let now = Instant::now();
        abr.record_guess_outcome(now, true);
        abr.record_guess_outcome(now, false);
        assert_eq!(abr.consecutive_wrong_guesses(), 0);
        assert!(abr.blocked_until().is_none());
    }
}
