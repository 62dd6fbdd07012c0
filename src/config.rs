//! Engine-wide configuration: the tunables of spec §6, gathered into a
//! struct passed at construction rather than read from globals (Design
//! Note 9, "Global state and singletons").

use std::time::Duration;

/// Sampling interval selection, mirrored in [`EngineConfig::sampling_interval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    MediaSourceLowLatency,
    MediaSourceAttached,
    DirectFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyMode {
    Default,
    LowLatency,
}

/// Resume-gap reason, used to pick which `RESUME_GAP_*` tunable applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeReason {
    AfterSeeking,
    NotEnoughData,
    AfterBuffering,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub minimum_segment_size: f64,

    pub sampling_interval_media_source: Duration,
    pub sampling_interval_low_latency: Duration,
    pub sampling_interval_no_media_source: Duration,

    pub rebuffering_gap_default: f64,
    pub rebuffering_gap_low_latency: f64,

    pub resume_gap_after_seeking_default: f64,
    pub resume_gap_after_seeking_low_latency: f64,
    pub resume_gap_not_enough_data_default: f64,
    pub resume_gap_not_enough_data_low_latency: f64,
    pub resume_gap_after_buffering_default: f64,
    pub resume_gap_after_buffering_low_latency: f64,

    pub minimum_buffer_amount_before_freezing: f64,

    pub dash_fallback_lifetime_when_mup_zero: Duration,

    /// Buffer-based chooser activation/deactivation thresholds (§4.5 hysteresis).
    pub buffer_based_activation_gap: f64,
    pub buffer_based_deactivation_gap: f64,

    /// Guess-mode gating (§4.5 "Guess mode").
    pub guess_mode_live_gap_ceiling: f64,
    pub guess_mode_min_buffer_gap: f64,
    pub guess_mode_min_score_ratio: f64,
    pub guess_mode_cooldown_step: Duration,
    pub guess_mode_cooldown_cap: Duration,

    /// Retry/backoff (§4.4).
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub retry_max_attempts: usize,
}

impl EngineConfig {
    pub fn sampling_interval(&self, mode: PlaybackMode) -> Duration {
        match mode {
            PlaybackMode::MediaSourceLowLatency => self.sampling_interval_low_latency,
            PlaybackMode::MediaSourceAttached => self.sampling_interval_media_source,
            PlaybackMode::DirectFile => self.sampling_interval_no_media_source,
        }
    }

    pub fn rebuffering_gap(&self, latency: LatencyMode) -> f64 {
        match latency {
            LatencyMode::Default => self.rebuffering_gap_default,
            LatencyMode::LowLatency => self.rebuffering_gap_low_latency,
        }
    }

    pub fn resume_gap(&self, reason: ResumeReason, latency: LatencyMode) -> f64 {
        use LatencyMode::*;
        use ResumeReason::*;
        match (reason, latency) {
            (AfterSeeking, Default) => self.resume_gap_after_seeking_default,
            (AfterSeeking, LowLatency) => self.resume_gap_after_seeking_low_latency,
            (NotEnoughData, Default) => self.resume_gap_not_enough_data_default,
            (NotEnoughData, LowLatency) => self.resume_gap_not_enough_data_low_latency,
            (AfterBuffering, Default) => self.resume_gap_after_buffering_default,
            (AfterBuffering, LowLatency) => self.resume_gap_after_buffering_low_latency,
        }
    }

    /// `min(consecutive_wrong_guesses * step, cap)`, per spec §4.5 and the
    /// Open Question in §9 flagging these coefficients as configurable.
    pub fn guess_mode_cooldown(&self, consecutive_wrong_guesses: u32) -> Duration {
        let step = self.guess_mode_cooldown_step.saturating_mul(consecutive_wrong_guesses);
        step.min(self.guess_mode_cooldown_cap)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            minimum_segment_size: 0.005,

            sampling_interval_media_source: Duration::from_millis(1000),
            sampling_interval_low_latency: Duration::from_millis(200),
            sampling_interval_no_media_source: Duration::from_millis(500),

            rebuffering_gap_default: 0.5,
            rebuffering_gap_low_latency: 0.2,

            resume_gap_after_seeking_default: 1.5,
            resume_gap_after_seeking_low_latency: 0.5,
            resume_gap_not_enough_data_default: 1.5,
            resume_gap_not_enough_data_low_latency: 0.5,
            resume_gap_after_buffering_default: 1.5,
            resume_gap_after_buffering_low_latency: 0.5,

            minimum_buffer_amount_before_freezing: 0.5,

            dash_fallback_lifetime_when_mup_zero: Duration::from_secs(3),

            buffer_based_activation_gap: 10.0,
            buffer_based_deactivation_gap: 5.0,

            guess_mode_live_gap_ceiling: 50.0,
            guess_mode_min_buffer_gap: 6.0,
            guess_mode_min_score_ratio: 1.4,
            guess_mode_cooldown_step: Duration::from_secs(120),
            guess_mode_cooldown_cap: Duration::from_secs(360),

            retry_base_delay: Duration::from_millis(300),
            retry_max_delay: Duration::from_secs(8),
            retry_max_attempts: 6,
        }
    }
}
