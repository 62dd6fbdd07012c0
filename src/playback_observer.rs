//! C9 — Playback observer (spec §4.6).
//!
//! A sampling state machine over the host media element: takes periodic
//! timer ticks plus element events and turns each into an [`Observation`],
//! classifying `rebuffering`/`freezing` and distinguishing seeks the
//! orchestrator itself initiated from ones the user made.

use crate::config::{EngineConfig, LatencyMode, PlaybackMode, ResumeReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementEvent {
    Tick,
    CanPlay,
    Play,
    Seeking,
    Seeked,
    LoadedMetadata,
    RateChange,
    TimeUpdate,
}

/// Raw element state as read from the host media element (spec §6 "Outbound:
/// Media buffer" neighbour — the element itself, not the buffer, is the
/// external collaborator here).
#[derive(Debug, Clone, Copy)]
pub struct ElementState {
    pub position: f64,
    pub duration: f64,
    pub buffer_gap: f64,
    pub paused: bool,
    pub ended: bool,
    /// HTML5-style readiness: 0 = HAVE_NOTHING ... 4 = HAVE_ENOUGH_DATA.
    pub ready_state: u8,
    pub playback_rate: f64,
    pub seeking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebufferingReason {
    Seeking,
    InternalSeek,
    NotReady,
    Buffering,
}

#[derive(Debug, Clone, Copy)]
pub struct Rebuffering {
    pub reason: RebufferingReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationEvent {
    Tick,
    CanPlay,
    Play,
    Seeking,
    /// A `seeking` event raised while `internal_seek_counter > 0`.
    InternalSeeking,
    Seeked,
    LoadedMetadata,
    RateChange,
    TimeUpdate,
}

#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub event: ObservationEvent,
    pub position: f64,
    pub duration: f64,
    pub buffer_gap: f64,
    pub paused: bool,
    pub ended: bool,
    pub ready_state: u8,
    pub playback_rate: f64,
    pub seeking: bool,
    pub rebuffering: Option<Rebuffering>,
    pub freezing: bool,
}

/// Deferred-subscription buffer (spec §9 "Deferred initial subscription"):
/// the first observation produced after `start()` is retained so subscribers
/// attached in the same logical step all see it, rather than racing the
/// producer.
#[derive(Debug, Default)]
struct InitialObservationBuffer {
    first: Option<Observation>,
}

impl InitialObservationBuffer {
    fn record_if_first(&mut self, observation: Observation) {
        if self.first.is_none() {
            self.first = Some(observation);
        }
    }
}

pub struct PlaybackObserver {
    config: EngineConfig,
    mode: PlaybackMode,
    latency: LatencyMode,
    internal_seek_counter: u32,
    rebuffering: Option<Rebuffering>,
    freezing: bool,
    last_position_for_freeze: Option<f64>,
    last_position_for_direct_file: Option<f64>,
    initial_buffer: InitialObservationBuffer,
}

impl PlaybackObserver {
    pub fn new(config: EngineConfig, mode: PlaybackMode, latency: LatencyMode) -> Self {
        PlaybackObserver {
            config,
            mode,
            latency,
            internal_seek_counter: 0,
            rebuffering: None,
            freezing: false,
            last_position_for_freeze: None,
            last_position_for_direct_file: None,
            initial_buffer: InitialObservationBuffer::default(),
        }
    }

    pub fn sampling_interval(&self) -> std::time::Duration {
        self.config.sampling_interval(self.mode)
    }

    /// Call before mutating the element's current time; pairs with the next
    /// `seeking` event to relabel it `internal-seeking` (spec §4.6).
    pub fn begin_internal_seek(&mut self) {
        self.internal_seek_counter += 1;
    }

    fn classify_event(&mut self, event: ElementEvent) -> ObservationEvent {
        match event {
            ElementEvent::Tick => ObservationEvent::Tick,
            ElementEvent::CanPlay => ObservationEvent::CanPlay,
            ElementEvent::Play => ObservationEvent::Play,
            ElementEvent::Seeked => ObservationEvent::Seeked,
            ElementEvent::LoadedMetadata => ObservationEvent::LoadedMetadata,
            ElementEvent::RateChange => ObservationEvent::RateChange,
            ElementEvent::TimeUpdate => ObservationEvent::TimeUpdate,
            ElementEvent::Seeking => {
                if self.internal_seek_counter > 0 {
                    self.internal_seek_counter -= 1;
                    ObservationEvent::InternalSeeking
                } else {
                    ObservationEvent::Seeking
                }
            }
        }
    }

    fn resume_reason_for(observation_event: ObservationEvent, reason: RebufferingReason) -> ResumeReason {
        match (observation_event, reason) {
            (ObservationEvent::Seeking, _) | (_, RebufferingReason::Seeking) => ResumeReason::AfterSeeking,
            (_, RebufferingReason::InternalSeek) => ResumeReason::AfterSeeking,
            (_, RebufferingReason::NotReady) => ResumeReason::NotEnoughData,
            (_, RebufferingReason::Buffering) => ResumeReason::AfterBuffering,
        }
    }

    fn update_rebuffering(&mut self, state: &ElementState, observation_event: ObservationEvent) {
        if self.mode != PlaybackMode::MediaSourceAttached && self.mode != PlaybackMode::MediaSourceLowLatency {
            // Direct-file mode relies on timestamp stagnation instead (below).
            return;
        }
        let gap_is_blocking = state.buffer_gap <= self.config.rebuffering_gap(self.latency) || !state.buffer_gap.is_finite();

        if let Some(active) = self.rebuffering {
            let resume_gap = self.config.resume_gap(Self::resume_reason_for(observation_event, active.reason), self.latency);
            if state.buffer_gap > resume_gap && state.buffer_gap.is_finite() {
                self.rebuffering = None;
            }
        } else if state.ready_state >= 1 && !state.ended && gap_is_blocking {
            let reason = match observation_event {
                ObservationEvent::InternalSeeking => RebufferingReason::InternalSeek,
                ObservationEvent::Seeking => RebufferingReason::Seeking,
                _ if state.ready_state < 2 => RebufferingReason::NotReady,
                _ => RebufferingReason::Buffering,
            };
            self.rebuffering = Some(Rebuffering { reason });
        }
    }

    fn update_freezing_media_source(&mut self, state: &ElementState) {
        let stagnant = self.last_position_for_freeze == Some(state.position);
        let freezing_conditions = state.buffer_gap > self.config.minimum_buffer_amount_before_freezing
            && !state.paused
            && !state.ended
            && state.ready_state >= 1
            && state.playback_rate != 0.0;

        if !freezing_conditions {
            self.freezing = false;
        } else if stagnant {
            self.freezing = true;
        } else {
            self.freezing = false;
        }
        self.last_position_for_freeze = Some(state.position);
    }

    /// Direct-file mode has no MSE buffer_gap signal; rebuffering is
    /// inferred from two consecutive `timeupdate`s reporting the same
    /// position while otherwise playable (spec §4.6).
    fn update_direct_file(&mut self, state: &ElementState, event: ElementEvent) {
        if event != ElementEvent::TimeUpdate {
            return;
        }
        let stagnant = self.last_position_for_direct_file == Some(state.position);
        self.last_position_for_direct_file = Some(state.position);
        if stagnant && !state.paused && !state.ended && state.ready_state >= 1 {
            self.rebuffering.get_or_insert(Rebuffering { reason: RebufferingReason::Buffering });
        } else {
            self.rebuffering = None;
        }
    }

    /// Produce the Observation for one sample/event (spec §4.6).
    pub fn observe(&mut self, event: ElementEvent, state: ElementState) -> Observation {
        let observation_event = self.classify_event(event);

        if self.mode == PlaybackMode::DirectFile {
            self.update_direct_file(&state, event);
        } else {
            self.update_rebuffering(&state, observation_event);
            self.update_freezing_media_source(&state);
        }

        let observation = Observation {
            event: observation_event,
            position: state.position,
            duration: state.duration,
            buffer_gap: state.buffer_gap,
            paused: state.paused,
            ended: state.ended,
            ready_state: state.ready_state,
            playback_rate: state.playback_rate,
            seeking: state.seeking,
            rebuffering: self.rebuffering,
            freezing: self.mode != PlaybackMode::DirectFile && self.freezing,
        };
        self.initial_buffer.record_if_first(observation);
        observation
    }

    /// The first Observation produced since construction, if any — fed to
    /// subscribers that attach after `observe()` already ran once this step
    /// (spec §9 "Deferred initial subscription").
    pub fn initial_observation(&self) -> Option<Observation> {
        self.initial_buffer.first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(position: f64, buffer_gap: f64) -> ElementState {
        ElementState {
            position,
            duration: 100.0,
            buffer_gap,
            paused: false,
            ended: false,
            ready_state: 4,
            playback_rate: 1.0,
            seeking: false,
        }
    }

    #[test]
    fn enters_rebuffering_below_gap_and_clears_past_resume_gap() {
        let mut observer = PlaybackObserver::new(EngineConfig::default(), PlaybackMode::MediaSourceAttached, LatencyMode::Default);
        let obs = observer.observe(ElementEvent::Tick, state(10.0, 0.1));
        assert!(obs.rebuffering.is_some());
        let obs = observer.observe(ElementEvent::Tick, state(10.0, 2.0));
        assert!(obs.rebuffering.is_none());
    }

    // Spec §8 scenario 6.
    #[test]
    fn internal_seek_relabels_next_seeking_event() {
        let mut observer = PlaybackObserver::new(EngineConfig::default(), PlaybackMode::MediaSourceAttached, LatencyMode::Default);
        observer.begin_internal_seek();
        let obs = observer.observe(ElementEvent::Seeking, state(30.0, 0.05));
        assert_eq!(obs.event, ObservationEvent::InternalSeeking);
        assert_eq!(obs.rebuffering.unwrap().reason, RebufferingReason::InternalSeek);
    }

    #[test]
    fn external_seeking_event_stays_plain() {
        let mut observer = PlaybackObserver::new(EngineConfig::default(), PlaybackMode::MediaSourceAttached, LatencyMode::Default);
        let obs = observer.observe(ElementEvent::Seeking, state(30.0, 5.0));
        assert_eq!(obs.event, ObservationEvent::Seeking);
    }

    #[test]
    fn freezing_set_on_stagnant_position_then_clears_on_movement() {
        let mut observer = PlaybackObserver::new(EngineConfig::default(), PlaybackMode::MediaSourceAttached, LatencyMode::Default);
        observer.observe(ElementEvent::Tick, state(10.0, 5.0));
        let obs = observer.observe(ElementEvent::Tick, state(10.0, 5.0));
        assert!(obs.freezing);
        let obs = observer.observe(ElementEvent::Tick, state(10.5, 5.0));
        assert!(!obs.freezing);
    }

    #[test]
    fn direct_file_mode_infers_rebuffering_from_stagnant_timeupdate() {
        let mut observer = PlaybackObserver::new(EngineConfig::default(), PlaybackMode::DirectFile, LatencyMode::Default);
        observer.observe(ElementEvent::TimeUpdate, state(10.0, f64::INFINITY));
        let obs = observer.observe(ElementEvent::TimeUpdate, state(10.0, f64::INFINITY));
        assert!(obs.rebuffering.is_some());
        let obs = observer.observe(ElementEvent::TimeUpdate, state(10.5, f64::INFINITY));
        assert!(obs.rebuffering.is_none());
    }

    #[test]
    fn initial_observation_is_retained_for_late_subscribers() {
        let mut observer = PlaybackObserver::new(EngineConfig::default(), PlaybackMode::MediaSourceAttached, LatencyMode::Default);
        assert!(observer.initial_observation().is_none());
        let first = observer.observe(ElementEvent::Tick, state(0.0, 5.0));
        observer.observe(ElementEvent::Tick, state(1.0, 5.0));
        assert_eq!(observer.initial_observation().unwrap().position, first.position);
    }
}
