//! C11 — Orchestrator (spec §2 row C11).
//!
//! Wires the Manifest model (C3), ABR estimator (C8), segment fetcher (C7),
//! playback observer (C9), and track-choice manager (C10) together and
//! drives the playback lifecycle events a host embedding this engine cares
//! about (loaded / stalled / end-of-stream / reload).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;

use crate::abr::{AbrEstimate, AbrEstimator, PlaybackSample, RepresentationCandidate};
use crate::config::EngineConfig;
use crate::error::{EngineError, ManifestError, Warning};
use crate::fetch::{CancellationToken, FetchEvent, HttpRequestFn, RetryPolicy, SegmentCache, SegmentFetcher};
use crate::manifest::build::merge_refresh;
use crate::manifest::{Manifest, MediaType};
use crate::pending_requests::PendingRequestContent;
use crate::playback_observer::{ElementEvent, ElementState, Observation, PlaybackObserver};
use crate::track_choice::TrackChoiceManager;

/// Lifecycle events the host embedding this engine subscribes to.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Loaded,
    Stalled { reason: String },
    EndOfStream,
    ReloadRequired,
    /// Surfaced from any sub-pipeline; only some are fatal (spec §7
    /// "the orchestrator mediates between fatal errors from different
    /// sub-pipelines").
    Warning(Warning),
    FatalError(String),
}

/// One (media-type, Period) ABR instance, matching the ownership rule of
/// spec §5 ("no cross-instance sharing").
struct StreamContext {
    abr: AbrEstimator,
}

pub struct Orchestrator {
    config: EngineConfig,
    manifest: Manifest,
    track_choice: TrackChoiceManager,
    observer: PlaybackObserver,
    fetcher: SegmentFetcher,
    streams: HashMap<(String, MediaType), StreamContext>,
    lifecycle: UnboundedSender<LifecycleEvent>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        manifest: Manifest,
        request_fn: Arc<dyn HttpRequestFn>,
        cache: Option<Arc<dyn SegmentCache>>,
        mode: crate::config::PlaybackMode,
        latency: crate::config::LatencyMode,
        lifecycle: UnboundedSender<LifecycleEvent>,
    ) -> Self {
        let retry: RetryPolicy = (&config).into();
        let mut fetcher = SegmentFetcher::new(request_fn, retry, "seg");
        if let Some(cache) = cache {
            fetcher = fetcher.with_cache(cache);
        }
        Orchestrator {
            observer: PlaybackObserver::new(config.clone(), mode, latency),
            config,
            manifest,
            track_choice: TrackChoiceManager::new(),
            fetcher,
            streams: HashMap::new(),
            lifecycle,
            cancel: CancellationToken::new(),
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.lifecycle.send(event);
    }

    /// Apply a freshly parsed Manifest to the current one (spec §4.3),
    /// reconcile track choices, and surface a reload if the merge itself
    /// fails (a structural mismatch the core cannot safely absorb).
    #[tracing::instrument(level = "debug", skip(self, incoming))]
    pub fn refresh_manifest(&mut self, incoming: Manifest) {
        match merge_refresh(&mut self.manifest, incoming) {
            Ok(()) => {
                let notifications = self.track_choice.update_period_list(&self.manifest);
                for notification in notifications {
                    tracing::debug!(
                        period_id = %notification.period_id,
                        media_type = ?notification.media_type,
                        chosen = ?notification.chosen,
                        "track reconciled after refresh"
                    );
                    self.emit(LifecycleEvent::Warning(Warning::new(format!(
                        "track reconciliation: period {} {:?} -> {:?}",
                        notification.period_id, notification.media_type, notification.chosen
                    ))));
                }
                let referenced: Vec<String> = self.manifest.periods.iter().map(|p| p.id.clone()).collect();
                self.manifest.gc_periods(|id| {
                    self.track_choice.is_referenced(id) || referenced.contains(&id.to_string())
                });
            }
            Err(ManifestError::RefreshFailed(reason)) => {
                tracing::warn!(reason = %reason, "manifest refresh failed, requesting reload");
                self.emit(LifecycleEvent::Warning(Warning::new(reason)));
                self.emit(LifecycleEvent::ReloadRequired);
            }
            Err(e) => {
                tracing::error!(error = %e, "manifest refresh hit a fatal error");
                self.emit(LifecycleEvent::FatalError(e.to_string()));
            }
        }
    }

    fn stream_context_mut(&mut self, period_id: &str, media_type: MediaType) -> &mut StreamContext {
        self.streams
            .entry((period_id.to_string(), media_type))
            .or_insert_with(|| StreamContext { abr: AbrEstimator::new(self.config.clone()) })
    }

    /// Before mutating the media element's current time, mark the next
    /// `seeking` event as internally caused (spec §4.6).
    pub fn seek_to(&mut self, _position: f64) {
        self.observer.begin_internal_seek();
    }

    pub fn observe(&mut self, event: ElementEvent, state: ElementState) -> Observation {
        let observation = self.observer.observe(event, state);
        if observation.freezing {
            self.emit(LifecycleEvent::Stalled { reason: "freezing".into() });
        } else if observation.rebuffering.is_some() {
            self.emit(LifecycleEvent::Stalled { reason: "rebuffering".into() });
        }
        if observation.ended {
            self.emit(LifecycleEvent::EndOfStream);
        }
        observation
    }

    /// Ask the ABR estimator for the next Representation to fetch for one
    /// (Period, media-type) stream (spec §4.5).
    pub fn choose_representation(
        &mut self,
        period_id: &str,
        media_type: MediaType,
        sample: &PlaybackSample,
        current_index: usize,
    ) -> Option<AbrEstimate> {
        let period = self.manifest.period_by_id(period_id)?;
        let adaptation_id = self.track_choice.get_chosen_track(period_id, media_type)?;
        let adaptation = period.adaptation_by_id(&adaptation_id)?;
        let candidates: Vec<RepresentationCandidate> =
            adaptation.representations.iter().map(|r| RepresentationCandidate { id: r.id.clone(), bitrate: r.bitrate }).collect();
        if candidates.is_empty() {
            return None;
        }
        let context = self.stream_context_mut(period_id, media_type);
        Some(context.abr.estimate(Instant::now(), sample, &candidates, current_index.min(candidates.len() - 1)))
    }

    /// Fetch one segment for a (Period, Adaptation, Representation), feeding
    /// the result back into the owning stream's ABR instance (spec §4.4,
    /// §4.5 "Metric intake").
    #[tracing::instrument(level = "debug", skip(self, segment, events), fields(segment_id = %segment.id, representation_id))]
    pub async fn fetch_segment(
        &mut self,
        period_id: &str,
        media_type: MediaType,
        adaptation_id: &str,
        representation_id: &str,
        segment: &crate::segment_index::Segment,
        events: &UnboundedSender<FetchEvent>,
    ) -> Result<bytes::Bytes, EngineError> {
        let bitrate = self
            .manifest
            .representation_by_ids(period_id, adaptation_id, representation_id)
            .map(|r| r.bitrate)
            .unwrap_or(0);
        let content = PendingRequestContent {
            period_id: period_id.to_string(),
            adaptation_id: adaptation_id.to_string(),
            representation_id: representation_id.to_string(),
            segment_id: segment.id.clone(),
            representation_bitrate: bitrate,
        };

        let started = Instant::now();
        let result = self.fetcher.fetch(segment, &content, false, events, self.cancel.clone()).await;
        let elapsed = started.elapsed();

        let context = self.stream_context_mut(period_id, media_type);
        match &result {
            Ok(bytes) => {
                tracing::trace!(bytes = bytes.len(), elapsed_ms = elapsed.as_millis() as u64, "segment fetch completed");
                context.abr.record_completed_request(representation_id, bytes.len() as u64, elapsed, segment.duration, segment.is_init);
            }
            Err(e) => {
                tracing::warn!(error = %e, "segment fetch failed, no bandwidth sample recorded");
                // A failed request contributes no bandwidth sample (spec §7:
                // "the ABR estimator ... treats a failed request as a
                // zero-throughput sample discarded by the cache-detection
                // heuristic").
            }
        }
        result
    }

    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    pub fn track_choice_mut(&mut self) -> &mut TrackChoiceManager {
        &mut self.track_choice
    }

    pub fn sampling_interval(&self) -> Duration {
        self.observer.sampling_interval()
    }
}
