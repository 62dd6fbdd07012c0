//! Integration coverage for spec §8 scenario 5 (track fallback on refresh)
//! and the choose_representation path, exercised through the `Orchestrator`
//! so the Manifest, track-choice manager, and ABR estimator are wired
//! together the way a host embedding this engine would use them.

mod common;

use std::collections::HashMap as StdHashMap;
use std::sync::Arc;

use dash_player_core::abr::PlaybackSample;
use dash_player_core::config::{EngineConfig, LatencyMode, PlaybackMode};
use dash_player_core::error::NetworkError;
use dash_player_core::fetch::{CancellationToken, HttpRequest, HttpRequestFn, HttpResponse};
use dash_player_core::manifest::build::ManifestBuilder;
use dash_player_core::manifest::bounds::DynamicBoundsParams;
use dash_player_core::manifest::{Adaptation, Decipherable, Manifest, MediaType, Period, Representation, TransportType};
use dash_player_core::orchestrator::{LifecycleEvent, Orchestrator};
use dash_player_core::segment_index::template::TemplateIndex;
use dash_player_core::segment_index::SegmentIndex;
use dash_player_core::time::TimeBase;

struct NeverCalledLoader;

#[async_trait::async_trait]
impl HttpRequestFn for NeverCalledLoader {
    async fn request(&self, _req: HttpRequest, _cancel: CancellationToken) -> Result<HttpResponse, NetworkError> {
        Err(NetworkError::Other("not reachable in this test".into()))
    }
}

fn video_representation(id: &str, bitrate: u64) -> Representation {
    Representation {
        id: id.into(),
        bitrate,
        codecs: None,
        mime_type: Some("video/mp4".into()),
        width: None,
        height: None,
        frame_rate: None,
        hdr_info: None,
        decipherable: Decipherable::Unknown,
        is_supported: true,
        index: SegmentIndex::Template(TemplateIndex {
            time_base: TimeBase::new(1000, 0),
            init_template: None,
            media_template: "$Number$.m4s".into(),
            representation_id: id.into(),
            bitrate,
            start_number: 1,
            duration_ticks: 4000,
            period_start: 0.0,
            period_duration: Some(40.0),
            is_dynamic: false,
            bounds: DynamicBoundsParams::default(),
            minimum_segment_size: 0.005,
        }),
    }
}

fn video_adaptation(id: &str, representations: Vec<Representation>) -> Adaptation {
    Adaptation {
        id: id.into(),
        media_type: MediaType::Video,
        language: None,
        normalized_language: None,
        is_audio_description: false,
        is_closed_caption: false,
        is_dub: false,
        is_sign_interpreted: false,
        is_trick_mode_track: false,
        manually_added: false,
        trick_mode_track_ids: None,
        representations,
    }
}

fn manifest_with_video_adaptations(adaptations: Vec<Adaptation>) -> Manifest {
    let mut by_type = StdHashMap::new();
    by_type.insert(MediaType::Video, adaptations);
    let period = Period { id: "p0".into(), start: 0.0, end: Some(40.0), adaptations: by_type, in_manifest: true };
    ManifestBuilder::new(TransportType::Dash).uri("https://cdn.example/m.mpd").period(period).build().unwrap()
}

fn new_orchestrator(manifest: Manifest) -> (Orchestrator, tokio::sync::mpsc::UnboundedReceiver<LifecycleEvent>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(
        EngineConfig::default(),
        manifest,
        Arc::new(NeverCalledLoader),
        None,
        PlaybackMode::MediaSourceAttached,
        LatencyMode::Default,
        tx,
    );
    (orchestrator, rx)
}

// Spec §8 scenario 5, exercised through the Orchestrator: the active
// Adaptation for video disappears on refresh, and the first supported
// remaining Adaptation is adopted with a forced-fallback Warning, surfaced
// before any ReloadRequired since the merge itself still succeeds.
#[tokio::test]
async fn refresh_falls_back_to_remaining_video_adaptation() {
    common::setup_logging();
    let manifest = manifest_with_video_adaptations(vec![
        video_adaptation("a-hd", vec![video_representation("hd1", 3_000_000)]),
        video_adaptation("a-sd", vec![video_representation("sd1", 500_000)]),
    ]);
    let period = manifest.period_by_id("p0").unwrap().clone();
    let (mut orchestrator, mut rx) = new_orchestrator(manifest);

    orchestrator.track_choice_mut().set_video_track_by_id(&period, "a-hd").unwrap();
    assert_eq!(orchestrator.track_choice_mut().get_chosen_track("p0", MediaType::Video), Some("a-hd".into()));

    let refreshed = manifest_with_video_adaptations(vec![video_adaptation("a-sd", vec![video_representation("sd1", 500_000)])]);
    orchestrator.refresh_manifest(refreshed);

    assert_eq!(orchestrator.track_choice_mut().get_chosen_track("p0", MediaType::Video), Some("a-sd".into()));
    let mut saw_fallback_warning = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, LifecycleEvent::Warning(_)) {
            saw_fallback_warning = true;
        }
        assert!(!matches!(event, LifecycleEvent::ReloadRequired), "a successful merge must not also request a reload");
    }
    assert!(saw_fallback_warning);
}

// choose_representation must resolve through the track-choice manager's
// wanted Adaptation, not an assumed first Adaptation, and must pick the
// bandwidth-appropriate Representation within it.
#[tokio::test]
async fn choose_representation_follows_chosen_adaptation() {
    common::setup_logging();
    let manifest = manifest_with_video_adaptations(vec![
        video_adaptation("a-main", vec![video_representation("low", 400_000), video_representation("high", 4_000_000)]),
    ]);
    let period = manifest.period_by_id("p0").unwrap().clone();
    let (mut orchestrator, _rx) = new_orchestrator(manifest);
    orchestrator.track_choice_mut().set_video_track_by_id(&period, "a-main").unwrap();

    let sample = PlaybackSample { buffer_gap: 2.0, position: 0.0, speed: 1.0, duration: 40.0, live_gap: None };
    let estimate = orchestrator.choose_representation("p0", MediaType::Video, &sample, 0).expect("a chosen Adaptation must resolve");

    // With no bandwidth samples yet the estimator has to fall back to a
    // conservative choice; either candidate bitrate is acceptable here, but
    // the call must resolve through the real Adaptation rather than panic
    // or silently return the wrong stream's Representations.
    assert!(estimate.bitrate == 400_000 || estimate.bitrate == 4_000_000);
}
