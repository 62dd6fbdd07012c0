//! C3 — Manifest model (spec §3, §4.3).
//!
//! The domain tree the rest of the engine operates on: `Manifest` owns
//! `Period`s, a `Period` owns its `Adaptation`s keyed by media type, an
//! `Adaptation` owns a bitrate-ascending list of `Representation`s, and each
//! `Representation` owns the [`SegmentIndex`](crate::segment_index::SegmentIndex)
//! built for it. This is the tree a fresh parse or a refresh produces; see
//! [`build`] for how a refresh is merged into an existing tree in place.

pub mod bounds;
pub mod build;
pub mod raw;

use std::collections::HashMap;

use crate::segment_index::SegmentIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
    Text,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    Dash,
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decipherable {
    True,
    False,
    /// No license/key status has been checked yet.
    Unknown,
}

/// Whether a platform can actually play a Representation's codec/container,
/// kept as a trait rather than a field so callers can swap probing
/// strategies (a real MSE `isTypeSupported` check vs. a static allowlist in
/// tests) without touching the domain model itself.
pub trait CodecSupport {
    fn is_supported(&self, mime_type: Option<&str>, codecs: Option<&str>) -> bool;
}

/// A `CodecSupport` that accepts everything; used where no platform probe is
/// wired in (tests, headless use).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSupported;

impl CodecSupport for AlwaysSupported {
    fn is_supported(&self, _mime_type: Option<&str>, _codecs: Option<&str>) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct Representation {
    pub id: String,
    pub bitrate: u64,
    pub codecs: Option<String>,
    pub mime_type: Option<String>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub frame_rate: Option<f64>,
    pub hdr_info: Option<String>,
    pub decipherable: Decipherable,
    pub is_supported: bool,
    pub index: SegmentIndex,
}

impl Representation {
    /// Score candidates are sorted ascending on bitrate (spec §3); callers
    /// needing the "maintainability" of a choice go through [`crate::scorer`].
    pub fn is_playable(&self) -> bool {
        self.is_supported && self.decipherable != Decipherable::False
    }
}

#[derive(Debug, Clone)]
pub struct Adaptation {
    pub id: String,
    pub media_type: MediaType,
    pub language: Option<String>,
    pub normalized_language: Option<String>,
    pub is_audio_description: bool,
    pub is_closed_caption: bool,
    pub is_dub: bool,
    pub is_sign_interpreted: bool,
    pub is_trick_mode_track: bool,
    /// Set when this Adaptation was synthesized by the core (e.g. a
    /// forced-subtitles track) rather than parsed from the manifest.
    pub manually_added: bool,
    /// Representation ids of the Adaptation this one is a trickmode track for.
    pub trick_mode_track_ids: Option<Vec<String>>,
    /// Ascending by bitrate (spec §3 "Representation").
    pub representations: Vec<Representation>,
}

impl Adaptation {
    pub fn representation_by_id(&self, id: &str) -> Option<&Representation> {
        self.representations.iter().find(|r| r.id == id)
    }

    pub fn representation_mut_by_id(&mut self, id: &str) -> Option<&mut Representation> {
        self.representations.iter_mut().find(|r| r.id == id)
    }

    pub fn is_supported(&self) -> bool {
        self.representations.iter().any(|r| r.is_playable())
    }
}

#[derive(Debug, Clone)]
pub struct Period {
    pub id: String,
    pub start: f64,
    pub end: Option<f64>,
    pub adaptations: HashMap<MediaType, Vec<Adaptation>>,
    /// Cleared on refresh if this Period no longer appears in the manifest;
    /// the Period is retained (not removed) until nothing references it any
    /// more (spec §4.3 "disappeared Periods").
    pub in_manifest: bool,
}

impl Period {
    pub fn duration(&self) -> Option<f64> {
        self.end.map(|e| e - self.start)
    }

    pub fn adaptations_of(&self, media_type: MediaType) -> &[Adaptation] {
        self.adaptations.get(&media_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn adaptation_by_id(&self, id: &str) -> Option<&Adaptation> {
        self.adaptations.values().flatten().find(|a| a.id == id)
    }

    pub fn adaptation_mut_by_id(&mut self, id: &str) -> Option<&mut Adaptation> {
        self.adaptations.values_mut().flatten().find(|a| a.id == id)
    }

    pub fn representation_by_id(&self, adaptation_id: &str, representation_id: &str) -> Option<&Representation> {
        self.adaptation_by_id(adaptation_id)?.representation_by_id(representation_id)
    }
}

/// How far the manifest's addressable window currently extends; mirrors the
/// global bounds calculator ([`bounds::compute_at`]).
#[derive(Debug, Clone, Copy)]
pub struct TimeBounds {
    pub minimum_position: f64,
    pub maximum_position: Option<f64>,
    /// `None` means the window is unbounded (VOD, or a live stream with no DVR cap).
    pub timeshift_buffer_depth: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub transport_type: TransportType,
    pub uris: Vec<String>,
    pub is_dynamic: bool,
    /// `false` once the server has signalled there will be no more Periods.
    pub is_last_period_known: bool,
    pub availability_start_time: Option<f64>,
    pub clock_offset_ms: Option<f64>,
    pub suggested_presentation_delay: Option<f64>,
    /// `minimumUpdatePeriod`; spec §9 Open Questions covers the zero-value fallback.
    pub lifetime: Option<std::time::Duration>,
    pub time_bounds: TimeBounds,
    pub periods: Vec<Period>,
}

impl Manifest {
    pub fn period_by_id(&self, id: &str) -> Option<&Period> {
        self.periods.iter().find(|p| p.id == id)
    }

    pub fn period_mut_by_id(&mut self, id: &str) -> Option<&mut Period> {
        self.periods.iter_mut().find(|p| p.id == id)
    }

    pub fn representation_by_ids(
        &self,
        period_id: &str,
        adaptation_id: &str,
        representation_id: &str,
    ) -> Option<&Representation> {
        self.period_by_id(period_id)?.representation_by_id(adaptation_id, representation_id)
    }

    /// Periods currently advertised by the server, in order.
    pub fn active_periods(&self) -> impl Iterator<Item = &Period> {
        self.periods.iter().filter(|p| p.in_manifest)
    }

    /// Remove Periods that have both dropped out of the manifest and have no
    /// remaining subscriber, per `is_referenced`. The Track-choice manager
    /// (spec §4.7) is the usual caller, once it has dropped its own
    /// PeriodInfo entry.
    pub fn gc_periods(&mut self, is_referenced: impl Fn(&str) -> bool) {
        self.periods.retain(|p| p.in_manifest || is_referenced(&p.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment_index::template::TemplateIndex;
    use crate::time::TimeBase;

    fn sample_representation(id: &str, bitrate: u64) -> Representation {
        Representation {
            id: id.into(),
            bitrate,
            codecs: Some("avc1.640028".into()),
            mime_type: Some("video/mp4".into()),
            width: Some(1920),
            height: Some(1080),
            frame_rate: Some(25.0),
            hdr_info: None,
            decipherable: Decipherable::Unknown,
            is_supported: true,
            index: SegmentIndex::Template(TemplateIndex {
                time_base: TimeBase::new(1000, 0),
                init_template: None,
                media_template: "chunk-$Number$.m4s".into(),
                representation_id: id.into(),
                bitrate,
                start_number: 1,
                duration_ticks: 4000,
                period_start: 0.0,
                period_duration: Some(40.0),
                is_dynamic: false,
                bounds: crate::manifest::bounds::DynamicBoundsParams::default(),
                minimum_segment_size: 0.005,
            }),
        }
    }

    fn sample_manifest() -> Manifest {
        let mut adaptations = HashMap::new();
        adaptations.insert(
            MediaType::Video,
            vec![Adaptation {
                id: "video-0".into(),
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
                representations: vec![
                    sample_representation("v1", 500_000),
                    sample_representation("v2", 2_000_000),
                ],
            }],
        );
        Manifest {
            transport_type: TransportType::Dash,
            uris: vec!["https://cdn.example/manifest.mpd".into()],
            is_dynamic: false,
            is_last_period_known: true,
            availability_start_time: None,
            clock_offset_ms: None,
            suggested_presentation_delay: None,
            lifetime: None,
            time_bounds: TimeBounds { minimum_position: 0.0, maximum_position: Some(40.0), timeshift_buffer_depth: None },
            periods: vec![Period {
                id: "p0".into(),
                start: 0.0,
                end: Some(40.0),
                adaptations,
                in_manifest: true,
            }],
        }
    }

    #[test]
    fn lookup_by_ids_finds_nested_representation() {
        let m = sample_manifest();
        let rep = m.representation_by_ids("p0", "video-0", "v2").unwrap();
        assert_eq!(rep.bitrate, 2_000_000);
    }

    #[test]
    fn gc_periods_keeps_referenced_stale_period() {
        let mut m = sample_manifest();
        m.period_mut_by_id("p0").unwrap().in_manifest = false;
        m.gc_periods(|id| id == "p0");
        assert_eq!(m.periods.len(), 1);
        m.gc_periods(|_| false);
        assert!(m.periods.is_empty());
    }
}
