//! C10 — Track-choice manager (spec §4.7).
//!
//! Keeps one Period-info record per (Period, MediaType), each holding the
//! *wanted* Adaptation id (or disabled) independent of the Manifest tree
//! itself (Design Note 9: "resolved by id indirection"). Reconciles with
//! Manifest refreshes via [`TrackChoiceManager::update_period_list`].

use std::collections::HashMap;

use crate::manifest::{Adaptation, Manifest, MediaType, Period};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSelection {
    Disabled,
    Adaptation(String),
}

/// Per-(Period, type) record (spec §3 "Period-info").
#[derive(Debug, Clone)]
struct PeriodTypeInfo {
    wanted: TrackSelection,
    last_emitted: Option<String>,
    /// For video: the Adaptation the user actually chose, kept separate from
    /// `wanted` so trick-mode toggling doesn't lose the underlying choice
    /// (spec §4.7 "wanted_track_base").
    wanted_track_base: Option<String>,
}

impl Default for PeriodTypeInfo {
    fn default() -> Self {
        PeriodTypeInfo { wanted: TrackSelection::Disabled, last_emitted: None, wanted_track_base: None }
    }
}

#[derive(Debug, Clone)]
struct PeriodInfo {
    period_id: String,
    in_manifest: bool,
    by_type: HashMap<MediaType, PeriodTypeInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackChangeNotification {
    pub period_id: String,
    pub media_type: MediaType,
    pub chosen: Option<String>,
    /// `true` when the previously wanted Adaptation disappeared and this
    /// notification is a fallback, not a user-driven choice.
    pub was_forced_fallback: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackChoiceError {
    #[error("adaptation {adaptation_id} not found in period {period_id}")]
    AdaptationNotFound { period_id: String, adaptation_id: String },
}

/// Holds the player's chosen Adaptation per (Period, type) across Manifest
/// refreshes, independent of the Manifest tree's own lifetime.
#[derive(Debug, Clone, Default)]
pub struct TrackChoiceManager {
    periods: Vec<PeriodInfo>,
}

fn first_supported_adaptation(period: &Period, media_type: MediaType) -> Option<&Adaptation> {
    period.adaptations_of(media_type).iter().find(|a| a.is_supported())
}

impl TrackChoiceManager {
    pub fn new() -> Self {
        TrackChoiceManager::default()
    }

    fn period_info_mut(&mut self, period_id: &str) -> Option<&mut PeriodInfo> {
        self.periods.iter_mut().find(|p| p.period_id == period_id)
    }

    fn period_info(&self, period_id: &str) -> Option<&PeriodInfo> {
        self.periods.iter().find(|p| p.period_id == period_id)
    }

    pub fn is_referenced(&self, period_id: &str) -> bool {
        self.period_info(period_id).is_some()
    }

    /// Merge by id, preserving subscriber-held records; removed Periods are
    /// marked `in_manifest = false` and kept until dropped explicitly (spec
    /// §4.7). Returns fallback notifications for any wanted Adaptation that
    /// disappeared.
    pub fn update_period_list(&mut self, manifest: &Manifest) -> Vec<TrackChangeNotification> {
        let mut notifications = Vec::new();

        for existing in &mut self.periods {
            existing.in_manifest = manifest.period_by_id(&existing.period_id).is_some();
        }

        for period in &manifest.periods {
            if self.period_info(&period.id).is_none() {
                self.periods.push(PeriodInfo { period_id: period.id.clone(), in_manifest: true, by_type: HashMap::new() });
            }
        }

        for period in &manifest.periods {
            for media_type in [MediaType::Audio, MediaType::Video, MediaType::Text, MediaType::Image] {
                if period.adaptations_of(media_type).is_empty() {
                    continue;
                }
                if let Some(notification) = self.reconcile_type(period, media_type) {
                    notifications.push(notification);
                }
            }
        }
        notifications
    }

    #[tracing::instrument(level = "trace", skip(self, period), fields(period_id = %period.id))]
    fn reconcile_type(&mut self, period: &Period, media_type: MediaType) -> Option<TrackChangeNotification> {
        let info = self.period_info_mut(&period.id)?;
        let type_info = info.by_type.entry(media_type).or_default();

        let wanted_id = match &type_info.wanted {
            TrackSelection::Disabled => return None,
            TrackSelection::Adaptation(id) => id.clone(),
        };

        if period.adaptation_by_id(&wanted_id).is_some() {
            return None;
        }

        // The previously wanted Adaptation is gone; fall back (spec §4.7).
        let fallback = first_supported_adaptation(period, media_type).map(|a| a.id.clone());
        tracing::debug!(media_type = ?media_type, wanted = %wanted_id, fallback = ?fallback, "wanted adaptation disappeared, falling back");
        type_info.wanted = match &fallback {
            Some(id) => TrackSelection::Adaptation(id.clone()),
            None => TrackSelection::Disabled,
        };
        type_info.last_emitted = fallback.clone();
        Some(TrackChangeNotification { period_id: period.id.clone(), media_type, chosen: fallback, was_forced_fallback: true })
    }

    /// Set the wanted Adaptation for one (Period, type) (spec §4.7). Setting a
    /// non-existent Adaptation id is a hard error; a Period the manager isn't
    /// tracking (no longer in the Manifest) is a logged no-op, not an error.
    fn set_track(
        &mut self,
        period: &Period,
        media_type: MediaType,
        adaptation_id: &str,
    ) -> Result<Option<TrackChangeNotification>, TrackChoiceError> {
        if period.adaptation_by_id(adaptation_id).is_none() {
            return Err(TrackChoiceError::AdaptationNotFound {
                period_id: period.id.clone(),
                adaptation_id: adaptation_id.to_string(),
            });
        }
        let Some(info) = self.periods.iter_mut().find(|p| p.period_id == period.id) else {
            tracing::warn!(period_id = %period.id, ?media_type, adaptation_id, "set_track: period not found, ignoring");
            return Ok(None);
        };
        let type_info = info.by_type.entry(media_type).or_default();
        type_info.wanted = TrackSelection::Adaptation(adaptation_id.to_string());
        type_info.last_emitted = Some(adaptation_id.to_string());
        if media_type == MediaType::Video {
            type_info.wanted_track_base = Some(adaptation_id.to_string());
        }
        Ok(Some(TrackChangeNotification {
            period_id: period.id.clone(),
            media_type,
            chosen: Some(adaptation_id.to_string()),
            was_forced_fallback: false,
        }))
    }

    /// Disable the wanted track for one (Period, type) (spec §4.7). A Period
    /// the manager isn't tracking is a logged no-op: there is no adaptation
    /// id to get wrong here, so this never errors.
    fn disable_track(&mut self, period_id: &str, media_type: MediaType) {
        let Some(info) = self.period_info_mut(period_id) else {
            tracing::warn!(period_id, ?media_type, "disable_track: period not found, ignoring");
            return;
        };
        let type_info = info.by_type.entry(media_type).or_default();
        type_info.wanted = TrackSelection::Disabled;
        type_info.last_emitted = None;
    }

    pub fn set_audio_track_by_id(
        &mut self,
        period: &Period,
        id: &str,
    ) -> Result<Option<TrackChangeNotification>, TrackChoiceError> {
        self.set_track(period, MediaType::Audio, id)
    }

    pub fn set_text_track_by_id(
        &mut self,
        period: &Period,
        id: &str,
    ) -> Result<Option<TrackChangeNotification>, TrackChoiceError> {
        self.set_track(period, MediaType::Text, id)
    }

    pub fn set_video_track_by_id(
        &mut self,
        period: &Period,
        id: &str,
    ) -> Result<Option<TrackChangeNotification>, TrackChoiceError> {
        self.set_track(period, MediaType::Video, id)
    }

    pub fn disable_audio_track(&mut self, period_id: &str) {
        self.disable_track(period_id, MediaType::Audio)
    }

    pub fn disable_text_track(&mut self, period_id: &str) {
        self.disable_track(period_id, MediaType::Text)
    }

    pub fn disable_video_track(&mut self, period_id: &str) {
        self.disable_track(period_id, MediaType::Video)
    }

    pub fn get_chosen_track(&self, period_id: &str, media_type: MediaType) -> Option<String> {
        match &self.period_info(period_id)?.by_type.get(&media_type)?.wanted {
            TrackSelection::Adaptation(id) => Some(id.clone()),
            TrackSelection::Disabled => None,
        }
    }

    /// The "normal" video Adaptation even while a trickmode track is active
    /// (spec §4.7 "wanted_track_base").
    pub fn get_wanted_video_track_base(&self, period_id: &str) -> Option<String> {
        self.period_info(period_id)?.by_type.get(&MediaType::Video)?.wanted_track_base.clone()
    }

    pub fn get_available_tracks<'a>(&self, period: &'a Period, media_type: MediaType) -> &'a [Adaptation] {
        period.adaptations_of(media_type)
    }

    /// Drop a Period-info record, releasing its hold on a stale Period so
    /// `Manifest::gc_periods` can reclaim it (spec §4.3, §4.7).
    pub fn forget_period(&mut self, period_id: &str) {
        self.periods.retain(|p| p.period_id != period_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Decipherable, Representation};
    use crate::segment_index::template::TemplateIndex;
    use crate::segment_index::SegmentIndex;
    use crate::time::TimeBase;
    use std::collections::HashMap as StdHashMap;

    fn rep(id: &str) -> Representation {
        Representation {
            id: id.into(),
            bitrate: 128_000,
            codecs: None,
            mime_type: Some("audio/mp4".into()),
            width: None,
            height: None,
            frame_rate: None,
            hdr_info: None,
            decipherable: Decipherable::Unknown,
            is_supported: true,
            index: SegmentIndex::Template(TemplateIndex {
                time_base: TimeBase::new(1000, 0),
                init_template: None,
                media_template: "chunk-$Number$.m4s".into(),
                representation_id: id.into(),
                bitrate: 128_000,
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

    fn audio_adaptation(id: &str, lang: &str) -> Adaptation {
        Adaptation {
            id: id.into(),
            media_type: MediaType::Audio,
            language: Some(lang.into()),
            normalized_language: Some(lang.into()),
            is_audio_description: false,
            is_closed_caption: false,
            is_dub: false,
            is_sign_interpreted: false,
            is_trick_mode_track: false,
            manually_added: false,
            trick_mode_track_ids: None,
            representations: vec![rep(id)],
        }
    }

    fn period_with_audio(adaptations: Vec<Adaptation>) -> Period {
        let mut by_type = StdHashMap::new();
        by_type.insert(MediaType::Audio, adaptations);
        Period { id: "p1".into(), start: 0.0, end: Some(40.0), adaptations: by_type, in_manifest: true }
    }

    fn manifest_with(period: Period) -> Manifest {
        Manifest {
            transport_type: crate::manifest::TransportType::Dash,
            uris: vec!["https://cdn.example/m.mpd".into()],
            is_dynamic: false,
            is_last_period_known: true,
            availability_start_time: None,
            clock_offset_ms: None,
            suggested_presentation_delay: None,
            lifetime: None,
            time_bounds: crate::manifest::TimeBounds { minimum_position: 0.0, maximum_position: Some(40.0), timeshift_buffer_depth: None },
            periods: vec![period],
        }
    }

    // Spec §8 scenario 5.
    #[test]
    fn reconciles_to_fallback_when_chosen_adaptation_disappears() {
        let mut manager = TrackChoiceManager::new();
        let period = period_with_audio(vec![audio_adaptation("fr-audio", "fra"), audio_adaptation("de-audio", "deu")]);
        let manifest = manifest_with(period.clone());
        manager.update_period_list(&manifest);
        manager.set_audio_track_by_id(&period, "fr-audio").unwrap();
        assert_eq!(manager.get_chosen_track("p1", MediaType::Audio), Some("fr-audio".into()));

        let refreshed_period = period_with_audio(vec![audio_adaptation("de-audio", "deu")]);
        let refreshed_manifest = manifest_with(refreshed_period);
        let notifications = manager.update_period_list(&refreshed_manifest);

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].chosen, Some("de-audio".into()));
        assert!(notifications[0].was_forced_fallback);
        assert_eq!(manager.get_chosen_track("p1", MediaType::Audio), Some("de-audio".into()));
    }

    #[test]
    fn setting_unknown_adaptation_id_is_an_error() {
        let mut manager = TrackChoiceManager::new();
        let period = period_with_audio(vec![audio_adaptation("fr-audio", "fra")]);
        let manifest = manifest_with(period.clone());
        manager.update_period_list(&manifest);
        let err = manager.set_audio_track_by_id(&period, "ghost").unwrap_err();
        assert!(matches!(err, TrackChoiceError::AdaptationNotFound { .. }));
    }

    // spec §4.7 — setting a track on a Period the manager was never told
    // about is a no-op, not an error; only an unknown adaptation id is.
    #[test]
    fn setting_track_on_untracked_period_is_a_no_op() {
        let mut manager = TrackChoiceManager::new();
        let period = period_with_audio(vec![audio_adaptation("fr-audio", "fra")]);
        let result = manager.set_audio_track_by_id(&period, "fr-audio").unwrap();
        assert!(result.is_none());
        assert_eq!(manager.get_chosen_track("p1", MediaType::Audio), None);
    }

    #[test]
    fn disabling_track_on_untracked_period_is_a_no_op() {
        let mut manager = TrackChoiceManager::new();
        manager.disable_audio_track("ghost-period");
        assert_eq!(manager.get_chosen_track("ghost-period", MediaType::Audio), None);
    }

    #[test]
    fn removed_period_is_retained_until_forgotten() {
        let mut manager = TrackChoiceManager::new();
        let period = period_with_audio(vec![audio_adaptation("fr-audio", "fra")]);
        let mut manifest = manifest_with(period);
        manager.update_period_list(&manifest);
        manifest.periods.clear();
        manager.update_period_list(&manifest);
        assert!(manager.is_referenced("p1"));
        manager.forget_period("p1");
        assert!(!manager.is_referenced("p1"));
    }
}
