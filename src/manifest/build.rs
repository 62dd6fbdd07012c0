//! Refresh/merge logic (spec §4.3): converting a freshly parsed
//! [`raw::RawManifest`] into a domain [`Manifest`], and merging a refresh
//! into an existing tree in place so that live references (a Representation
//! a Representation-chooser already picked, a Period the track-choice
//! manager already recorded) keep working across the refresh.
//!
//! Actually lowering `RawMpd`/`RawSmoothManifest` XML-shaped fields (ISO8601
//! durations, `BaseURL` inheritance, `$Token$` templating) into concrete
//! domain values is out of scope here the same way XML deserialization
//! itself is: this module's job is the *merge* algorithm, exercised with
//! hand-built domain trees in its tests.

use std::collections::{HashMap, HashSet};

use crate::error::ManifestError;

use super::{Adaptation, Manifest, MediaType, Period};

/// Match Periods between an existing tree and a freshly parsed one, by id
/// first and by start time as a fallback (spec §4.3): "Periods are matched
/// by id; if a Period carries no id, by start time."
fn match_period<'a>(existing: &'a [Period], incoming: &Period) -> Option<usize> {
    existing
        .iter()
        .position(|p| p.id == incoming.id)
        .or_else(|| existing.iter().position(|p| (p.start - incoming.start).abs() < 0.001))
}

#[tracing::instrument(level = "trace", skip(existing, incoming), fields(adaptation_id = %existing.id))]
fn merge_adaptation(existing: &mut Adaptation, incoming: Adaptation) -> Result<(), ManifestError> {
    let incoming_ids: HashSet<String> = incoming.representations.iter().map(|r| r.id.clone()).collect();
    for incoming_rep in incoming.representations {
        match existing.representation_mut_by_id(&incoming_rep.id) {
            Some(rep) => {
                rep.index.update(incoming_rep.index).map_err(|e| {
                    tracing::warn!(representation_id = %incoming_rep.id, error = %e, "representation index failed to update");
                    ManifestError::RefreshFailed(format!(
                        "representation {}: {e}",
                        incoming_rep.id
                    ))
                })?;
                rep.bitrate = incoming_rep.bitrate;
                rep.is_supported = incoming_rep.is_supported;
                rep.decipherable = incoming_rep.decipherable;
            }
            None => {
                tracing::trace!(representation_id = %incoming_rep.id, "new representation appeared on refresh");
                existing.representations.push(incoming_rep)
            }
        }
    }
    // Unlike Periods, a Representation genuinely absent from a refreshed
    // Adaptation has been retired by the packager, not just out of the
    // current timeshift window; drop it rather than keeping it forever
    // stale (spec §4.3 "each surviving Representation's Segment-Index calls
    // update").
    let before = existing.representations.len();
    existing.representations.retain(|r| incoming_ids.contains(&r.id));
    if existing.representations.len() != before {
        tracing::debug!(adaptation_id = %existing.id, dropped = before - existing.representations.len(), "representation(s) retired on refresh");
    }
    existing.representations.sort_by_key(|r| r.bitrate);
    Ok(())
}

#[tracing::instrument(level = "trace", skip(existing, incoming), fields(period_id = %existing.id))]
fn merge_period(existing: &mut Period, incoming: Period) -> Result<(), ManifestError> {
    existing.end = incoming.end;
    existing.in_manifest = true;
    for (media_type, incoming_adaptations) in incoming.adaptations {
        let incoming_ids: HashSet<String> = incoming_adaptations.iter().map(|a| a.id.clone()).collect();
        let slot = existing.adaptations.entry(media_type).or_insert_with(Vec::new);
        for incoming_adaptation in incoming_adaptations {
            match slot.iter_mut().find(|a| a.id == incoming_adaptation.id) {
                Some(existing_adaptation) => merge_adaptation(existing_adaptation, incoming_adaptation)?,
                None => {
                    tracing::trace!(adaptation_id = %incoming_adaptation.id, ?media_type, "new adaptation appeared on refresh");
                    slot.push(incoming_adaptation)
                }
            }
        }
        let before = slot.len();
        slot.retain(|a| incoming_ids.contains(&a.id));
        if slot.len() != before {
            tracing::debug!(period_id = %existing.id, ?media_type, dropped = before - slot.len(), "adaptation(s) retired on refresh");
        }
    }
    Ok(())
}

/// Apply a freshly parsed `incoming` manifest onto `current` in place (spec
/// §4.3 "Manifest refresh merge"):
/// - matched Periods merge their Adaptations/Representations, each
///   Representation's Segment-Index `update`d rather than replaced;
/// - new Periods (no match found) are appended;
/// - Periods present in `current` but absent from `incoming` are kept, with
///   `in_manifest` cleared, rather than removed (callers prune later via
///   [`Manifest::gc_periods`](super::Manifest::gc_periods)).
#[tracing::instrument(level = "debug", skip(current, incoming), fields(existing_periods = current.periods.len(), incoming_periods = incoming.periods.len()))]
pub fn merge_refresh(current: &mut Manifest, incoming: Manifest) -> Result<(), ManifestError> {
    current.is_dynamic = incoming.is_dynamic;
    current.is_last_period_known = incoming.is_last_period_known;
    current.availability_start_time = incoming.availability_start_time;
    current.clock_offset_ms = incoming.clock_offset_ms;
    current.suggested_presentation_delay = incoming.suggested_presentation_delay;
    current.lifetime = incoming.lifetime;
    current.time_bounds = incoming.time_bounds;

    let mut matched = vec![false; current.periods.len()];
    let mut appended = Vec::new();
    for incoming_period in incoming.periods {
        match match_period(&current.periods, &incoming_period) {
            Some(i) => {
                merge_period(&mut current.periods[i], incoming_period)?;
                matched[i] = true;
            }
            None => {
                tracing::debug!(period_id = %incoming_period.id, "new period appended on refresh");
                appended.push(incoming_period)
            }
        }
    }
    for (i, was_matched) in matched.into_iter().enumerate() {
        if !was_matched {
            tracing::trace!(period_id = %current.periods[i].id, "period absent from refresh, marked stale");
            current.periods[i].in_manifest = false;
        }
    }
    current.periods.extend(appended);
    Ok(())
}

/// Synthesize a forced-subtitles or other manually added Adaptation and
/// attach it to a Period (spec §3 "manually_added"), used by callers that
/// inject tracks the manifest itself never advertised.
pub fn attach_manual_adaptation(period: &mut Period, media_type: MediaType, adaptation: Adaptation) {
    period.adaptations.entry(media_type).or_insert_with(Vec::new).push(adaptation);
}

/// Incremental builder mirroring the teacher's pattern of assembling a
/// parsed value field-by-field with sensible defaults before validating it
/// as a whole, used where the raw layer hands back partial information
/// (e.g. Periods parsed before their xlinks resolve).
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    transport_type: Option<super::TransportType>,
    uris: Vec<String>,
    is_dynamic: bool,
    is_last_period_known: bool,
    availability_start_time: Option<f64>,
    clock_offset_ms: Option<f64>,
    suggested_presentation_delay: Option<f64>,
    lifetime: Option<std::time::Duration>,
    time_bounds: Option<super::TimeBounds>,
    periods: Vec<Period>,
}

impl ManifestBuilder {
    pub fn new(transport_type: super::TransportType) -> Self {
        ManifestBuilder { transport_type: Some(transport_type), ..Default::default() }
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uris.push(uri.into());
        self
    }

    pub fn dynamic(mut self, is_dynamic: bool) -> Self {
        self.is_dynamic = is_dynamic;
        self
    }

    pub fn last_period_known(mut self, known: bool) -> Self {
        self.is_last_period_known = known;
        self
    }

    pub fn availability_start_time(mut self, t: f64) -> Self {
        self.availability_start_time = Some(t);
        self
    }

    pub fn clock_offset_ms(mut self, ms: f64) -> Self {
        self.clock_offset_ms = Some(ms);
        self
    }

    pub fn suggested_presentation_delay(mut self, d: f64) -> Self {
        self.suggested_presentation_delay = Some(d);
        self
    }

    pub fn lifetime(mut self, d: std::time::Duration) -> Self {
        self.lifetime = Some(d);
        self
    }

    pub fn time_bounds(mut self, bounds: super::TimeBounds) -> Self {
        self.time_bounds = Some(bounds);
        self
    }

    pub fn period(mut self, period: Period) -> Self {
        self.periods.push(period);
        self
    }

    pub fn build(self) -> Result<Manifest, ManifestError> {
        let transport_type = self
            .transport_type
            .ok_or_else(|| ManifestError::Parse("missing transport type".into()))?;
        if self.uris.is_empty() {
            return Err(ManifestError::Parse("manifest has no location URI".into()));
        }
        let time_bounds = self.time_bounds.unwrap_or(super::TimeBounds {
            minimum_position: 0.0,
            maximum_position: None,
            timeshift_buffer_depth: None,
        });
        Ok(Manifest {
            transport_type,
            uris: self.uris,
            is_dynamic: self.is_dynamic,
            is_last_period_known: self.is_last_period_known,
            availability_start_time: self.availability_start_time,
            clock_offset_ms: self.clock_offset_ms,
            suggested_presentation_delay: self.suggested_presentation_delay,
            lifetime: self.lifetime,
            time_bounds,
            periods: self.periods,
        })
    }
}
