//! "Template with Timeline" Segment-Index variant (spec §4.2).
//!
//! Explicit `<S t d r>` entries; `t` is cumulative, `r` is a repeat count
//! (`-1` repeats until the Period end). Segment lookup is binary search by
//! time.

use crate::time::{resolve_url_template, TemplateParams, TimeBase};

use super::{Availability, Segment};

/// One `<S t d r>` entry, expanded with `t` already resolved relative to the
/// previous entry (cumulative), matching the teacher's `S { t, d, r }`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineEntry {
    pub t: i64,
    pub d: i64,
    /// Repeat count: total occurrences of this entry are `r + 1`. `-1` means
    /// "repeat until the Period end" and is only resolved at query time.
    pub r: i64,
}

#[derive(Debug, Clone)]
pub struct TimelineIndex {
    pub time_base: TimeBase,
    pub init_template: Option<String>,
    pub media_template: String,
    pub representation_id: String,
    pub bitrate: u64,
    pub start_number: u64,
    pub entries: Vec<TimelineEntry>,
    pub period_start: f64,
    pub period_end: Option<f64>,
    pub is_dynamic: bool,
}

struct ExpandedTick {
    number: u64,
    t: i64,
    d: i64,
}

impl TimelineIndex {
    /// Expand the `<S>` run-length list into one entry per concrete segment,
    /// resolving `r = -1` against the Period end (or, lacking one, treating
    /// it as "not yet known, stop expanding").
    fn expand(&self) -> Vec<ExpandedTick> {
        let mut out = Vec::new();
        let mut number = self.start_number;
        let mut cursor: Option<i64> = None;
        for entry in &self.entries {
            let t = entry.t;
            let mut repeats = entry.r.max(0) as u64;
            if entry.r < 0 {
                if let Some(end) = self.period_end {
                    let end_ticks = self.time_base.seconds_to_ticks(end - self.period_start);
                    if entry.d > 0 {
                        repeats = (((end_ticks - t) / entry.d) - 1).max(0) as u64;
                    }
                } else {
                    // open-ended repeat on a still-live Period: emit just the
                    // one concrete occurrence we know about.
                    repeats = 0;
                }
            }
            for k in 0..=repeats {
                let tick_t = t + k as i64 * entry.d;
                out.push(ExpandedTick { number, t: tick_t, d: entry.d });
                number += 1;
            }
            cursor = Some(t + (repeats as i64 + 1) * entry.d);
        }
        let _ = cursor;
        out
    }

    fn tick_to_segment(&self, tick: &ExpandedTick) -> Segment {
        let time = self.time_base.index_to_presentation_time(tick.t, self.period_start);
        let duration = self.time_base.ticks_to_seconds(tick.d);
        let params = TemplateParams {
            representation_id: Some(self.representation_id.clone()),
            bitrate: Some(self.bitrate),
            number: Some(tick.number),
            time: Some(tick.t),
        };
        let url = resolve_url_template(&self.media_template, &params);
        Segment {
            id: format!("{}-{}", self.representation_id, tick.number),
            number: Some(tick.number),
            time,
            end: time + duration,
            duration,
            timescale: self.time_base.timescale,
            media_urls: url.map(|u| vec![u]),
            range: None,
            is_init: false,
            timestamp_offset: 0.0,
            private_infos: None,
        }
    }

    pub fn get_init_segment(&self) -> Option<Segment> {
        let template = self.init_template.as_ref()?;
        let params = TemplateParams {
            representation_id: Some(self.representation_id.clone()),
            bitrate: Some(self.bitrate),
            ..Default::default()
        };
        let url = resolve_url_template(template, &params)?;
        Some(Segment {
            id: format!("{}-init", self.representation_id),
            number: None,
            time: self.period_start,
            end: self.period_start,
            duration: 0.0,
            timescale: self.time_base.timescale,
            media_urls: Some(vec![url]),
            range: None,
            is_init: true,
            timestamp_offset: 0.0,
            private_infos: None,
        })
    }

    pub fn get_segments(&self, from_time: f64, duration: f64) -> Vec<Segment> {
        let to_time = from_time + duration;
        let ticks = self.expand();
        // Binary search for the first tick whose segment end exceeds from_time.
        let idx = ticks.partition_point(|tick| {
            let seg = self.tick_to_segment(tick);
            seg.end <= from_time
        });
        let mut out = Vec::new();
        for tick in &ticks[idx..] {
            let seg = self.tick_to_segment(tick);
            // strict-less-than avoids duplicating segments at Timeline boundaries
            if seg.time >= to_time {
                break;
            }
            out.push(seg);
        }
        out
    }

    pub fn get_first_position(&self) -> Availability {
        match self.entries.first() {
            Some(e) => Availability::At(self.time_base.index_to_presentation_time(e.t, self.period_start)),
            None => Availability::None,
        }
    }

    pub fn get_last_position(&self) -> Availability {
        let ticks = self.expand();
        match ticks.last() {
            Some(tick) => {
                let seg = self.tick_to_segment(tick);
                Availability::At(seg.end)
            }
            None => {
                if self.is_dynamic {
                    Availability::Unknown
                } else {
                    Availability::None
                }
            }
        }
    }

    /// Refresh is required whenever the asked range extends past the last
    /// known segment and the content is dynamic.
    pub fn should_refresh(&self, _from_time: f64, to_time: f64) -> bool {
        if !self.is_dynamic {
            return false;
        }
        match self.get_last_position() {
            Availability::At(last) => to_time > last,
            Availability::Unknown => true,
            Availability::None => true,
        }
    }

    pub fn check_discontinuity(&self, time: f64) -> Option<f64> {
        let ticks = self.expand();
        for w in ticks.windows(2) {
            let a = self.tick_to_segment(&w[0]);
            let b = self.tick_to_segment(&w[1]);
            if time >= a.time && time < a.end && b.time > a.end {
                return Some(b.time);
            }
        }
        None
    }

    pub fn is_segment_still_available(&self, segment: &Segment) -> Option<bool> {
        match self.get_first_position().as_option() {
            Some(first) => Some(segment.end > first),
            None => Some(false),
        }
    }

    pub fn can_be_out_of_sync_error(&self) -> bool {
        self.is_dynamic
    }

    pub fn is_finished(&self) -> bool {
        !self.is_dynamic
    }

    pub fn is_initialized(&self) -> bool {
        true
    }

    pub fn update(&mut self, other: TimelineIndex) {
        // Merge by appending entries that extend past what we already know,
        // rather than a wholesale replace, so in-flight segment references
        // taken before the refresh remain valid.
        if other.entries.len() >= self.entries.len() {
            self.entries = other.entries;
        }
        self.period_end = other.period_end;
        self.is_dynamic = other.is_dynamic;
    }
}
