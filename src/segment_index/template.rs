//! "Template without Timeline" Segment-Index variant (spec §4.2).
//!
//! Fixed `duration`; segment `i` spans `[i*duration, (i+1)*duration)` in the
//! index timeline, `number = start_number + i`. For dynamic Manifests,
//! first/last positions come from the bounds calculator in
//! [`crate::manifest::bounds`].

use crate::manifest::bounds::{self, DynamicBoundsParams};
use crate::time::{resolve_url_template, TemplateParams, TimeBase};

use super::{Availability, Segment};

#[derive(Debug, Clone)]
pub struct TemplateIndex {
    pub time_base: TimeBase,
    pub init_template: Option<String>,
    pub media_template: String,
    pub representation_id: String,
    pub bitrate: u64,
    pub start_number: u64,
    /// Segment duration, expressed in index ticks (`timescale` units).
    pub duration_ticks: u64,
    pub period_start: f64,
    /// `None` for an open-ended (dynamic, still-live) Period.
    pub period_duration: Option<f64>,
    pub is_dynamic: bool,
    pub bounds: DynamicBoundsParams,
    pub minimum_segment_size: f64,
}

impl TemplateIndex {
    fn segment_duration_seconds(&self) -> f64 {
        self.time_base.ticks_to_seconds(self.duration_ticks as i64)
    }

    /// Number of whole segments in a bounded Period, accounting for
    /// `MINIMUM_SEGMENT_SIZE` trimming a too-short tail segment.
    fn segment_count(&self) -> Option<u64> {
        let period_duration = self.period_duration?;
        let seg_dur = self.segment_duration_seconds();
        if seg_dur <= 0.0 {
            return Some(0);
        }
        let whole = (period_duration / seg_dur).floor() as u64;
        let remainder = period_duration - whole as f64 * seg_dur;
        if remainder > self.minimum_segment_size {
            Some(whole + 1)
        } else {
            Some(whole)
        }
    }

    fn segment_at_index(&self, i: u64) -> Segment {
        let seg_dur = self.segment_duration_seconds();
        let time = self.period_start + i as f64 * seg_dur;
        let number = self.start_number + i;
        let params = TemplateParams {
            representation_id: Some(self.representation_id.clone()),
            bitrate: Some(self.bitrate),
            number: Some(number),
            time: Some(self.time_base.seconds_to_ticks(time - self.period_start)),
        };
        let url = resolve_url_template(&self.media_template, &params);
        Segment {
            id: format!("{}-{}", self.representation_id, number),
            number: Some(number),
            time,
            end: time + seg_dur,
            duration: seg_dur,
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

    fn bounds_now(&self) -> bounds::Bounds {
        bounds::compute_at(&self.bounds, bounds::now_seconds(), self.segment_duration_seconds())
    }

    pub fn get_segments(&self, from_time: f64, duration: f64) -> Vec<Segment> {
        let seg_dur = self.segment_duration_seconds();
        if seg_dur <= 0.0 {
            return Vec::new();
        }
        let to_time = from_time + duration;
        let from_time = from_time.max(self.get_first_position().as_option().unwrap_or(0.0));

        let mut start_i = ((from_time - self.period_start) / seg_dur).floor().max(0.0) as u64;
        // requests for `t` before the first available segment clip up
        while self.segment_at_index(start_i).end <= from_time {
            start_i += 1;
        }

        let last_bound = self.get_last_position().as_option();
        let mut out = Vec::new();
        let mut i = start_i;
        loop {
            if let Some(count) = self.segment_count() {
                if i >= count {
                    break;
                }
            }
            let seg = self.segment_at_index(i);
            if seg.time >= to_time {
                break;
            }
            if let Some(last) = last_bound {
                if seg.time > last {
                    break;
                }
            }
            out.push(seg);
            i += 1;
            if out.len() > 10_000 {
                break; // pathological guard, should never trigger in practice
            }
        }
        out
    }

    pub fn get_first_position(&self) -> Availability {
        if !self.is_dynamic {
            return Availability::At(self.period_start);
        }
        match self.bounds_now().first_position {
            Some(p) => Availability::At(self.period_start + p),
            None => Availability::Unknown,
        }
    }

    pub fn get_last_position(&self) -> Availability {
        if !self.is_dynamic {
            return match self.segment_count() {
                Some(0) => Availability::None,
                Some(n) => Availability::At(self.period_start + n as f64 * self.segment_duration_seconds()),
                None => Availability::Unknown,
            };
        }
        match self.bounds_now().last_position {
            Some(p) => Availability::At(self.period_start + p),
            None => Availability::Unknown,
        }
    }

    pub fn should_refresh(&self, _from_time: f64, to_time: f64) -> bool {
        if !self.is_dynamic {
            return false;
        }
        match self.get_last_position() {
            Availability::At(last) => to_time > last,
            Availability::Unknown => true,
            Availability::None => false,
        }
    }

    pub fn check_discontinuity(&self, _time: f64) -> Option<f64> {
        None
    }

    pub fn is_segment_still_available(&self, segment: &Segment) -> Option<bool> {
        if !self.is_dynamic {
            return Some(true);
        }
        match self.get_first_position().as_option() {
            Some(first) => Some(segment.end > first),
            None => None,
        }
    }

    pub fn can_be_out_of_sync_error(&self) -> bool {
        self.is_dynamic
    }

    pub fn is_finished(&self) -> bool {
        !self.is_dynamic && self.period_duration.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        true
    }

    pub fn update(&mut self, other: TemplateIndex) {
        *self = other;
    }
}
