//! "Smooth" Segment-Index variant (spec §4.2).
//!
//! Timeline-like, but patched at runtime: when a new segment is fetched,
//! its "next segments" list (extracted from the `tfrf` box by the fetcher)
//! is merged into the index via `add_segments`. Segments older than the
//! declared DVR depth are evicted.

use crate::time::TimeBase;

use super::{Availability, Segment};

#[derive(Debug, Clone)]
pub struct SmoothIndex {
    pub time_base: TimeBase,
    pub representation_id: String,
    pub init_url: Option<String>,
    pub period_start: f64,
    pub segments: Vec<Segment>,
    pub is_live: bool,
    /// DVR window, in seconds; segments older than `last - dvr_depth` are evicted.
    pub dvr_window_depth: Option<f64>,
}

impl SmoothIndex {
    pub fn get_init_segment(&self) -> Option<Segment> {
        let url = self.init_url.clone()?;
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
        self.segments
            .iter()
            .filter(|s| s.overlaps(from_time, to_time))
            .cloned()
            .collect()
    }

    pub fn get_first_position(&self) -> Availability {
        match self.segments.first() {
            Some(s) => Availability::At(s.time),
            None => {
                if self.is_live {
                    Availability::Unknown
                } else {
                    Availability::None
                }
            }
        }
    }

    pub fn get_last_position(&self) -> Availability {
        match self.segments.last() {
            Some(s) => Availability::At(s.end),
            None => {
                if self.is_live {
                    Availability::Unknown
                } else {
                    Availability::None
                }
            }
        }
    }

    pub fn should_refresh(&self, _from_time: f64, to_time: f64) -> bool {
        if !self.is_live {
            return false;
        }
        match self.get_last_position() {
            Availability::At(last) => to_time > last,
            _ => true,
        }
    }

    pub fn check_discontinuity(&self, time: f64) -> Option<f64> {
        for w in self.segments.windows(2) {
            if time >= w[0].time && time < w[0].end && w[1].time > w[0].end {
                return Some(w[1].time);
            }
        }
        None
    }

    pub fn is_segment_still_available(&self, segment: &Segment) -> Option<bool> {
        match self.get_first_position().as_option() {
            Some(first) => Some(segment.end > first),
            None => None,
        }
    }

    pub fn can_be_out_of_sync_error(&self) -> bool {
        self.is_live
    }

    pub fn is_finished(&self) -> bool {
        !self.is_live
    }

    pub fn is_initialized(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Merge a `tfrf`-derived "next segments" hint into the index, then
    /// evict anything older than the DVR window.
    pub fn add_segments(&mut self, segments: Vec<Segment>) {
        for seg in segments {
            if !self.segments.iter().any(|s| s.id == seg.id) {
                self.segments.push(seg);
            }
        }
        self.segments.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap());
        self.segments.dedup_by(|a, b| a.id == b.id);
        if let (Some(depth), Some(last)) = (self.dvr_window_depth, self.segments.last().map(|s| s.end)) {
            let cutoff = last - depth;
            self.segments.retain(|s| s.end > cutoff);
        }
    }

    pub fn update(&mut self, other: SmoothIndex) {
        let existing = std::mem::take(&mut self.segments);
        *self = other;
        self.add_segments(existing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: &str, time: f64, end: f64) -> Segment {
        Segment {
            id: id.into(),
            number: None,
            time,
            end,
            duration: end - time,
            timescale: 1000,
            media_urls: Some(vec![format!("{id}.isma")]),
            range: None,
            is_init: false,
            timestamp_offset: 0.0,
            private_infos: Some(super::super::PrivateInfos {
                smooth_next_segments_hint: true,
                ..Default::default()
            }),
        }
    }

    fn sample() -> SmoothIndex {
        SmoothIndex {
            time_base: TimeBase::new(1000, 0),
            representation_id: "a1".into(),
            init_url: Some("init.isma".into()),
            period_start: 0.0,
            segments: vec![seg("0", 0.0, 4.0), seg("1", 4.0, 8.0)],
            is_live: true,
            dvr_window_depth: Some(10.0),
        }
    }

    #[test]
    fn merging_next_segments_hint_evicts_old_segments() {
        let mut idx = sample();
        idx.add_segments(vec![seg("2", 8.0, 12.0), seg("3", 12.0, 16.0)]);
        // DVR depth 10s, last end = 16.0 => cutoff at 6.0, segment "0" (ends 4.0) evicted.
        assert!(idx.segments.iter().all(|s| s.end > 6.0));
        assert_eq!(idx.segments.len(), 3);
    }

    #[test]
    fn merging_same_segments_twice_does_not_duplicate() {
        let mut idx = sample();
        let extra = vec![seg("2", 8.0, 12.0)];
        idx.add_segments(extra.clone());
        idx.add_segments(extra);
        assert_eq!(idx.segments.iter().filter(|s| s.id == "2").count(), 1);
    }
}
