//! "List" Segment-Index variant (spec §4.2 / DASH `SegmentList`).
//!
//! An explicit, ordered list of `SegmentURL` entries, each implicitly
//! `duration` seconds long, numbered from `start_number`.

use crate::time::TimeBase;

use super::{Availability, Segment};

#[derive(Debug, Clone)]
pub struct ListEntry {
    pub media_url: Option<String>,
    pub range: Option<(u64, u64)>,
}

#[derive(Debug, Clone)]
pub struct ListIndex {
    pub time_base: TimeBase,
    pub representation_id: String,
    pub init_url: Option<String>,
    pub init_range: Option<(u64, u64)>,
    pub start_number: u64,
    pub duration: f64,
    pub period_start: f64,
    pub entries: Vec<ListEntry>,
}

impl ListIndex {
    fn segment_at(&self, i: usize) -> Segment {
        let time = self.period_start + i as f64 * self.duration;
        let entry = &self.entries[i];
        Segment {
            id: format!("{}-{}", self.representation_id, self.start_number + i as u64),
            number: Some(self.start_number + i as u64),
            time,
            end: time + self.duration,
            duration: self.duration,
            timescale: self.time_base.timescale,
            media_urls: entry.media_url.clone().map(|u| vec![u]),
            range: entry.range,
            is_init: false,
            timestamp_offset: 0.0,
            private_infos: None,
        }
    }

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
            range: self.init_range,
            is_init: true,
            timestamp_offset: 0.0,
            private_infos: None,
        })
    }

    pub fn get_segments(&self, from_time: f64, duration: f64) -> Vec<Segment> {
        let to_time = from_time + duration;
        (0..self.entries.len())
            .map(|i| self.segment_at(i))
            .filter(|s| s.overlaps(from_time, to_time))
            .collect()
    }

    pub fn get_first_position(&self) -> Availability {
        if self.entries.is_empty() {
            Availability::None
        } else {
            Availability::At(self.period_start)
        }
    }

    pub fn get_last_position(&self) -> Availability {
        if self.entries.is_empty() {
            Availability::None
        } else {
            Availability::At(self.period_start + self.entries.len() as f64 * self.duration)
        }
    }

    pub fn should_refresh(&self, _from_time: f64, _to_time: f64) -> bool {
        false
    }

    pub fn check_discontinuity(&self, _time: f64) -> Option<f64> {
        None
    }

    pub fn is_segment_still_available(&self, _segment: &Segment) -> Option<bool> {
        Some(true)
    }

    pub fn can_be_out_of_sync_error(&self) -> bool {
        false
    }

    pub fn is_finished(&self) -> bool {
        true
    }

    pub fn is_initialized(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn update(&mut self, other: ListIndex) {
        *self = other;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ListIndex {
        ListIndex {
            time_base: TimeBase::new(1000, 0),
            representation_id: "v1".into(),
            init_url: Some("init.mp4".into()),
            init_range: None,
            start_number: 1,
            duration: 4.0,
            period_start: 0.0,
            entries: vec![
                ListEntry { media_url: Some("1.m4s".into()), range: None },
                ListEntry { media_url: Some("2.m4s".into()), range: None },
                ListEntry { media_url: Some("3.m4s".into()), range: None },
            ],
        }
    }

    #[test]
    fn segments_numbered_from_start_number() {
        let idx = sample();
        let segs = idx.get_segments(0.0, 12.0);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].number, Some(1));
        assert_eq!(segs[2].number, Some(3));
    }

    #[test]
    fn last_position_matches_entry_count() {
        let idx = sample();
        assert_eq!(idx.get_last_position(), Availability::At(12.0));
    }
}
