//! "Base / SIDX" Segment-Index variant (spec §4.2).
//!
//! Initialization byte range plus zero or more segments supplied later by
//! `add_segments`, parsed from the ISOBMFF `sidx` box embedded in the init
//! segment. Never requires a refresh; `is_finished()` is true once parsed.

use crate::time::TimeBase;

use super::{Availability, Segment};

#[derive(Debug, Clone)]
pub struct BaseSidxIndex {
    pub time_base: TimeBase,
    pub representation_id: String,
    pub init_url: String,
    pub init_range: Option<(u64, u64)>,
    pub index_range: Option<(u64, u64)>,
    pub segments: Vec<Segment>,
    /// Set once `add_segments` has been called at least once.
    pub parsed: bool,
}

impl BaseSidxIndex {
    pub fn get_init_segment(&self) -> Option<Segment> {
        Some(Segment {
            id: format!("{}-init", self.representation_id),
            number: None,
            time: 0.0,
            end: 0.0,
            duration: 0.0,
            timescale: self.time_base.timescale,
            media_urls: Some(vec![self.init_url.clone()]),
            range: self.init_range,
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
                if self.parsed {
                    Availability::None
                } else {
                    Availability::Unknown
                }
            }
        }
    }

    pub fn get_last_position(&self) -> Availability {
        match self.segments.last() {
            Some(s) => Availability::At(s.end),
            None => {
                if self.parsed {
                    Availability::None
                } else {
                    Availability::Unknown
                }
            }
        }
    }

    pub fn should_refresh(&self, _from_time: f64, _to_time: f64) -> bool {
        false
    }

    pub fn check_discontinuity(&self, time: f64) -> Option<f64> {
        for w in self.segments.windows(2) {
            if time >= w[0].time && time < w[0].end && w[1].time > w[0].end {
                return Some(w[1].time);
            }
        }
        None
    }

    pub fn is_segment_still_available(&self, _segment: &Segment) -> Option<bool> {
        Some(true)
    }

    pub fn can_be_out_of_sync_error(&self) -> bool {
        false
    }

    pub fn is_finished(&self) -> bool {
        self.parsed
    }

    pub fn is_initialized(&self) -> bool {
        self.parsed
    }

    /// Apply the `__priv_patchLastSegmentInSidx` workaround: some packagers
    /// emit a last SIDX reference whose byte range is wrong; widening it to
    /// "to end of file" is a documented hack preserved verbatim, per spec §9
    /// Open Questions ("the correct general fix is undefined").
    pub fn patch_last_segment_range_to_infinity(&mut self) {
        if let Some(last) = self.segments.last_mut() {
            if let Some((start, _end)) = last.range {
                last.range = Some((start, u64::MAX));
                if let Some(infos) = last.private_infos.as_mut() {
                    infos.sidx_byte_range_patched_to_infinity = true;
                } else {
                    last.private_infos = Some(super::PrivateInfos {
                        sidx_byte_range_patched_to_infinity: true,
                        ..Default::default()
                    });
                }
            }
        }
    }

    /// Idempotent: applying the same segment list twice must not duplicate
    /// entries (spec §8 "Round-trips").
    pub fn add_segments(&mut self, segments: Vec<Segment>) {
        for seg in segments {
            if !self.segments.iter().any(|s| s.id == seg.id) {
                self.segments.push(seg);
            }
        }
        self.segments.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap());
        self.parsed = true;
    }

    pub fn update(&mut self, other: BaseSidxIndex) {
        *self = other;
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
            media_urls: Some(vec![format!("{id}.m4s")]),
            range: Some((0, 100)),
            is_init: false,
            timestamp_offset: 0.0,
            private_infos: None,
        }
    }

    fn empty_index() -> BaseSidxIndex {
        BaseSidxIndex {
            time_base: TimeBase::new(1000, 0),
            representation_id: "v1".into(),
            init_url: "init.mp4".into(),
            init_range: Some((0, 836)),
            index_range: Some((837, 3532)),
            segments: Vec::new(),
            parsed: false,
        }
    }

    #[test]
    fn add_segments_twice_does_not_duplicate() {
        let mut idx = empty_index();
        let segs = vec![seg("a", 0.0, 4.0), seg("b", 4.0, 8.0)];
        idx.add_segments(segs.clone());
        idx.add_segments(segs);
        assert_eq!(idx.segments.len(), 2);
    }

    #[test]
    fn is_finished_once_parsed() {
        let mut idx = empty_index();
        assert!(!idx.is_finished());
        idx.add_segments(vec![seg("a", 0.0, 4.0)]);
        assert!(idx.is_finished());
    }

    #[test]
    fn patch_last_segment_to_infinity() {
        let mut idx = empty_index();
        idx.add_segments(vec![seg("a", 0.0, 4.0), seg("b", 4.0, 8.0)]);
        idx.patch_last_segment_range_to_infinity();
        let last = idx.segments.last().unwrap();
        assert_eq!(last.range, Some((0, u64::MAX)));
    }
}
