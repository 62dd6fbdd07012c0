//! C2 — Segment-index algorithms (spec §4.2).
//!
//! A Segment-Index maps a wall-clock or media time window to a concrete set
//! of [`Segment`] descriptors. Five variants exist (Template, Template with
//! Timeline, Base/SIDX, List, Smooth); rather than an inheritance hierarchy
//! they are consumed "duck-typed" through one capability set (Design Note
//! 9), modelled here as a tagged union ([`SegmentIndex`]) whose inherent
//! methods dispatch to per-variant structs. Nothing here owns a
//! Representation; it is itself owned by one.

pub mod base_sidx;
pub mod list;
pub mod smooth;
pub mod template;
pub mod timeline;

use crate::error::IndexError;
use crate::time::TimeBase;

/// One downloadable media unit, or an initialization segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: String,
    pub number: Option<u64>,
    /// Presentation time, in seconds, of the start of the segment.
    pub time: f64,
    /// Presentation time, in seconds, of the end of the segment.
    pub end: f64,
    pub duration: f64,
    pub timescale: u64,
    /// Ordered fallback URLs, or `None` if the segment cannot currently be
    /// addressed (e.g. a List/Timeline entry awaiting an xlink resolution).
    pub media_urls: Option<Vec<String>>,
    pub range: Option<(u64, u64)>,
    pub is_init: bool,
    pub timestamp_offset: f64,
    pub private_infos: Option<PrivateInfos>,
}

impl Segment {
    pub fn overlaps(&self, from_time: f64, to_time: f64) -> bool {
        self.end > from_time && self.time < to_time
    }
}

/// Transport-specific hints that ride along with a segment but that the
/// index/fetcher layers never interpret themselves (spec §3 "private_infos").
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrivateInfos {
    pub smooth_next_segments_hint: bool,
    pub sidx_byte_range_patched_to_infinity: bool,
}

/// Result of a first/last-position query: a concrete time, "no segment"
/// (index exists but is empty), or "not yet determinable" (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Availability {
    At(f64),
    None,
    Unknown,
}

impl Availability {
    pub fn as_option(&self) -> Option<f64> {
        match self {
            Availability::At(t) => Some(*t),
            _ => None,
        }
    }
}

/// The full Segment-Index capability set (spec §4.2). Implemented once, by
/// [`SegmentIndex`], dispatching over the tagged union of variants.
pub trait SegmentIndexOps {
    fn get_init_segment(&self) -> Option<Segment>;
    fn get_segments(&self, from_time: f64, duration: f64) -> Vec<Segment>;
    fn get_first_position(&self) -> Availability;
    fn get_last_position(&self) -> Availability;
    fn should_refresh(&self, from_time: f64, to_time: f64) -> bool;
    fn check_discontinuity(&self, time: f64) -> Option<f64>;
    fn is_segment_still_available(&self, segment: &Segment) -> Option<bool>;
    fn can_be_out_of_sync_error(&self) -> bool;
    fn is_finished(&self) -> bool;
    fn is_initialized(&self) -> bool;
}

/// Tagged union over the five index variants named in spec §4.2.
#[derive(Debug, Clone)]
pub enum SegmentIndex {
    Template(template::TemplateIndex),
    Timeline(timeline::TimelineIndex),
    BaseSidx(base_sidx::BaseSidxIndex),
    List(list::ListIndex),
    Smooth(smooth::SmoothIndex),
}

impl SegmentIndex {
    pub fn time_base(&self) -> TimeBase {
        match self {
            SegmentIndex::Template(i) => i.time_base,
            SegmentIndex::Timeline(i) => i.time_base,
            SegmentIndex::BaseSidx(i) => i.time_base,
            SegmentIndex::List(i) => i.time_base,
            SegmentIndex::Smooth(i) => i.time_base,
        }
    }

    /// Merge `other` (a freshly parsed index for the same Representation)
    /// into `self`, used on Manifest refresh (spec §4.3).
    pub fn update(&mut self, other: SegmentIndex) -> Result<(), IndexError> {
        match (self, other) {
            (SegmentIndex::Template(a), SegmentIndex::Template(b)) => {
                a.update(b);
                Ok(())
            }
            (SegmentIndex::Timeline(a), SegmentIndex::Timeline(b)) => {
                a.update(b);
                Ok(())
            }
            (SegmentIndex::BaseSidx(a), SegmentIndex::BaseSidx(b)) => {
                a.update(b);
                Ok(())
            }
            (SegmentIndex::List(a), SegmentIndex::List(b)) => {
                a.update(b);
                Ok(())
            }
            (SegmentIndex::Smooth(a), SegmentIndex::Smooth(b)) => {
                a.update(b);
                Ok(())
            }
            _ => Err(IndexError::OutOfSync),
        }
    }

    /// Wholesale replacement; per spec §8 this must be a no-op for all
    /// observable queries when `other` is equivalent to `self`.
    pub fn replace(&mut self, other: SegmentIndex) -> Result<(), IndexError> {
        match (&*self, &other) {
            (SegmentIndex::Template(_), SegmentIndex::Template(_))
            | (SegmentIndex::Timeline(_), SegmentIndex::Timeline(_))
            | (SegmentIndex::BaseSidx(_), SegmentIndex::BaseSidx(_))
            | (SegmentIndex::List(_), SegmentIndex::List(_))
            | (SegmentIndex::Smooth(_), SegmentIndex::Smooth(_)) => {
                *self = other;
                Ok(())
            }
            _ => Err(IndexError::OutOfSync),
        }
    }

    /// Used when a SIDX box is parsed out of the init segment bytes, or
    /// when Smooth merges a `tfrf`-derived "next segments" hint.
    pub fn add_segments(&mut self, segments: Vec<Segment>) {
        match self {
            SegmentIndex::BaseSidx(i) => i.add_segments(segments),
            SegmentIndex::Smooth(i) => i.add_segments(segments),
            _ => {}
        }
    }
}

impl SegmentIndexOps for SegmentIndex {
    fn get_init_segment(&self) -> Option<Segment> {
        match self {
            SegmentIndex::Template(i) => i.get_init_segment(),
            SegmentIndex::Timeline(i) => i.get_init_segment(),
            SegmentIndex::BaseSidx(i) => i.get_init_segment(),
            SegmentIndex::List(i) => i.get_init_segment(),
            SegmentIndex::Smooth(i) => i.get_init_segment(),
        }
    }

    fn get_segments(&self, from_time: f64, duration: f64) -> Vec<Segment> {
        match self {
            SegmentIndex::Template(i) => i.get_segments(from_time, duration),
            SegmentIndex::Timeline(i) => i.get_segments(from_time, duration),
            SegmentIndex::BaseSidx(i) => i.get_segments(from_time, duration),
            SegmentIndex::List(i) => i.get_segments(from_time, duration),
            SegmentIndex::Smooth(i) => i.get_segments(from_time, duration),
        }
    }

    fn get_first_position(&self) -> Availability {
        match self {
            SegmentIndex::Template(i) => i.get_first_position(),
            SegmentIndex::Timeline(i) => i.get_first_position(),
            SegmentIndex::BaseSidx(i) => i.get_first_position(),
            SegmentIndex::List(i) => i.get_first_position(),
            SegmentIndex::Smooth(i) => i.get_first_position(),
        }
    }

    fn get_last_position(&self) -> Availability {
        match self {
            SegmentIndex::Template(i) => i.get_last_position(),
            SegmentIndex::Timeline(i) => i.get_last_position(),
            SegmentIndex::BaseSidx(i) => i.get_last_position(),
            SegmentIndex::List(i) => i.get_last_position(),
            SegmentIndex::Smooth(i) => i.get_last_position(),
        }
    }

    fn should_refresh(&self, from_time: f64, to_time: f64) -> bool {
        match self {
            SegmentIndex::Template(i) => i.should_refresh(from_time, to_time),
            SegmentIndex::Timeline(i) => i.should_refresh(from_time, to_time),
            SegmentIndex::BaseSidx(i) => i.should_refresh(from_time, to_time),
            SegmentIndex::List(i) => i.should_refresh(from_time, to_time),
            SegmentIndex::Smooth(i) => i.should_refresh(from_time, to_time),
        }
    }

    fn check_discontinuity(&self, time: f64) -> Option<f64> {
        match self {
            SegmentIndex::Template(i) => i.check_discontinuity(time),
            SegmentIndex::Timeline(i) => i.check_discontinuity(time),
            SegmentIndex::BaseSidx(i) => i.check_discontinuity(time),
            SegmentIndex::List(i) => i.check_discontinuity(time),
            SegmentIndex::Smooth(i) => i.check_discontinuity(time),
        }
    }

    fn is_segment_still_available(&self, segment: &Segment) -> Option<bool> {
        match self {
            SegmentIndex::Template(i) => i.is_segment_still_available(segment),
            SegmentIndex::Timeline(i) => i.is_segment_still_available(segment),
            SegmentIndex::BaseSidx(i) => i.is_segment_still_available(segment),
            SegmentIndex::List(i) => i.is_segment_still_available(segment),
            SegmentIndex::Smooth(i) => i.is_segment_still_available(segment),
        }
    }

    fn can_be_out_of_sync_error(&self) -> bool {
        match self {
            SegmentIndex::Template(i) => i.can_be_out_of_sync_error(),
            SegmentIndex::Timeline(i) => i.can_be_out_of_sync_error(),
            SegmentIndex::BaseSidx(i) => i.can_be_out_of_sync_error(),
            SegmentIndex::List(i) => i.can_be_out_of_sync_error(),
            SegmentIndex::Smooth(i) => i.can_be_out_of_sync_error(),
        }
    }

    fn is_finished(&self) -> bool {
        match self {
            SegmentIndex::Template(i) => i.is_finished(),
            SegmentIndex::Timeline(i) => i.is_finished(),
            SegmentIndex::BaseSidx(i) => i.is_finished(),
            SegmentIndex::List(i) => i.is_finished(),
            SegmentIndex::Smooth(i) => i.is_finished(),
        }
    }

    fn is_initialized(&self) -> bool {
        match self {
            SegmentIndex::Template(i) => i.is_initialized(),
            SegmentIndex::Timeline(i) => i.is_initialized(),
            SegmentIndex::BaseSidx(i) => i.is_initialized(),
            SegmentIndex::List(i) => i.is_initialized(),
            SegmentIndex::Smooth(i) => i.is_initialized(),
        }
    }
}
