//! Global bounds calculator (spec §4.2 "Template without Timeline", and
//! §2 C3 "global bounds calculator"). Used both by the Manifest's overall
//! `time_bounds` and by the Template-without-Timeline Segment-Index to
//! estimate the first/last available segment position for a dynamic
//! presentation.

use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicBoundsParams {
    /// Seconds since the Unix epoch at which the presentation became available.
    pub availability_start_time: Option<f64>,
    /// Sliding window behind the live edge that remains addressable, `None` = infinite.
    pub timeshift_buffer_depth: Option<f64>,
    pub suggested_presentation_delay: Option<f64>,
    /// server_time_ms - client_time_ms, from a UTCTiming resolution.
    pub clock_offset_ms: Option<f64>,
    /// Shifts the last-available position forward (low-latency).
    pub availability_time_offset: f64,
    /// Adds one extra segment of lookahead to the last position.
    pub aggressive_mode: bool,
}

/// Current wall-clock time in seconds since the epoch, as a plain function
/// so tests can avoid depending on the live clock by constructing
/// `DynamicBoundsParams` and calling `compute_at` directly.
pub fn now_seconds() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub first_position: Option<f64>,
    pub last_position: Option<f64>,
}

/// Estimate [first, last] available position (in presentation seconds,
/// relative to availability_start_time) for a segment of `segment_duration`
/// seconds, given the current wall-clock time `now`.
///
/// The last available position is aligned down to a multiple of
/// `segment_duration` (segments become available only once their full
/// duration has elapsed), then nudged forward by `availability_time_offset`
/// and, in aggressive mode, by one extra segment.
pub fn compute_at(params: &DynamicBoundsParams, now: f64, segment_duration: f64) -> Bounds {
    let ast = params.availability_start_time.unwrap_or(0.0);
    let server_now = now + params.clock_offset_ms.unwrap_or(0.0) / 1000.0;
    let elapsed = (server_now - ast).max(0.0);

    let mut last = if segment_duration > 0.0 {
        (elapsed / segment_duration).floor() * segment_duration
    } else {
        elapsed
    };
    last += params.availability_time_offset;
    if params.aggressive_mode {
        last += segment_duration;
    }

    let first = match params.timeshift_buffer_depth {
        Some(depth) => {
            let candidate = last - depth;
            if segment_duration > 0.0 {
                (candidate / segment_duration).floor() * segment_duration
            } else {
                candidate
            }
        }
        None => 0.0,
    }
    .max(0.0);

    Bounds { first_position: Some(first), last_position: Some(last) }
}
