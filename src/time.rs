//! C1 — Time arithmetic and URL templating (spec §4.1).
//!
//! Every Segment-Index has a `timescale` and a `presentation_time_offset`
//! (PTO). Converting between an index tick and wall/media/presentation time
//! is pure arithmetic; URL detokenization is the printf-subset scheme
//! documented by DASH-IF, reimplemented directly rather than pulled in from
//! a C-printf binding, the same call the teacher crate makes for
//! `resolve_url_template`.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

/// The scale+offset pair carried by every Segment-Index variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBase {
    pub timescale: u64,
    pub presentation_time_offset: u64,
}

impl TimeBase {
    pub fn new(timescale: u64, presentation_time_offset: u64) -> Self {
        TimeBase { timescale: timescale.max(1), presentation_time_offset }
    }

    /// `media_time_seconds = t_index / timescale`
    pub fn index_to_media_time(&self, t_index: i64) -> f64 {
        t_index as f64 / self.timescale as f64
    }

    /// `presentation_time_seconds = (t_index - PTO) / timescale + period_start`
    pub fn index_to_presentation_time(&self, t_index: i64, period_start: f64) -> f64 {
        (t_index as f64 - self.presentation_time_offset as f64) / self.timescale as f64
            + period_start
    }

    /// `t_index = (T - period_start) * timescale + PTO`
    pub fn presentation_time_to_index(&self, presentation_time: f64, period_start: f64) -> i64 {
        (((presentation_time - period_start) * self.timescale as f64)
            + self.presentation_time_offset as f64)
            .round() as i64
    }

    pub fn seconds_to_ticks(&self, seconds: f64) -> i64 {
        (seconds * self.timescale as f64).round() as i64
    }

    pub fn ticks_to_seconds(&self, ticks: i64) -> f64 {
        ticks as f64 / self.timescale as f64
    }
}

lazy_static! {
    // Simple tokens, e.g. $Number$
    static ref SIMPLE_TOKEN: Regex = Regex::new(r"\$(RepresentationID|Bitrate|Number|Time)\$").unwrap();
    // Width-qualified tokens, e.g. $Number%06d$
    static ref WIDTH_TOKEN: Regex =
        Regex::new(r"\$(RepresentationID|Bitrate|Number|Time)%0([0-9]+)d\$").unwrap();
}

/// Values available for substitution into a `SegmentTemplate` URL.
#[derive(Debug, Clone, Default)]
pub struct TemplateParams {
    pub representation_id: Option<String>,
    pub bitrate: Option<u64>,
    pub number: Option<u64>,
    pub time: Option<i64>,
}

impl TemplateParams {
    fn lookup(&self, token: &str) -> Option<String> {
        match token {
            "RepresentationID" => self.representation_id.clone(),
            "Bitrate" => self.bitrate.map(|b| b.to_string()),
            "Number" => self.number.map(|n| n.to_string()),
            "Time" => self.time.map(|t| t.to_string()),
            _ => None,
        }
    }
}

/// Expand `$Token$` and `$Token%0Nd$` placeholders in a `SegmentTemplate`
/// URL. Template errors (a referenced token has no value) fail just the
/// enclosing Representation, not the whole Manifest — callers should treat
/// `None` as "this Representation cannot be templated" rather than abort.
pub fn resolve_url_template(template: &str, params: &TemplateParams) -> Option<String> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let next_width = WIDTH_TOKEN.find(rest);
        let next_simple = SIMPLE_TOKEN.find(rest);
        let (m, is_width) = match (next_width, next_simple) {
            (Some(w), Some(s)) if w.start() <= s.start() => (w, true),
            (Some(w), None) => (w, true),
            (_, Some(s)) => (s, false),
            (None, None) => {
                result.push_str(rest);
                break;
            }
        };
        result.push_str(&rest[..m.start()]);
        if is_width {
            let caps = WIDTH_TOKEN.captures(&rest[m.start()..m.end()])?;
            let token = &caps[1];
            let width: usize = caps[2].parse().ok()?;
            let value = params.lookup(token)?;
            result.push_str(&format!("{:0>width$}", value, width = width));
        } else {
            let caps = SIMPLE_TOKEN.captures(&rest[m.start()..m.end()])?;
            let token = &caps[1];
            let value = params.lookup(token)?;
            result.push_str(&value);
        }
        rest = &rest[m.end()..];
    }
    Some(result)
}

/// Detokenize with a plain string map, used by callers that already hold
/// their substitutions as strings (kept close to the teacher's
/// `HashMap<&str, String>`-based `resolve_url_template` signature).
pub fn resolve_url_template_map(template: &str, params: &HashMap<&str, String>) -> Option<String> {
    let tp = TemplateParams {
        representation_id: params.get("RepresentationID").cloned(),
        bitrate: params.get("Bitrate").and_then(|s| s.parse().ok()),
        number: params.get("Number").and_then(|s| s.parse().ok()),
        time: params.get("Time").and_then(|s| s.parse().ok()),
    };
    resolve_url_template(template, &tp)
}

/// Resolve a (possibly relative) segment/media URL against a base URL, the
/// way the teacher resolves `BaseURL` elements against the redirected MPD
/// URL.
pub fn resolve_url(base: &url::Url, reference: &str) -> Option<url::Url> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        url::Url::parse(reference).ok()
    } else {
        base.join(reference).ok()
    }
}
