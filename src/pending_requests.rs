//! C5 — Pending-requests store (spec §3 "Pending request", §5 "owned by one
//! ABR instance per (media-type, Period) pair; no cross-instance sharing").
//!
//! Tracks segment requests between `request-begin` and `request-end`/error,
//! so the ABR estimator can correct its bandwidth-based choice using
//! bytes-so-far of requests that haven't finished yet (spec §4.5
//! "in-flight correction").

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PendingRequestContent {
    pub period_id: String,
    pub adaptation_id: String,
    pub representation_id: String,
    pub segment_id: String,
    /// The Representation's own declared bitrate, used when estimating
    /// whether this request is falling behind (spec §4.5 "guess mode").
    pub representation_bitrate: u64,
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: String,
    pub content: PendingRequestContent,
    pub request_timestamp: Instant,
    /// Expected segment duration in seconds, used to judge whether a
    /// request is taking unreasonably long (spec §4.5 guess-mode abort
    /// condition).
    pub expected_duration: f64,
    pub size_received: u64,
}

impl PendingRequest {
    pub fn elapsed(&self) -> Duration {
        self.request_timestamp.elapsed()
    }

    /// Instantaneous bandwidth estimate from bytes received so far, in
    /// bits/second. `None` while no bytes or no time have yet elapsed.
    pub fn in_flight_bandwidth(&self) -> Option<f64> {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed <= 0.0 || self.size_received == 0 {
            return None;
        }
        Some((self.size_received as f64 * 8.0) / elapsed)
    }

    /// True once this request has run longer than its segment should take
    /// to play out (or, for init segments where `expected_duration == 0`,
    /// longer than one second) — spec §4.5 guess-mode abort condition.
    pub fn has_overrun(&self) -> bool {
        let budget = if self.expected_duration > 0.0 { self.expected_duration } else { 1.0 };
        self.elapsed().as_secs_f64() > budget
    }
}

/// Set of in-flight segment requests, keyed by request id.
#[derive(Debug, Clone, Default)]
pub struct PendingRequestsStore {
    requests: HashMap<String, PendingRequest>,
}

impl PendingRequestsStore {
    pub fn new() -> Self {
        PendingRequestsStore::default()
    }

    pub fn begin(&mut self, id: impl Into<String>, content: PendingRequestContent, expected_duration: f64) {
        let id = id.into();
        self.requests.insert(
            id.clone(),
            PendingRequest {
                id,
                content,
                request_timestamp: Instant::now(),
                expected_duration,
                size_received: 0,
            },
        );
    }

    /// Apply a `progress` event; superseded (coalesced) progress updates for
    /// the same id are fine since only the latest snapshot is kept (spec §5
    /// backpressure policy).
    pub fn progress(&mut self, id: &str, size_received: u64) {
        if let Some(req) = self.requests.get_mut(id) {
            req.size_received = size_received;
        }
    }

    /// Remove and return the request on `request-end` or error.
    pub fn end(&mut self, id: &str) -> Option<PendingRequest> {
        self.requests.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&PendingRequest> {
        self.requests.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingRequest> {
        self.requests.values()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// The lowest in-flight bandwidth estimate among pending requests, used
    /// to correct the bandwidth-based choice downward when an ongoing
    /// request is underperforming (spec §4.5).
    pub fn lowest_in_flight_bandwidth(&self) -> Option<f64> {
        self.requests
            .values()
            .filter_map(|r| r.in_flight_bandwidth())
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> PendingRequestContent {
        PendingRequestContent {
            period_id: "p0".into(),
            adaptation_id: "a0".into(),
            representation_id: "v1".into(),
            segment_id: "v1-1".into(),
            representation_bitrate: 1_000_000,
        }
    }

    #[test]
    fn begin_progress_end_lifecycle() {
        let mut store = PendingRequestsStore::new();
        store.begin("req-1", content(), 4.0);
        assert_eq!(store.len(), 1);
        store.progress("req-1", 50_000);
        assert_eq!(store.get("req-1").unwrap().size_received, 50_000);
        let finished = store.end("req-1").unwrap();
        assert_eq!(finished.size_received, 50_000);
        assert!(store.is_empty());
    }

    #[test]
    fn end_on_unknown_id_is_none() {
        let mut store = PendingRequestsStore::new();
        assert!(store.end("nope").is_none());
    }

    #[test]
    fn progress_on_finished_request_is_ignored() {
        let mut store = PendingRequestsStore::new();
        store.begin("req-1", content(), 4.0);
        store.end("req-1");
        store.progress("req-1", 99); // no-op, request already ended
        assert!(store.get("req-1").is_none());
    }
}
