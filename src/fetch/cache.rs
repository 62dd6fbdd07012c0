//! Optional segment cache consulted before issuing a network request (spec
//! §4.4 item 1: "used for init segments of audio/video"). The engine never
//! implements a concrete cache itself; callers wire in whatever storage
//! makes sense for their host (in-memory LRU, IndexedDB equivalent, etc.).

use bytes::Bytes;

pub trait SegmentCache: Send + Sync {
    fn get(&self, segment_id: &str) -> Option<Bytes>;
}

/// An in-memory cache keyed by segment id, useful for init segments that are
/// small and fetched once per Representation.
#[derive(Debug, Default)]
pub struct InMemorySegmentCache {
    entries: std::sync::Mutex<std::collections::HashMap<String, Bytes>>,
}

impl InMemorySegmentCache {
    pub fn new() -> Self {
        InMemorySegmentCache::default()
    }

    pub fn insert(&self, segment_id: impl Into<String>, data: Bytes) {
        self.entries.lock().unwrap().insert(segment_id.into(), data);
    }
}

impl SegmentCache for InMemorySegmentCache {
    fn get(&self, segment_id: &str) -> Option<Bytes> {
        self.entries.lock().unwrap().get(segment_id).cloned()
    }
}
