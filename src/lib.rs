//! An adaptive streaming media engine: ingests a DASH MPD or Smooth
//! Streaming manifest, downloads encoded media segments, and continually
//! chooses which Representation of which Adaptation of which Period to
//! fetch next from observed network throughput, buffer levels, and user
//! preferences. It also classifies playback health (rebuffering, freezing,
//! seek attribution).
//!
//! The host media element, DRM session management, raw XML/MPD parsing,
//! subtitle rendering, and container muxing are all external collaborators;
//! this crate consumes their output and drives their documented interfaces,
//! it does not reimplement them.
//!
//! Module layout mirrors the component table of the design this crate
//! implements, leaves first: time/URL arithmetic, segment indexing, the
//! Manifest model, bandwidth/scoring/pending-request bookkeeping, the
//! segment fetcher, the ABR estimator, the playback observer, the
//! track-choice manager, and finally the orchestrator wiring them together.

pub mod abr;
pub mod bandwidth;
pub mod config;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod orchestrator;
pub mod pending_requests;
pub mod playback_observer;
pub mod scorer;
pub mod segment_index;
pub mod time;
pub mod track_choice;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use manifest::Manifest;
pub use orchestrator::Orchestrator;
