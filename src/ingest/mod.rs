//! Result delivery to the downstream graph/search store.
//!
//! - **client**: deliver with spill fallback, replay spilled payloads
//! - **replay**: background service that replays the spill directory
//! - **spill**: atomic on-disk spill files
//! - **store**: in-memory reference sink with seen-set deduplication
//! - **types**: wire payloads and receipts

pub mod client;
pub mod replay;
pub mod spill;
pub mod store;
pub mod types;

pub use client::{IngestionSinkClient, ReplayReport};
pub use replay::SpillReplayService;
pub use spill::{SpillRecord, SpillStore};
pub use store::SeenSetStore;
pub use types::{
    IngestKind, IngestReceipt, IngestResponse, PluginRunPayload, ThreatIndicator,
    ThreatIndicatorBatch,
};
