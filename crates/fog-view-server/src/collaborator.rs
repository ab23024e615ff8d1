//! Interfaces to the subsystems a query is resolved against
//!
//! The reconciler only reads through these traits. Production backends (a
//! recovery database, an enclave-hosted ORAM index) live outside this crate;
//! the in-memory implementations in [`crate::directory`], [`crate::missed`]
//! and [`crate::index`] back tests and the development server.

use async_trait::async_trait;
use fog_view_core::{BlockRange, DecommissionedIngestInvocation, RngRecord, SearchKey};
use thiserror::Error;

/// Whole-call failure of a collaborator. Per-key failures are reported
/// through [`KeyLookup::Failed`] instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("returned {actual} lookups for {expected} keys")]
    Misaligned { expected: usize, actual: usize },

    #[error("page after event {0} did not advance")]
    StalledPage(i64),
}

/// Highest block count a subsystem guarantees complete, and the signature
/// timestamp of the block just below it.
///
/// Ordered by `count` first, so `min` picks the weaker guarantee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProcessedBlock {
    pub count: u64,
    pub signature_timestamp: u64,
}

impl ProcessedBlock {
    pub fn new(count: u64, signature_timestamp: u64) -> Self {
        Self {
            count,
            signature_timestamp,
        }
    }
}

/// Which directory events a read wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    All,
    DecommissionsOnly,
}

/// Page of directory events after some cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RngEvents {
    pub rngs: Vec<RngRecord>,
    pub decommissions: Vec<DecommissionedIngestInvocation>,
    /// Id of the last event in this page, or the requested cursor if the
    /// page is empty
    pub next_event_id: i64,
    /// Progress a reader holding every event up to `next_event_id` may rely
    /// on. Never decreases along the event sequence.
    pub processed: ProcessedBlock,
    /// Further matching events exist past `next_event_id`
    pub more: bool,
}

#[async_trait]
pub trait RngDirectory: Send + Sync {
    /// Events matching `filter` with id strictly greater than `event_cursor`,
    /// in id order.
    ///
    /// Implementations may return a prefix (a page) and set `more`; passing
    /// `next_event_id` back yields the rest without gaps or repeats.
    async fn events_since(
        &self,
        event_cursor: i64,
        filter: EventFilter,
    ) -> Result<RngEvents, CollaboratorError>;
}

#[async_trait]
pub trait MissedRangeTracker: Send + Sync {
    /// Coalesced, ascending missed ranges with any block at or after
    /// `block_cursor`.
    async fn missed_ranges(&self, block_cursor: u64) -> Result<Vec<BlockRange>, CollaboratorError>;
}

/// Result of looking up one well-formed key
#[derive(Clone, PartialEq, Eq)]
pub enum KeyLookup {
    Found(Vec<u8>),
    NotFound,
    Failed(String),
}

impl std::fmt::Debug for KeyLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyLookup::Found(ct) => write!(f, "Found({} bytes)", ct.len()),
            KeyLookup::NotFound => f.write_str("NotFound"),
            KeyLookup::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

/// Index progress reported alongside every batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexProgress {
    pub processed: ProcessedBlock,
    pub last_known_block_count: u64,
    pub last_known_block_cumulative_txo_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexBatch {
    /// One entry per requested key, same order
    pub lookups: Vec<KeyLookup>,
    pub progress: IndexProgress,
}

/// The oblivious found/not-found store.
///
/// Must take the same time and produce the same size per key whatever the
/// outcome. An empty `keys` slice still reports progress.
#[async_trait]
pub trait TxOutIndex: Send + Sync {
    async fn lookup(&self, keys: &[SearchKey]) -> Result<IndexBatch, CollaboratorError>;
}
