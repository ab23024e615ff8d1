//! Query request and response messages
//!
//! A query is split in two halves:
//! - [`QueryRequestAad`]: cursors and optional address context. Authenticated
//!   but not secret; served by untrusted code.
//! - [`QueryRequest`]: the search keys. Sensitive; only the oblivious index
//!   sees them in the clear.
//!
//! [`QueryEnvelope`] carries both over the HTTP transport.

use serde::{Deserialize, Serialize};

use crate::constants::PROTOCOL_VERSION;
use crate::{
    BlockRange, DecommissionedIngestInvocation, Error, Result, RngRecord, SearchKey,
    TxOutSearchResult,
};

/// Non-sensitive half of a query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequestAad {
    /// Last event id the client has seen; 0 on bootstrap
    pub start_from_user_event_id: i64,
    /// First block the client needs coverage from; 0 on bootstrap
    pub start_from_block_index: u64,
    /// Public view key of the client's address. RNG records are only
    /// returned when this is present.
    pub address_public_key: Option<Vec<u8>>,
}

impl QueryRequestAad {
    pub fn new(start_from_user_event_id: i64, start_from_block_index: u64) -> Self {
        Self {
            start_from_user_event_id,
            start_from_block_index,
            address_public_key: None,
        }
    }

    pub fn with_address(mut self, address_public_key: Vec<u8>) -> Self {
        self.address_public_key = Some(address_public_key);
        self
    }

    pub fn has_address(&self) -> bool {
        self.address_public_key.is_some()
    }
}

/// Sensitive half of a query
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Search keys to resolve, in order
    pub get_txos: Vec<SearchKey>,
}

impl QueryRequest {
    pub fn new(get_txos: Vec<SearchKey>) -> Self {
        Self { get_txos }
    }
}

impl std::fmt::Debug for QueryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRequest")
            .field("get_txos", &self.get_txos.len())
            .finish()
    }
}

/// Transport wrapper for both halves of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEnvelope {
    pub version: u16,
    pub aad: QueryRequestAad,
    pub request: QueryRequest,
}

impl QueryEnvelope {
    pub fn new(aad: QueryRequestAad, request: QueryRequest) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            aad,
            request,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let envelope: Self = bincode::deserialize(data)?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(Error::Codec(format!(
                "unsupported envelope version {} (expected {})",
                envelope.version, PROTOCOL_VERSION
            )));
        }
        Ok(envelope)
    }
}

/// Combined answer to one query.
///
/// The service guarantees all relevant events from the request's
/// `start_from_user_event_id` up to `next_start_from_user_event_id`, and all
/// search results from `start_from_block_index` up to
/// `highest_processed_block_count`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Blocks processed by both the event feed and the search index when the
    /// request was evaluated. Next `start_from_block_index`.
    pub highest_processed_block_count: u64,
    /// Timestamp of the block at `highest_processed_block_count - 1`
    pub highest_processed_block_signature_timestamp: u64,
    /// Next `start_from_user_event_id`
    pub next_start_from_user_event_id: i64,
    /// Pairwise disjoint, ascending
    pub missed_block_ranges: Vec<BlockRange>,
    pub rngs: Vec<RngRecord>,
    pub decommissioned_ingest_invocations: Vec<DecommissionedIngestInvocation>,
    /// Aligned 1:1 with the request's `get_txos`
    pub tx_out_search_results: Vec<TxOutSearchResult>,
    /// Informational; may exceed `highest_processed_block_count`
    pub last_known_block_count: u64,
    /// Informational
    pub last_known_block_cumulative_txo_count: u64,
}

impl QueryResponse {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }

    pub fn found(&self) -> impl Iterator<Item = &TxOutSearchResult> {
        self.tx_out_search_results.iter().filter(|r| r.is_found())
    }
}
