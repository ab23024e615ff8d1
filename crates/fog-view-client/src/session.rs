//! Client-held query session
//!
//! The server keeps no per-client state. Everything needed to continue
//! (the cursor pair, the RNG records learned so far, missed ranges still to
//! brute-force scan) lives here and is advanced by [`QuerySession::apply`].
//!
//! Lifecycle: `bootstrap` (both cursors 0) → steady state, repeated. A session
//! can [`reset`](QuerySession::reset) to bootstrap at any time, at the cost of
//! a full rescan.

use std::collections::BTreeMap;

use fog_view_core::{
    coalesce, BlockRange, QueryEnvelope, QueryRequest, QueryRequestAad, QueryResponse, RngRecord,
    SearchKey, TxOutSearchResult, TxOutSearchResultCode,
};

/// An RNG record and, once decommissioned, its last ingested block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownRng {
    pub record: RngRecord,
    pub last_ingested_block: Option<u64>,
}

impl KnownRng {
    pub fn is_active(&self) -> bool {
        self.last_ingested_block.is_none()
    }
}

/// Search outcomes of one response, grouped by what the client does next
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyOutcomes {
    pub found: Vec<TxOutSearchResult>,
    pub not_found: usize,
    /// Send these again in a later query
    pub retry_later: Vec<SearchKey>,
    /// Never send these again unchanged
    pub permanent: Vec<SearchKey>,
}

impl KeyOutcomes {
    pub fn classify(results: &[TxOutSearchResult]) -> Self {
        let mut outcomes = KeyOutcomes::default();
        for result in results {
            match result.result_code {
                TxOutSearchResultCode::Found => outcomes.found.push(result.clone()),
                TxOutSearchResultCode::NotFound => outcomes.not_found += 1,
                code if code.is_permanent() => outcomes.permanent.push(result.search_key.clone()),
                // Retryable codes, and codes from a newer server we cannot interpret
                _ => outcomes.retry_later.push(result.search_key.clone()),
            }
        }
        outcomes
    }
}

/// What one [`QuerySession::apply`] changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub new_rngs: Vec<RngRecord>,
    /// Invocation ids decommissioned by this response
    pub retired: Vec<i64>,
    pub outcomes: KeyOutcomes,
}

#[derive(Debug, Clone, Default)]
pub struct QuerySession {
    address_public_key: Option<Vec<u8>>,
    event_cursor: i64,
    block_cursor: u64,
    rngs: BTreeMap<i64, KnownRng>,
    /// Decommissions seen before their RNG record
    pending_retirements: BTreeMap<i64, u64>,
    missed_ranges: Vec<BlockRange>,
    last_known_block_count: u64,
}

impl QuerySession {
    /// Fresh session without address context
    pub fn bootstrap() -> Self {
        Self::default()
    }

    /// Fresh session that can attach `address_public_key` to requests
    pub fn with_address(address_public_key: Vec<u8>) -> Self {
        Self {
            address_public_key: Some(address_public_key),
            ..Default::default()
        }
    }

    pub fn event_cursor(&self) -> i64 {
        self.event_cursor
    }

    pub fn block_cursor(&self) -> u64 {
        self.block_cursor
    }

    pub fn is_bootstrap(&self) -> bool {
        self.event_cursor == 0 && self.block_cursor == 0
    }

    pub fn last_known_block_count(&self) -> u64 {
        self.last_known_block_count
    }

    pub fn rngs(&self) -> impl Iterator<Item = &KnownRng> {
        self.rngs.values()
    }

    pub fn active_rngs(&self) -> impl Iterator<Item = &RngRecord> {
        self.rngs
            .values()
            .filter(|rng| rng.is_active())
            .map(|rng| &rng.record)
    }

    /// Coalesced ranges the client must scan itself
    pub fn missed_ranges(&self) -> &[BlockRange] {
        &self.missed_ranges
    }

    /// Build the next query from the current cursors.
    ///
    /// The address key is attached only when `with_address` is set and the
    /// session has one.
    pub fn next_request(&self, keys: Vec<SearchKey>, with_address: bool) -> QueryEnvelope {
        let mut aad = QueryRequestAad::new(self.event_cursor, self.block_cursor);
        if with_address {
            if let Some(key) = &self.address_public_key {
                aad = aad.with_address(key.clone());
            }
        }
        QueryEnvelope::new(aad, QueryRequest::new(keys))
    }

    /// Fold a response into the session and advance both cursors.
    ///
    /// Cursors never move backwards, even if a response from a lagging
    /// replica reports lower values.
    pub fn apply(&mut self, response: &QueryResponse) -> SessionUpdate {
        let mut update = SessionUpdate::default();

        for record in &response.rngs {
            let id = record.ingest_invocation_id;
            if self.rngs.contains_key(&id) {
                continue;
            }
            let last_ingested_block = self.pending_retirements.remove(&id);
            self.rngs.insert(
                id,
                KnownRng {
                    record: record.clone(),
                    last_ingested_block,
                },
            );
            update.new_rngs.push(record.clone());
        }

        for decommission in &response.decommissioned_ingest_invocations {
            let id = decommission.ingest_invocation_id;
            match self.rngs.get_mut(&id) {
                Some(known) if known.is_active() => {
                    known.last_ingested_block = Some(decommission.last_ingested_block);
                    update.retired.push(id);
                }
                Some(_) => {}
                None => {
                    self.pending_retirements
                        .insert(id, decommission.last_ingested_block);
                }
            }
        }

        if !response.missed_block_ranges.is_empty() {
            let merged = self
                .missed_ranges
                .iter()
                .chain(&response.missed_block_ranges)
                .copied();
            self.missed_ranges = coalesce(merged);
        }

        self.event_cursor = self.event_cursor.max(response.next_start_from_user_event_id);
        self.block_cursor = self.block_cursor.max(response.highest_processed_block_count);
        self.last_known_block_count = self
            .last_known_block_count
            .max(response.last_known_block_count);

        update.outcomes = KeyOutcomes::classify(&response.tx_out_search_results);

        tracing::debug!(
            event_cursor = self.event_cursor,
            block_cursor = self.block_cursor,
            new_rngs = update.new_rngs.len(),
            retired = update.retired.len(),
            found = update.outcomes.found.len(),
            retry_later = update.outcomes.retry_later.len(),
            "Session advanced"
        );

        update
    }

    /// Return to bootstrap, forgetting everything except the address key
    pub fn reset(&mut self) {
        *self = Self {
            address_public_key: self.address_public_key.take(),
            ..Default::default()
        };
    }
}
