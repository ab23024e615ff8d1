//! Query resolution and cursor reconciliation
//!
//! One [`Reconciler::resolve`] call answers one query. The three collaborator
//! calls run concurrently; any failure or timeout fails the whole query, and
//! the futures still in flight are dropped. No state survives between calls:
//! the client carries it in its cursor pair.
//!
//! Address context decides how much of the directory a call sees:
//!
//! | Address | `decommissions_without_address` | RNG records | Decommissions | Event cursor |
//! |---------|---------------------------------|-------------|---------------|--------------|
//! | present | -                               | yes         | yes           | advanced     |
//! | absent  | `true`                          | no          | yes           | unchanged    |
//! | absent  | `false`                         | no          | no            | unchanged    |
//!
//! Missed ranges are reported without an address only under
//! [`MissedRangePolicy::Report`].

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fog_view_core::constants::ADDRESS_KEY_LEN;
use fog_view_core::{QueryRequest, QueryRequestAad, QueryResponse};

use crate::collaborator::{
    CollaboratorError, EventFilter, MissedRangeTracker, ProcessedBlock, RngDirectory, RngEvents,
    TxOutIndex,
};
use crate::config::{MissedRangePolicy, ReconcilerConfig};
use crate::error::{Result, ServerError};
use crate::metrics;
use crate::search::SearchAdapter;

const RNG_DIRECTORY: &str = "rng directory";
const MISSED_RANGES: &str = "missed range tracker";
const TXOUT_INDEX: &str = "txout index";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventScope {
    Full,
    DecommissionsOnly,
    Skip,
}

pub struct Reconciler {
    directory: Arc<dyn RngDirectory>,
    missed: Arc<dyn MissedRangeTracker>,
    search: SearchAdapter,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        directory: Arc<dyn RngDirectory>,
        missed: Arc<dyn MissedRangeTracker>,
        index: Arc<dyn TxOutIndex>,
        config: ReconcilerConfig,
    ) -> Self {
        let search = SearchAdapter::new(index, config.ciphertext_len, &config.rate_limit);
        Self {
            directory,
            missed,
            search,
            config,
        }
    }

    /// Resolve one query into a complete response, or fail as a whole
    pub async fn resolve(
        &self,
        aad: &QueryRequestAad,
        request: &QueryRequest,
    ) -> Result<QueryResponse> {
        let start = Instant::now();
        let result = self.resolve_inner(aad, request).await;

        match &result {
            Ok(response) => {
                metrics::record_query(start.elapsed());
                metrics::record_search_outcomes(&response.tx_out_search_results);
            }
            Err(e) => {
                metrics::record_query_error(e.code());
                tracing::warn!(error = %e, retryable = e.is_retryable(), "Query failed");
            }
        }

        result
    }

    async fn resolve_inner(
        &self,
        aad: &QueryRequestAad,
        request: &QueryRequest,
    ) -> Result<QueryResponse> {
        self.validate(aad, request)?;

        let has_address = aad.has_address();
        let scope = match (has_address, self.config.decommissions_without_address) {
            (true, _) => EventScope::Full,
            (false, true) => EventScope::DecommissionsOnly,
            (false, false) => EventScope::Skip,
        };
        let report_missed =
            has_address || self.config.missed_ranges_without_address == MissedRangePolicy::Report;
        let deadline = Duration::from_millis(self.config.collaborator_timeout_ms);

        tracing::debug!(
            event_cursor = aad.start_from_user_event_id,
            block_cursor = aad.start_from_block_index,
            keys = request.get_txos.len(),
            has_address,
            ?scope,
            report_missed,
            "Resolving query"
        );

        let event_cursor = aad.start_from_user_event_id;
        let events = async {
            match scope {
                EventScope::Skip => Ok(None),
                EventScope::Full => with_deadline(
                    RNG_DIRECTORY,
                    deadline,
                    self.directory.events_since(event_cursor, EventFilter::All),
                )
                .await
                .map(Some),
                EventScope::DecommissionsOnly => with_deadline(
                    RNG_DIRECTORY,
                    deadline,
                    drain_decommissions(self.directory.as_ref(), event_cursor),
                )
                .await
                .map(Some),
            }
        };
        let missed = async {
            if report_missed {
                with_deadline(
                    MISSED_RANGES,
                    deadline,
                    self.missed.missed_ranges(aad.start_from_block_index),
                )
                .await
            } else {
                Ok(Vec::new())
            }
        };
        let search = with_deadline(TXOUT_INDEX, deadline, self.search.search(&request.get_txos));

        let (events, missed_block_ranges, search) = tokio::try_join!(events, missed, search)?;

        let mut processed = search.progress.processed;
        let mut response = QueryResponse {
            next_start_from_user_event_id: aad.start_from_user_event_id,
            missed_block_ranges,
            tx_out_search_results: search.results,
            last_known_block_count: search.progress.last_known_block_count,
            last_known_block_cumulative_txo_count: search
                .progress
                .last_known_block_cumulative_txo_count,
            ..Default::default()
        };

        if let Some(RngEvents {
            rngs,
            decommissions,
            next_event_id,
            processed: directory_processed,
            ..
        }) = events
        {
            processed = processed.min(directory_processed);
            response.decommissioned_ingest_invocations = decommissions;
            if scope == EventScope::Full {
                response.rngs = rngs;
                response.next_start_from_user_event_id = next_event_id.max(event_cursor);
            }
        }

        let ProcessedBlock {
            count,
            signature_timestamp,
        } = processed;
        response.highest_processed_block_count = count;
        response.highest_processed_block_signature_timestamp = signature_timestamp;

        tracing::debug!(
            next_event_cursor = response.next_start_from_user_event_id,
            highest_processed_block_count = count,
            rngs = response.rngs.len(),
            decommissions = response.decommissioned_ingest_invocations.len(),
            missed_ranges = response.missed_block_ranges.len(),
            "Query resolved"
        );

        Ok(response)
    }

    /// Reject malformed requests before touching any collaborator
    fn validate(&self, aad: &QueryRequestAad, request: &QueryRequest) -> Result<()> {
        if aad.start_from_user_event_id < 0 {
            return Err(ServerError::InvalidQuery(format!(
                "negative event cursor {}",
                aad.start_from_user_event_id
            )));
        }
        if request.get_txos.len() > self.config.max_search_keys {
            return Err(ServerError::InvalidQuery(format!(
                "{} search keys exceeds limit of {}",
                request.get_txos.len(),
                self.config.max_search_keys
            )));
        }
        if let Some(key) = &aad.address_public_key {
            if key.len() != ADDRESS_KEY_LEN {
                return Err(ServerError::InvalidQuery(format!(
                    "address key must be {} bytes, got {}",
                    ADDRESS_KEY_LEN,
                    key.len()
                )));
            }
        }
        Ok(())
    }
}

/// Follow directory pages until every decommission after `event_cursor` is
/// collected. Callers without an address never advance their event cursor,
/// so a single page could hide later decommissions from them forever.
async fn drain_decommissions(
    directory: &dyn RngDirectory,
    event_cursor: i64,
) -> std::result::Result<RngEvents, CollaboratorError> {
    let mut cursor = event_cursor;
    let mut drained = RngEvents {
        next_event_id: event_cursor,
        ..Default::default()
    };
    loop {
        let page = directory
            .events_since(cursor, EventFilter::DecommissionsOnly)
            .await?;
        drained.decommissions.extend(page.decommissions);
        drained.processed = page.processed;
        if !page.more {
            return Ok(drained);
        }
        if page.next_event_id <= cursor {
            return Err(CollaboratorError::StalledPage(cursor));
        }
        cursor = page.next_event_id;
    }
}

async fn with_deadline<T, F>(name: &'static str, after: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(ServerError::collaborator(name, source)),
        Err(_) => Err(ServerError::Timeout {
            name,
            after_ms: after.as_millis() as u64,
        }),
    }
}
