//! In-memory RNG directory
//!
//! Holds the event feed (new RNG records and decommissions) keyed by a dense,
//! increasing event id starting at 1, plus per-invocation ingest progress.
//! Readers load an immutable snapshot through `ArcSwap`; writers are
//! serialized by a mutex and publish a fresh snapshot.
//!
//! ## Progress
//!
//! Live progress is the lowest next-unprocessed block across active
//! invocations. With no active invocation it is the highest count any
//! decommissioned invocation reached, and 0 for an empty directory.
//!
//! Reported progress is the high-water mark of live progress, so a late
//! invocation starting below it never pulls the count back. Each event
//! remembers the mark as it stood just before the event was published; a
//! page cut short reports the mark of the first event it leaves out.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use fog_view_core::{DecommissionedIngestInvocation, RngRecord};
use thiserror::Error;

use crate::collaborator::{CollaboratorError, EventFilter, ProcessedBlock, RngDirectory, RngEvents};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("ingest invocation {0} already has an RNG record")]
    DuplicateInvocation(i64),

    #[error("unknown ingest invocation {0}")]
    UnknownInvocation(i64),

    #[error("ingest invocation {0} is decommissioned")]
    Decommissioned(i64),

    #[error("block {block} for invocation {id} is behind its next block {next}")]
    StaleBlock { id: i64, block: u64, next: u64 },
}

#[derive(Debug, Clone)]
enum DirectoryEvent {
    Rng(RngRecord),
    Decommission(DecommissionedIngestInvocation),
}

impl DirectoryEvent {
    fn matches(&self, filter: EventFilter) -> bool {
        match filter {
            EventFilter::All => true,
            EventFilter::DecommissionsOnly => matches!(self, DirectoryEvent::Decommission(_)),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredEvent {
    id: i64,
    event: DirectoryEvent,
    /// High-water mark just before this event was published
    processed_before: ProcessedBlock,
}

#[derive(Debug, Clone, Copy)]
struct InvocationState {
    /// First block this invocation has not processed yet
    next_block: u64,
    decommissioned: bool,
}

#[derive(Debug, Clone, Default)]
struct DirectorySnapshot {
    /// Ascending by id; ids are 1..=len
    events: Vec<StoredEvent>,
    invocations: BTreeMap<i64, InvocationState>,
    block_timestamps: BTreeMap<u64, u64>,
    high_water: ProcessedBlock,
}

impl DirectorySnapshot {
    fn next_event_id(&self) -> i64 {
        self.events.last().map_or(1, |e| e.id + 1)
    }

    fn push(&mut self, event: DirectoryEvent) -> i64 {
        let id = self.next_event_id();
        self.events.push(StoredEvent {
            id,
            event,
            processed_before: self.high_water,
        });
        id
    }

    fn live_progress(&self) -> ProcessedBlock {
        let active = self
            .invocations
            .values()
            .filter(|s| !s.decommissioned)
            .map(|s| s.next_block)
            .min();
        let count = match active {
            Some(count) => count,
            None => self
                .invocations
                .values()
                .map(|s| s.next_block)
                .max()
                .unwrap_or(0),
        };

        let signature_timestamp = count
            .checked_sub(1)
            .and_then(|block| self.block_timestamps.get(&block))
            .copied()
            .unwrap_or(0);

        ProcessedBlock::new(count, signature_timestamp)
    }

    fn raise_high_water(&mut self) {
        let live = self.live_progress();
        if live.count > self.high_water.count {
            self.high_water = live;
        }
    }
}

pub struct MemoryRngDirectory {
    snapshot: ArcSwap<DirectorySnapshot>,
    writer: Mutex<()>,
    available: AtomicBool,
    page_limit: Option<usize>,
}

impl MemoryRngDirectory {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(DirectorySnapshot::default()),
            writer: Mutex::new(()),
            available: AtomicBool::new(true),
            page_limit: None,
        }
    }

    /// Return at most `limit` events per call
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = Some(limit.max(1));
        self
    }

    /// Simulate the backing store going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of events published so far
    pub fn event_count(&self) -> usize {
        self.snapshot.load().events.len()
    }

    /// Publish the RNG record of a new ingest invocation. Returns its event id.
    pub fn publish_rng_record(&self, record: RngRecord) -> Result<i64, DirectoryError> {
        self.update(|snapshot| {
            let id = record.ingest_invocation_id;
            if snapshot.invocations.contains_key(&id) {
                return Err(DirectoryError::DuplicateInvocation(id));
            }
            snapshot.invocations.insert(
                id,
                InvocationState {
                    next_block: record.start_block,
                    decommissioned: false,
                },
            );
            Ok(snapshot.push(DirectoryEvent::Rng(record)))
        })
    }

    /// Retire an invocation. Allowed exactly once per invocation.
    pub fn decommission(
        &self,
        ingest_invocation_id: i64,
        last_ingested_block: u64,
    ) -> Result<i64, DirectoryError> {
        self.update(|snapshot| {
            let state = snapshot
                .invocations
                .get_mut(&ingest_invocation_id)
                .ok_or(DirectoryError::UnknownInvocation(ingest_invocation_id))?;
            if state.decommissioned {
                return Err(DirectoryError::Decommissioned(ingest_invocation_id));
            }
            state.decommissioned = true;
            state.next_block = last_ingested_block.saturating_add(1);

            Ok(snapshot.push(DirectoryEvent::Decommission(DecommissionedIngestInvocation {
                ingest_invocation_id,
                last_ingested_block,
            })))
        })
    }

    /// Record that an invocation finished processing `block_index`.
    ///
    /// Skipped blocks are not filled in here; report them as missed ranges.
    pub fn report_ingested_block(
        &self,
        ingest_invocation_id: i64,
        block_index: u64,
        signature_timestamp: u64,
    ) -> Result<(), DirectoryError> {
        self.update(|snapshot| {
            let state = snapshot
                .invocations
                .get_mut(&ingest_invocation_id)
                .ok_or(DirectoryError::UnknownInvocation(ingest_invocation_id))?;
            if state.decommissioned {
                return Err(DirectoryError::Decommissioned(ingest_invocation_id));
            }
            if block_index < state.next_block {
                return Err(DirectoryError::StaleBlock {
                    id: ingest_invocation_id,
                    block: block_index,
                    next: state.next_block,
                });
            }
            state.next_block = block_index.saturating_add(1);
            snapshot.block_timestamps.insert(block_index, signature_timestamp);
            Ok(())
        })
    }

    fn update<T>(
        &self,
        f: impl FnOnce(&mut DirectorySnapshot) -> Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = DirectorySnapshot::clone(&self.snapshot.load());
        let result = f(&mut next)?;
        next.raise_high_water();
        self.snapshot.store(Arc::new(next));
        Ok(result)
    }
}

impl Default for MemoryRngDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RngDirectory for MemoryRngDirectory {
    async fn events_since(
        &self,
        event_cursor: i64,
        filter: EventFilter,
    ) -> Result<RngEvents, CollaboratorError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("rng directory offline".into()));
        }

        let snapshot = self.snapshot.load();
        let start = snapshot.events.partition_point(|e| e.id <= event_cursor);
        let limit = self.page_limit.unwrap_or(usize::MAX);
        let mut pending = snapshot.events[start..]
            .iter()
            .filter(|e| e.event.matches(filter));

        let mut page = RngEvents {
            next_event_id: event_cursor,
            processed: snapshot.high_water,
            ..Default::default()
        };
        for stored in pending.by_ref().take(limit) {
            match &stored.event {
                DirectoryEvent::Rng(record) => page.rngs.push(record.clone()),
                DirectoryEvent::Decommission(d) => page.decommissions.push(*d),
            }
            page.next_event_id = stored.id;
        }
        if let Some(left_out) = pending.next() {
            page.processed = left_out.processed_before;
            page.more = true;
        }

        tracing::trace!(
            cursor = event_cursor,
            next = page.next_event_id,
            rngs = page.rngs.len(),
            decommissions = page.decommissions.len(),
            more = page.more,
            "Directory page"
        );

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fog_view_core::KexRngPubkey;

    fn record(id: i64, start_block: u64) -> RngRecord {
        RngRecord::new(
            id,
            KexRngPubkey {
                public_key: vec![id as u8; 32],
                version: 0,
            },
            start_block,
        )
    }

    async fn progress(dir: &MemoryRngDirectory) -> ProcessedBlock {
        dir.events_since(0, EventFilter::All)
            .await
            .unwrap()
            .processed
    }

    #[tokio::test]
    async fn test_event_ids_are_sequential() {
        let dir = MemoryRngDirectory::new();
        assert_eq!(dir.publish_rng_record(record(7, 0)).unwrap(), 1);
        assert_eq!(dir.publish_rng_record(record(8, 5)).unwrap(), 2);
        assert_eq!(dir.decommission(7, 4).unwrap(), 3);

        let page = dir.events_since(0, EventFilter::All).await.unwrap();
        assert_eq!(page.rngs.len(), 2);
        assert_eq!(page.decommissions.len(), 1);
        assert_eq!(page.next_event_id, 3);
    }

    #[tokio::test]
    async fn test_empty_page_keeps_cursor() {
        let dir = MemoryRngDirectory::new();
        dir.publish_rng_record(record(1, 0)).unwrap();

        let page = dir.events_since(1, EventFilter::All).await.unwrap();
        assert!(page.rngs.is_empty());
        assert_eq!(page.next_event_id, 1);

        // A cursor past the end is echoed, never rewound
        let page = dir.events_since(50, EventFilter::All).await.unwrap();
        assert_eq!(page.next_event_id, 50);
    }

    #[tokio::test]
    async fn test_paging_has_no_gaps_or_repeats() {
        let dir = MemoryRngDirectory::new().with_page_limit(2);
        for id in 1..=5 {
            dir.publish_rng_record(record(id, 0)).unwrap();
        }

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let page = dir.events_since(cursor, EventFilter::All).await.unwrap();
            if page.rngs.is_empty() {
                break;
            }
            assert!(page.rngs.len() <= 2);
            seen.extend(page.rngs.iter().map(|r| r.ingest_invocation_id));
            assert!(page.next_event_id > cursor);
            cursor = page.next_event_id;
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_decommission_exactly_once() {
        let dir = MemoryRngDirectory::new();
        dir.publish_rng_record(record(1, 0)).unwrap();
        dir.decommission(1, 10).unwrap();

        assert_eq!(dir.decommission(1, 11), Err(DirectoryError::Decommissioned(1)));
        assert_eq!(dir.decommission(2, 11), Err(DirectoryError::UnknownInvocation(2)));
        assert_eq!(
            dir.report_ingested_block(1, 11, 0),
            Err(DirectoryError::Decommissioned(1))
        );
        assert_eq!(dir.event_count(), 2);
    }

    #[test]
    fn test_duplicate_invocation_rejected() {
        let dir = MemoryRngDirectory::new();
        dir.publish_rng_record(record(1, 0)).unwrap();
        assert_eq!(
            dir.publish_rng_record(record(1, 9)),
            Err(DirectoryError::DuplicateInvocation(1))
        );
    }

    #[tokio::test]
    async fn test_progress_tracks_slowest_active_invocation() {
        let dir = MemoryRngDirectory::new();
        let processed = progress(&dir).await;
        assert_eq!(processed, ProcessedBlock::default());

        dir.publish_rng_record(record(1, 0)).unwrap();
        dir.publish_rng_record(record(2, 0)).unwrap();
        for block in 0..10 {
            dir.report_ingested_block(1, block, 1_000 + block).unwrap();
        }
        for block in 0..4 {
            dir.report_ingested_block(2, block, 1_000 + block).unwrap();
        }

        let processed = progress(&dir).await;
        assert_eq!(processed, ProcessedBlock::new(4, 1_003));

        // Once the laggard retires, the remaining invocation bounds progress
        dir.decommission(2, 3).unwrap();
        let processed = progress(&dir).await;
        assert_eq!(processed, ProcessedBlock::new(10, 1_009));

        // With nothing active, the furthest decommissioned invocation counts
        dir.decommission(1, 9).unwrap();
        let processed = progress(&dir).await;
        assert_eq!(processed.count, 10);
    }

    #[tokio::test]
    async fn test_late_invocation_does_not_lower_progress() {
        let dir = MemoryRngDirectory::new();
        dir.publish_rng_record(record(1, 0)).unwrap();
        for block in 0..10 {
            dir.report_ingested_block(1, block, 1_000 + block).unwrap();
        }
        let before = progress(&dir).await;
        assert_eq!(before, ProcessedBlock::new(10, 1_009));

        dir.publish_rng_record(record(2, 5)).unwrap();
        let after = progress(&dir).await;
        assert_eq!(after, before);

        // The late invocation catching up past the mark raises it again
        for block in 5..12 {
            dir.report_ingested_block(2, block, 1_000 + block).unwrap();
        }
        for block in 10..12 {
            dir.report_ingested_block(1, block, 1_000 + block).unwrap();
        }
        let caught_up = progress(&dir).await;
        assert_eq!(caught_up, ProcessedBlock::new(12, 1_011));
    }

    #[tokio::test]
    async fn test_short_page_reports_progress_before_left_out_event() {
        let dir = MemoryRngDirectory::new().with_page_limit(1);
        dir.publish_rng_record(record(1, 0)).unwrap();
        for block in 0..6 {
            dir.report_ingested_block(1, block, 1_000 + block).unwrap();
        }
        dir.publish_rng_record(record(2, 6)).unwrap();
        for block in 6..10 {
            dir.report_ingested_block(1, block, 1_000 + block).unwrap();
            dir.report_ingested_block(2, block, 1_000 + block).unwrap();
        }

        let first = dir.events_since(0, EventFilter::All).await.unwrap();
        assert_eq!(first.rngs, vec![record(1, 0)]);
        assert!(first.more);
        assert_eq!(first.processed, ProcessedBlock::new(6, 1_005));

        let second = dir
            .events_since(first.next_event_id, EventFilter::All)
            .await
            .unwrap();
        assert_eq!(second.rngs, vec![record(2, 6)]);
        assert!(!second.more);
        assert_eq!(second.processed, ProcessedBlock::new(10, 1_009));
    }

    #[tokio::test]
    async fn test_decommission_filter_pages_over_decommissions() {
        let dir = MemoryRngDirectory::new().with_page_limit(1);
        for id in 1..=3 {
            dir.publish_rng_record(record(id, 0)).unwrap();
        }
        dir.decommission(1, 4).unwrap();
        dir.decommission(3, 4).unwrap();

        let page = dir
            .events_since(0, EventFilter::DecommissionsOnly)
            .await
            .unwrap();
        assert!(page.rngs.is_empty());
        assert_eq!(page.decommissions.len(), 1);
        assert_eq!(page.decommissions[0].ingest_invocation_id, 1);
        assert_eq!(page.next_event_id, 4);
        assert!(page.more);

        let page = dir
            .events_since(page.next_event_id, EventFilter::DecommissionsOnly)
            .await
            .unwrap();
        assert_eq!(page.decommissions[0].ingest_invocation_id, 3);
        assert_eq!(page.next_event_id, 5);
        assert!(!page.more);
    }

    #[test]
    fn test_stale_block_rejected() {
        let dir = MemoryRngDirectory::new();
        dir.publish_rng_record(record(1, 5)).unwrap();
        assert_eq!(
            dir.report_ingested_block(1, 4, 0),
            Err(DirectoryError::StaleBlock { id: 1, block: 4, next: 5 })
        );
        dir.report_ingested_block(1, 5, 0).unwrap();
        assert!(dir.report_ingested_block(1, 5, 0).is_err());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let dir = MemoryRngDirectory::new();
        dir.set_available(false);
        assert!(matches!(
            dir.events_since(0, EventFilter::All).await,
            Err(CollaboratorError::Unavailable(_))
        ));
        dir.set_available(true);
        assert!(dir.events_since(0, EventFilter::All).await.is_ok());
    }
}
