//! In-memory missed block range tracker
//!
//! Ingest reports raw failure intervals as they happen; they may overlap or
//! touch. Queries see them coalesced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use fog_view_core::{coalesce, BlockRange};

use crate::collaborator::{CollaboratorError, MissedRangeTracker};

pub struct MemoryMissedRanges {
    ranges: ArcSwap<Vec<BlockRange>>,
    writer: Mutex<()>,
    available: AtomicBool,
}

impl MemoryMissedRanges {
    pub fn new() -> Self {
        Self {
            ranges: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
            available: AtomicBool::new(true),
        }
    }

    /// Record that blocks `first_block..=last_block` were not indexed
    pub fn report_missed(&self, first_block: u64, last_block: u64) -> fog_view_core::Result<()> {
        let range = BlockRange::new(first_block, last_block)?;

        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = Vec::clone(&self.ranges.load());
        next.push(range);
        // Keep storage compact; the coalesced form answers every query
        self.ranges.store(Arc::new(coalesce(next)));

        tracing::warn!(range = %range, "Missed block range reported");
        Ok(())
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for MemoryMissedRanges {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MissedRangeTracker for MemoryMissedRanges {
    async fn missed_ranges(&self, block_cursor: u64) -> Result<Vec<BlockRange>, CollaboratorError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("missed range tracker offline".into()));
        }

        Ok(self
            .ranges
            .load()
            .iter()
            .filter(|r| r.reaches(block_cursor))
            .copied()
            .collect())
    }
}
