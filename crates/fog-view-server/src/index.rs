//! In-memory TxOut index
//!
//! Maps search keys to encrypted TxOut records. This is the development
//! stand-in for the oblivious index: it keeps the same contract (one lookup
//! per key, progress on every batch) but offers no access-pattern hiding.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use fog_view_core::SearchKey;

use crate::collaborator::{
    CollaboratorError, IndexBatch, IndexProgress, KeyLookup, ProcessedBlock, TxOutIndex,
};

#[derive(Debug, Clone, Default)]
struct IndexSnapshot {
    records: HashMap<SearchKey, Vec<u8>>,
    quarantined: HashSet<SearchKey>,
    progress: IndexProgress,
}

pub struct MemoryTxOutIndex {
    snapshot: ArcSwap<IndexSnapshot>,
    writer: Mutex<()>,
    available: AtomicBool,
}

impl MemoryTxOutIndex {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(IndexSnapshot::default()),
            writer: Mutex::new(()),
            available: AtomicBool::new(true),
        }
    }

    /// Store the encrypted record for `search_key`, replacing any previous one
    pub fn insert(&self, search_key: SearchKey, ciphertext: Vec<u8>) {
        self.update(|s| {
            s.records.insert(search_key, ciphertext);
        });
    }

    /// Mark a record unreadable: lookups for it fail without failing the batch
    pub fn quarantine(&self, search_key: SearchKey) {
        self.update(|s| {
            s.quarantined.insert(search_key);
        });
    }

    /// Advance the processed-block marker and chain hints.
    ///
    /// Each value only moves forward; a lower value leaves it unchanged.
    pub fn advance(
        &self,
        processed: ProcessedBlock,
        last_known_block_count: u64,
        last_known_block_cumulative_txo_count: u64,
    ) {
        self.update(|s| {
            let progress = &mut s.progress;
            if processed.count >= progress.processed.count {
                progress.processed = processed;
            }
            progress.last_known_block_count =
                progress.last_known_block_count.max(last_known_block_count);
            progress.last_known_block_cumulative_txo_count = progress
                .last_known_block_cumulative_txo_count
                .max(last_known_block_cumulative_txo_count);
        });
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn update(&self, f: impl FnOnce(&mut IndexSnapshot)) {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = IndexSnapshot::clone(&self.snapshot.load());
        f(&mut next);
        self.snapshot.store(Arc::new(next));
    }
}

impl Default for MemoryTxOutIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TxOutIndex for MemoryTxOutIndex {
    async fn lookup(&self, keys: &[SearchKey]) -> Result<IndexBatch, CollaboratorError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("txout index offline".into()));
        }

        let snapshot = self.snapshot.load();
        let lookups = keys
            .iter()
            .map(|key| {
                if snapshot.quarantined.contains(key) {
                    return KeyLookup::Failed("record quarantined".into());
                }
                match snapshot.records.get(key) {
                    Some(ciphertext) => KeyLookup::Found(ciphertext.clone()),
                    None => KeyLookup::NotFound,
                }
            })
            .collect();

        Ok(IndexBatch {
            lookups,
            progress: snapshot.progress,
        })
    }
}
