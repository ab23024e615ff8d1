//! Seed file for the in-memory stores
//!
//! Lets the development server start with data already ingested. Byte
//! strings are hex. Example:
//!
//! ```json
//! {
//!   "rng_records": [
//!     { "ingest_invocation_id": 1, "public_key": "aa..", "version": 1, "start_block": 0 }
//!   ],
//!   "ingested_blocks": [
//!     { "ingest_invocation_id": 1, "first_block": 0, "last_block": 9,
//!       "signature_timestamp": 1700000000 }
//!   ],
//!   "decommissions": [],
//!   "missed_ranges": [{ "first_block": 4, "last_block": 5 }],
//!   "txos": [{ "search_key": "00..", "ciphertext": "ff.." }],
//!   "index_progress": { "block_count": 10, "signature_timestamp": 1700000009,
//!                       "last_known_block_count": 10, "cumulative_txo_count": 42 }
//! }
//! ```

use std::path::Path;

use fog_view_core::{KexRngPubkey, RngRecord};
use serde::Deserialize;

use crate::collaborator::ProcessedBlock;
use crate::directory::MemoryRngDirectory;
use crate::error::{Result, ServerError};
use crate::index::MemoryTxOutIndex;
use crate::missed::MemoryMissedRanges;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub rng_records: Vec<SeedRngRecord>,
    pub ingested_blocks: Vec<SeedIngestedBlocks>,
    pub decommissions: Vec<SeedDecommission>,
    pub missed_ranges: Vec<SeedRange>,
    pub txos: Vec<SeedTxOut>,
    pub index_progress: Option<SeedIndexProgress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedRngRecord {
    pub ingest_invocation_id: i64,
    pub public_key: String,
    #[serde(default)]
    pub version: u32,
    pub start_block: u64,
}

/// Blocks `first_block..=last_block` ingested by one invocation, each stamped
/// with `signature_timestamp + (block - first_block)` (saturating)
#[derive(Debug, Clone, Deserialize)]
pub struct SeedIngestedBlocks {
    pub ingest_invocation_id: i64,
    pub first_block: u64,
    pub last_block: u64,
    #[serde(default)]
    pub signature_timestamp: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedDecommission {
    pub ingest_invocation_id: i64,
    pub last_ingested_block: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedRange {
    pub first_block: u64,
    pub last_block: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedTxOut {
    pub search_key: String,
    pub ciphertext: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedIndexProgress {
    pub block_count: u64,
    #[serde(default)]
    pub signature_timestamp: u64,
    #[serde(default)]
    pub last_known_block_count: u64,
    #[serde(default)]
    pub cumulative_txo_count: u64,
}

/// What [`SeedFile::apply`] loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub events: usize,
    pub missed_ranges: usize,
    pub txos: usize,
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| ServerError::InvalidConfig(format!("seed {field}: {e}")))
}

fn seed_error(e: impl std::fmt::Display) -> ServerError {
    ServerError::InvalidConfig(format!("seed: {e}"))
}

impl SeedFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Feed the seed into the stores, in order: records, blocks,
    /// decommissions, missed ranges, txos, index progress
    pub fn apply(
        &self,
        directory: &MemoryRngDirectory,
        missed: &MemoryMissedRanges,
        index: &MemoryTxOutIndex,
    ) -> Result<SeedSummary> {
        let mut summary = SeedSummary::default();

        for record in &self.rng_records {
            let pubkey = KexRngPubkey {
                public_key: decode_hex("public_key", &record.public_key)?,
                version: record.version,
            };
            directory
                .publish_rng_record(RngRecord::new(
                    record.ingest_invocation_id,
                    pubkey,
                    record.start_block,
                ))
                .map_err(seed_error)?;
            summary.events += 1;
        }

        for blocks in &self.ingested_blocks {
            if blocks.first_block > blocks.last_block {
                return Err(ServerError::InvalidConfig(format!(
                    "seed ingested_blocks for invocation {}: first_block {} > last_block {}",
                    blocks.ingest_invocation_id, blocks.first_block, blocks.last_block
                )));
            }
            for block in blocks.first_block..=blocks.last_block {
                let timestamp = blocks
                    .signature_timestamp
                    .saturating_add(block - blocks.first_block);
                directory
                    .report_ingested_block(blocks.ingest_invocation_id, block, timestamp)
                    .map_err(seed_error)?;
            }
        }

        for d in &self.decommissions {
            directory
                .decommission(d.ingest_invocation_id, d.last_ingested_block)
                .map_err(seed_error)?;
            summary.events += 1;
        }

        for range in &self.missed_ranges {
            missed
                .report_missed(range.first_block, range.last_block)
                .map_err(seed_error)?;
            summary.missed_ranges += 1;
        }

        for txo in &self.txos {
            index.insert(
                decode_hex("search_key", &txo.search_key)?,
                decode_hex("ciphertext", &txo.ciphertext)?,
            );
            summary.txos += 1;
        }

        if let Some(progress) = &self.index_progress {
            index.advance(
                ProcessedBlock::new(progress.block_count, progress.signature_timestamp),
                progress.last_known_block_count.max(progress.block_count),
                progress.cumulative_txo_count,
            );
        }

        tracing::info!(
            events = summary.events,
            missed_ranges = summary.missed_ranges,
            txos = summary.txos,
            "Seed applied"
        );

        Ok(summary)
    }
}
