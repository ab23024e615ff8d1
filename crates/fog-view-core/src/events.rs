//! RNG directory events: new RNG records and decommissioned ingest invocations

use serde::{Deserialize, Serialize};

/// Key-exchange public value a client combines with its view key to build
/// its own search-key generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KexRngPubkey {
    pub public_key: Vec<u8>,
    /// KexRng algorithm version
    pub version: u32,
}

/// A generator descriptor produced by one ingest invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngRecord {
    /// Ingest invocation that produced this record. Matched against
    /// [`DecommissionedIngestInvocation::ingest_invocation_id`].
    pub ingest_invocation_id: i64,
    /// Absent only on records decoded from peers that omitted the field;
    /// reads fall back to [`KexRngPubkey::default`].
    pub pubkey: Option<KexRngPubkey>,
    /// First block the generator is valid from
    pub start_block: u64,
}

impl RngRecord {
    pub fn new(ingest_invocation_id: i64, pubkey: KexRngPubkey, start_block: u64) -> Self {
        Self {
            ingest_invocation_id,
            pubkey: Some(pubkey),
            start_block,
        }
    }

    pub fn has_pubkey(&self) -> bool {
        self.pubkey.is_some()
    }

    pub fn pubkey_or_default(&self) -> KexRngPubkey {
        self.pubkey.clone().unwrap_or_default()
    }
}

/// Retirement marker for an ingest invocation.
///
/// No record or data for `ingest_invocation_id` appears past
/// `last_ingested_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecommissionedIngestInvocation {
    pub ingest_invocation_id: i64,
    /// Inclusive last block the invocation processed
    pub last_ingested_block: u64,
}
