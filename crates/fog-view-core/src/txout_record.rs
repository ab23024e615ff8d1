//! Decrypted payload of a Found search result
//!
//! The ingest side encrypts one `TxOutRecord` per output it can attribute to a
//! search key. All integer fields are fixed 64-bit so every record, and hence
//! every ciphertext, has the same length.
//!
//! ## Format (128 bytes, little-endian)
//! ```text
//! amount_commitment:32 | amount_masked_value:8 | target_key:32 |
//! public_key:32 | global_index:8 | block_index:8 | timestamp:8
//! ```

use crate::{Error, Result};

/// Encoded size of a [`TxOutRecord`]
pub const TXOUT_RECORD_LEN: usize = 32 + 8 + 32 + 32 + 8 + 8 + 8;

/// Timestamp value for blocks that carry none (e.g. the origin block)
const NO_TIMESTAMP: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutRecord {
    /// Compressed amount commitment
    pub amount_commitment: [u8; 32],
    pub amount_masked_value: u64,
    pub target_key: [u8; 32],
    pub public_key: [u8; 32],
    /// Index of the output among all outputs on the chain
    pub global_index: u64,
    pub block_index: u64,
    /// Seconds since the Unix epoch; best effort and not monotonic
    pub timestamp: u64,
}

impl TxOutRecord {
    pub fn has_timestamp(&self) -> bool {
        self.timestamp != NO_TIMESTAMP
    }

    pub fn to_bytes(&self) -> [u8; TXOUT_RECORD_LEN] {
        let mut out = [0u8; TXOUT_RECORD_LEN];
        let mut offset = 0;
        for field in [
            &self.amount_commitment[..],
            &self.amount_masked_value.to_le_bytes()[..],
            &self.target_key[..],
            &self.public_key[..],
            &self.global_index.to_le_bytes()[..],
            &self.block_index.to_le_bytes()[..],
            &self.timestamp.to_le_bytes()[..],
        ] {
            out[offset..offset + field.len()].copy_from_slice(field);
            offset += field.len();
        }
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != TXOUT_RECORD_LEN {
            return Err(Error::InvalidLength {
                what: "TxOut record",
                expected: TXOUT_RECORD_LEN,
                actual: data.len(),
            });
        }

        let key = |offset: usize| -> [u8; 32] {
            let mut out = [0u8; 32];
            out.copy_from_slice(&data[offset..offset + 32]);
            out
        };
        let word = |offset: usize| -> u64 {
            let mut out = [0u8; 8];
            out.copy_from_slice(&data[offset..offset + 8]);
            u64::from_le_bytes(out)
        };

        Ok(Self {
            amount_commitment: key(0),
            amount_masked_value: word(32),
            target_key: key(40),
            public_key: key(72),
            global_index: word(104),
            block_index: word(112),
            timestamp: word(120),
        })
    }
}
