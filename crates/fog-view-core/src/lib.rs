//! fog-view-core: Wire types for incremental, privacy-preserving balance discovery
//!
//! A client holding a private view key asks the view service whether any new
//! outputs are addressed to it. One round trip amortizes three logical
//! requests:
//! - RNG records: key-derivation generators the client combines with its view
//!   key to derive search keys
//! - TxOut search results: one fixed-size outcome per opaque search key
//! - Missed block ranges: blocks the service failed to index, which the client
//!   must scan itself
//!
//! # Privacy & Threat Model
//!
//! ## What the Server Learns
//!
//! | Information | Server Knowledge |
//! |-------------|------------------|
//! | Cursor values (event id, start block) | **YES** - sent in the AAD half |
//! | Whether address context was supplied | **YES** - sent in the AAD half |
//! | Number of search keys | **YES** - request size |
//! | Which search keys matched | NO - outcomes are constant size |
//! | Which outputs belong to the client | NO - search keys are opaque |
//!
//! ## Constant-size outcomes
//!
//! [`TxOutSearchResult`] encodes its result code as a fixed 4-byte field and
//! zero-pads the ciphertext of every non-Found outcome, so `Found` and
//! `NotFound` cannot be told apart by size on the wire.
//!
//! ## Cursors
//!
//! All continuation state lives with the client. The service hands back
//! `next_start_from_user_event_id` and `highest_processed_block_count`; the
//! client passes them as `start_from_user_event_id` and
//! `start_from_block_index` on its next call.

mod block_range;
mod error;
mod events;
mod messages;
mod search;
mod txout_record;

pub use block_range::{coalesce, BlockRange};
pub use error::Error;
pub use events::{DecommissionedIngestInvocation, KexRngPubkey, RngRecord};
pub use messages::{QueryEnvelope, QueryRequest, QueryRequestAad, QueryResponse};
pub use search::{TxOutSearchResult, TxOutSearchResultCode};
pub use txout_record::{TxOutRecord, TXOUT_RECORD_LEN};

pub type Result<T> = std::result::Result<T, Error>;

/// Opaque search key bytes (output of a client-side KexRng)
pub type SearchKey = Vec<u8>;

/// Protocol constants
pub mod constants {
    /// Length of a well-formed search key in bytes
    pub const SEARCH_KEY_LEN: usize = 16;

    /// Length of an address public view key in bytes (compressed ristretto)
    pub const ADDRESS_KEY_LEN: usize = 32;

    /// Default length of an encrypted TxOut record.
    ///
    /// Every search outcome carries exactly this many ciphertext bytes.
    pub const DEFAULT_CIPHERTEXT_LEN: usize = 176;

    /// Version of the binary query envelope
    pub const PROTOCOL_VERSION: u16 = 1;
}
