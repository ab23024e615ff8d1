//! fog-view-server: incremental balance-discovery query service
//!
//! Resolves a client's query (cursor pair plus opaque search keys) against
//! three collaborators: the RNG directory, the missed block range tracker and
//! the TxOut index. See [`Reconciler`] for the cursor rules.

pub mod collaborator;
pub mod config;
pub mod directory;
pub mod error;
pub mod index;
pub mod metrics;
pub mod missed;
pub mod reconciler;
pub mod routes;
pub mod search;
pub mod seed;
pub mod server;
pub mod state;

pub use collaborator::{
    CollaboratorError, EventFilter, IndexBatch, IndexProgress, KeyLookup, MissedRangeTracker,
    ProcessedBlock, RngDirectory, RngEvents, TxOutIndex,
};
pub use config::{MissedRangePolicy, RateLimitConfig, ReconcilerConfig, ServerConfig};
pub use directory::{DirectoryError, MemoryRngDirectory};
pub use error::ServerError;
pub use index::MemoryTxOutIndex;
pub use metrics::init_prometheus_recorder;
pub use missed::MemoryMissedRanges;
pub use reconciler::Reconciler;
pub use routes::{create_router, create_router_with_metrics, HealthResponse};
pub use search::{SearchAdapter, SearchBatch};
pub use seed::{SeedFile, SeedSummary};
pub use server::{ServerBuilder, ViewServer};
pub use state::{create_shared_state, ServerState, SharedState};
