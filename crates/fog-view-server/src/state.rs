//! Shared server state

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::collaborator::{MissedRangeTracker, RngDirectory, TxOutIndex};
use crate::config::ServerConfig;
use crate::reconciler::Reconciler;

pub struct ServerState {
    pub reconciler: Reconciler,
    pub config: ServerConfig,
    started_at: Instant,
    queries_served: AtomicU64,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        directory: Arc<dyn RngDirectory>,
        missed: Arc<dyn MissedRangeTracker>,
        index: Arc<dyn TxOutIndex>,
    ) -> Self {
        let reconciler = Reconciler::new(directory, missed, index, config.reconciler.clone());
        Self {
            reconciler,
            config,
            started_at: Instant::now(),
            queries_served: AtomicU64::new(0),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn queries_served(&self) -> u64 {
        self.queries_served.load(Ordering::Relaxed)
    }

    pub(crate) fn count_query(&self) {
        self.queries_served.fetch_add(1, Ordering::Relaxed);
    }
}

pub type SharedState = Arc<ServerState>;

pub fn create_shared_state(
    config: ServerConfig,
    directory: Arc<dyn RngDirectory>,
    missed: Arc<dyn MissedRangeTracker>,
    index: Arc<dyn TxOutIndex>,
) -> SharedState {
    Arc::new(ServerState::new(config, directory, missed, index))
}
