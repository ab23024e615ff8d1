//! fog-view-client: client side of the incremental balance-discovery protocol
//!
//! [`ViewClient`] moves bytes; [`QuerySession`] owns the cursor pair and
//! everything learned across calls.

pub mod client;
pub mod error;
pub mod session;

pub use client::{HealthInfo, ViewClient};
pub use error::ClientError;
pub use session::{KeyOutcomes, KnownRng, QuerySession, SessionUpdate};
