//! The loading-strategy seam the outer [`crate::Loader`] drives.

use async_trait::async_trait;
use block_queue::BlocksQueue;
use ingest_types::{IngestError, Provider};
use std::sync::Arc;

/// One pass of driving the queue forward, and a way to tear down any
/// in-flight work. The `Loader` owns exactly one of these at a time.
#[async_trait]
pub trait LoadingStrategy: Send {
    /// Advances the queue as far as possible given the current network tip.
    /// Returns once there's nothing more to do for this call — the caller
    /// decides whether and when to call again.
    async fn load(&mut self, network_height: u64, queue: &Arc<BlocksQueue>) -> Result<(), IngestError>;

    /// Tears down any strategy-owned resources (preload queue, subscription).
    /// Called both on normal stop and before the loader retries after an error.
    async fn stop(&mut self);
}

/// Shared provider handle threaded through both strategies.
pub(crate) type SharedProvider = Arc<dyn Provider>;
