//! The narrow provider interface the core consumes. Transport, rate
//! limiting, and response normalization live entirely outside this crate;
//! this trait is the whole surface the loading strategies are allowed to
//! depend on.

use crate::block::{Block, BlockStats};
use crate::error::IngestError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A live subscription to new-block notifications, used only by the push
/// loading strategy.
///
/// `receiver` yields blocks as they arrive; dropping the subscription (or
/// calling `unsubscribe`) tears down the underlying transport subscription.
/// Modeled as a channel rather than a callback so the push strategy can
/// `select!` against it alongside cancellation and queue-state checks.
pub struct BlockSubscription {
    pub receiver: mpsc::Receiver<Block>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl BlockSubscription {
    pub fn new(receiver: mpsc::Receiver<Block>, unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Tears down the underlying subscription. Idempotent: a second call is a no-op.
    pub fn unsubscribe(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for BlockSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// The blockchain node capability set consumed by the loader.
///
/// Implementations own RPC/WebSocket transport, rate limiting, and response
/// normalization — none of that is this trait's concern.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Current network tip height.
    async fn get_block_height(&self) -> Result<u64, IngestError>;

    /// Block-size statistics for the given heights. Order is not guaranteed
    /// to match the input; a record may be missing a hash or height, which
    /// the caller treats as malformed.
    async fn get_many_blocks_stats_by_heights(
        &self,
        heights: &[u64],
    ) -> Result<Vec<BlockStats>, IngestError>;

    /// Full blocks for the given heights, order aligned with `heights`; a
    /// `None` entry means the provider had nothing for that height.
    async fn get_many_blocks_by_heights(
        &self,
        heights: &[u64],
        full_transactions: bool,
        verify_merkle: bool,
    ) -> Result<Vec<Option<Block>>, IngestError>;

    /// Subscribes to new-block notifications. Only the push loading
    /// strategy calls this.
    async fn subscribe_to_new_blocks(&self) -> Result<BlockSubscription, IngestError>;
}

/// The consumer-supplied callback invoked by the iterator for each batch.
///
/// On completion the consumer must eventually call
/// `BlocksQueue::dequeue` (via `confirm_processed_batch` on the iterator)
/// with the hashes it intends to retire.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle_batch(&self, batch: Vec<Block>, request_id: String) -> Result<(), IngestError>;
}
