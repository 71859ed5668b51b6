//! Push loading strategy: one catch-up fetch, then a live subscription.

use crate::strategy::{LoadingStrategy, SharedProvider};
use async_trait::async_trait;
use block_queue::BlocksQueue;
use ingest_types::{Block, IngestError, Shutdown};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct PushStrategy {
    provider: SharedProvider,
    shutdown: Shutdown,
    subscribed: AtomicBool,
}

impl PushStrategy {
    pub fn new(provider: SharedProvider, shutdown: Shutdown) -> Self {
        Self {
            provider,
            shutdown,
            subscribed: AtomicBool::new(false),
        }
    }

    /// Fetches `(lastHeight, networkHeight]` in one batch, sorts descending,
    /// and enqueues by popping from the end — the pop order is ascending.
    async fn catch_up(&self, network_height: u64, queue: &Arc<BlocksQueue>) -> Result<(), IngestError> {
        let last_height = queue.last_height().await;
        if last_height >= network_height as i64 {
            return Ok(());
        }

        let start_height = (last_height + 1).max(0) as u64;
        let heights: Vec<u64> = (start_height..=network_height).collect();
        let fetched = self.provider.get_many_blocks_by_heights(&heights, true, false).await?;

        let mut blocks: Vec<Block> = fetched.into_iter().flatten().collect();
        blocks.sort_by(|a, b| b.height.cmp(&a.height));

        while let Some(block) = blocks.pop() {
            let last_height = queue.last_height().await;
            if (block.height as i64) <= last_height {
                continue;
            }
            queue.enqueue(block).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl LoadingStrategy for PushStrategy {
    async fn load(&mut self, network_height: u64, queue: &Arc<BlocksQueue>) -> Result<(), IngestError> {
        if self.subscribed.swap(true, Ordering::AcqRel) {
            return Err(IngestError::Unrecoverable {
                reason: "push strategy is already subscribed".into(),
            });
        }

        let result = self.run(network_height, queue).await;
        self.subscribed.store(false, Ordering::Release);
        result
    }

    async fn stop(&mut self) {
        self.shutdown.trigger();
    }
}

impl PushStrategy {
    async fn run(&self, network_height: u64, queue: &Arc<BlocksQueue>) -> Result<(), IngestError> {
        self.catch_up(network_height, queue).await?;

        if self.shutdown.is_triggered() {
            return Ok(());
        }

        let mut subscription = self.provider.subscribe_to_new_blocks().await?;
        let result = self.drain(&mut subscription, queue).await;
        subscription.unsubscribe();
        result
    }

    async fn drain(
        &self,
        subscription: &mut ingest_types::BlockSubscription,
        queue: &Arc<BlocksQueue>,
    ) -> Result<(), IngestError> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => return Ok(()),
                maybe_block = subscription.receiver.recv() => {
                    let Some(block) = maybe_block else {
                        return Ok(());
                    };

                    if queue.is_max_height_reached().await {
                        // Silently skip: upstream controller decides whether
                        // to stop the loader, not this strategy.
                        continue;
                    }
                    if queue.is_queue_full().await {
                        return Err(IngestError::QueueFull {
                            count: queue.count().await,
                            capacity: queue.length().await,
                        });
                    }
                    queue.enqueue(block).await?;
                }
            }
        }
    }
}
