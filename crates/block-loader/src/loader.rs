//! The outer control loop: owns the active strategy's lifecycle and
//! recovers from transient faults with exponential backoff.

use crate::pull::PullStrategy;
use crate::push::PushStrategy;
use crate::strategy::{LoadingStrategy, SharedProvider};
use block_queue::BlocksQueue;
use ingest_types::{IngestConfig, IngestError, LoaderStrategyName, Shutdown};
use std::sync::Arc;
use std::time::Duration;

/// Drives a [`LoadingStrategy`] to completion, restarting it after
/// retryable failures and giving up immediately on unrecoverable ones.
pub struct Loader {
    provider: SharedProvider,
    config: IngestConfig,
    strategy: Box<dyn LoadingStrategy>,
    shutdown: Shutdown,
}

impl Loader {
    pub fn new(provider: SharedProvider, config: IngestConfig) -> Self {
        let shutdown = Shutdown::new();
        let strategy = build_strategy(config.loader_strategy, provider.clone(), config, shutdown.clone());
        Self {
            provider,
            config,
            strategy,
            shutdown,
        }
    }

    /// A cloneable handle to trigger cancellation from outside `run`.
    /// Obtain this before moving `self` into `run` (or a spawned task).
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Runs until `maxBlockHeight` is reached, the shutdown handle is
    /// triggered, or an unrecoverable error occurs. Strategy teardown is
    /// guaranteed on every exit path.
    pub async fn run(mut self, queue: Arc<BlocksQueue>) -> Result<(), IngestError> {
        let mut backoff_ms = self.config.loader_backoff_base_ms;

        loop {
            if self.shutdown.is_triggered() {
                self.strategy.stop().await;
                return Ok(());
            }

            let network_height = match self.provider.get_block_height().await {
                Ok(height) => height,
                Err(err) if err.is_retryable() => {
                    tracing::warn!(error = %err, backoff_ms, "get_block_height failed, backing off");
                    self.sleep_with_backoff(&mut backoff_ms).await;
                    continue;
                }
                Err(err) => {
                    self.strategy.stop().await;
                    return Err(err);
                }
            };

            match self.strategy.load(network_height, &queue).await {
                Ok(()) => {
                    backoff_ms = self.config.loader_backoff_base_ms;

                    if queue.is_max_height_reached().await {
                        self.strategy.stop().await;
                        return Ok(());
                    }

                    tokio::select! {
                        biased;
                        () = self.shutdown.notified() => {
                            self.strategy.stop().await;
                            return Ok(());
                        }
                        () = tokio::time::sleep(Duration::from_millis(self.config.block_time_ms)) => {}
                    }
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(error = %err, backoff_ms, "strategy.load failed, backing off");
                    self.sleep_with_backoff(&mut backoff_ms).await;
                }
                Err(err) => {
                    self.strategy.stop().await;
                    return Err(err);
                }
            }
        }
    }

    async fn sleep_with_backoff(&self, backoff_ms: &mut u64) {
        tokio::select! {
            biased;
            () = self.shutdown.notified() => {}
            () = tokio::time::sleep(Duration::from_millis(*backoff_ms)) => {}
        }
        *backoff_ms = (*backoff_ms * 2).min(self.config.loader_backoff_cap_ms);
    }
}

fn build_strategy(
    name: LoaderStrategyName,
    provider: SharedProvider,
    config: IngestConfig,
    shutdown: Shutdown,
) -> Box<dyn LoadingStrategy> {
    match name {
        LoaderStrategyName::Pull => Box::new(PullStrategy::new(provider, config, shutdown)),
        LoaderStrategyName::Push => Box::new(PushStrategy::new(provider, shutdown)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_types::{Block, BlockStats, BlockSubscription, Provider};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::mpsc;

    struct CountingProvider {
        height: AtomicU64,
    }

    #[async_trait::async_trait]
    impl Provider for CountingProvider {
        async fn get_block_height(&self) -> Result<u64, IngestError> {
            Ok(self.height.load(Ordering::Relaxed))
        }

        async fn get_many_blocks_stats_by_heights(&self, heights: &[u64]) -> Result<Vec<BlockStats>, IngestError> {
            Ok(heights
                .iter()
                .map(|h| BlockStats { hash: Some(format!("h{h}")), height: Some(*h), total_size: Some(10) })
                .collect())
        }

        async fn get_many_blocks_by_heights(
            &self,
            heights: &[u64],
            _full_transactions: bool,
            _verify_merkle: bool,
        ) -> Result<Vec<Option<Block>>, IngestError> {
            Ok(heights.iter().map(|h| Some(Block::new(*h, format!("h{h}"), 10))).collect())
        }

        async fn subscribe_to_new_blocks(&self) -> Result<BlockSubscription, IngestError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(BlockSubscription::new(rx, || {}))
        }
    }

    #[tokio::test]
    async fn stops_cleanly_once_max_height_reached() {
        let provider: SharedProvider = Arc::new(CountingProvider { height: AtomicU64::new(4) });
        let config = IngestConfig::default().with_max_block_height(4).with_max_queue_bytes(10_000_000);
        let queue = Arc::new(BlocksQueue::new(config, -1));
        let loader = Loader::new(provider, config);

        loader.run(queue.clone()).await.unwrap();

        assert_eq!(queue.last_height().await, 4);
    }

    #[tokio::test]
    async fn shutdown_handle_stops_the_loop() {
        let provider: SharedProvider = Arc::new(CountingProvider { height: AtomicU64::new(u64::MAX) });
        let config = IngestConfig::default().with_max_queue_bytes(10_000_000);
        let queue = Arc::new(BlocksQueue::new(config, -1));
        let loader = Loader::new(provider, config);
        let handle = loader.shutdown_handle();

        handle.trigger();
        let result = loader.run(queue).await;
        assert!(result.is_ok());
    }
}
