//! Pull loading strategy: periodically preload block metadata, then fetch
//! and enqueue bodies in reply-byte-bounded batches.

use crate::strategy::{LoadingStrategy, SharedProvider};
use async_trait::async_trait;
use block_queue::BlocksQueue;
use ingest_types::{Block, IngestConfig, IngestError, PreloadItem, Shutdown};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reply-byte safety factor: the raw wire size of a block routinely runs
/// well over its reported `total_size` once encoding overhead is counted.
const SAFETY_FACTOR: f64 = 2.1;

pub struct PullStrategy {
    provider: SharedProvider,
    config: IngestConfig,
    shutdown: Shutdown,
    preloaded_items: VecDeque<PreloadItem>,
    max_preload_count: usize,
    last_duration: Option<Duration>,
    previous_duration: Option<Duration>,
}

impl PullStrategy {
    pub fn new(provider: SharedProvider, config: IngestConfig, shutdown: Shutdown) -> Self {
        Self {
            provider,
            max_preload_count: config.base_preload_count.max(1),
            config,
            shutdown,
            preloaded_items: VecDeque::new(),
            last_duration: None,
            previous_duration: None,
        }
    }

    /// Multiplicative increase / multiplicative decrease on observed
    /// end-to-end latency between consecutive `load` calls.
    fn adapt_preload_count(&mut self) {
        let (Some(last), Some(previous)) = (self.last_duration, self.previous_duration) else {
            return;
        };
        if previous.as_secs_f64() <= 0.0 {
            return;
        }
        let ratio = last.as_secs_f64() / previous.as_secs_f64();
        if ratio > 1.2 {
            self.max_preload_count = ((self.max_preload_count as f64) * 1.25).round() as usize;
        } else if ratio < 0.8 {
            self.max_preload_count = (((self.max_preload_count as f64) * 0.75).round() as usize).max(1);
        }
    }

    async fn preload(&mut self, network_height: u64, queue: &Arc<BlocksQueue>) -> Result<(), IngestError> {
        let last_height = queue.last_height().await;
        if last_height >= network_height as i64 {
            return Ok(());
        }

        let start_height = (last_height + 1).max(0) as u64;
        let heights: Vec<u64> = (start_height..=network_height).take(self.max_preload_count).collect();
        if heights.is_empty() {
            return Ok(());
        }

        let stats = self.provider.get_many_blocks_stats_by_heights(&heights).await?;
        for (index, record) in stats.into_iter().enumerate() {
            let hash = record
                .hash
                .ok_or(IngestError::MalformedStats { index, missing_field: "hash" })?;
            let height = record
                .height
                .ok_or(IngestError::MalformedStats { index, missing_field: "height" })?;
            let size = record.total_size.unwrap_or(self.config.initial_block_size);
            self.preloaded_items.push_back(PreloadItem { height, hash, size });
        }

        Ok(())
    }

    /// Takes the longest prefix whose `sum(size) * SAFETY_FACTOR` fits the
    /// reply budget, always taking at least one item regardless of its size.
    fn take_prefix(&mut self) -> Vec<PreloadItem> {
        let budget = self.config.max_rpc_reply_bytes as f64;
        let mut cumulative = 0u64;
        let mut take = 0usize;

        for item in &self.preloaded_items {
            let candidate = cumulative + item.size;
            if take > 0 && (candidate as f64) * SAFETY_FACTOR > budget {
                break;
            }
            cumulative = candidate;
            take += 1;
        }

        self.preloaded_items.drain(..take).collect()
    }

    /// Takes one reply-bounded prefix off `preloaded_items` and enqueues it.
    /// One call makes one batch of progress; the Loader's own tick loop is
    /// what drains `preloaded_items` to empty across repeated calls, so a
    /// single slow fetch never blocks the loop past one reply budget.
    async fn load_and_enqueue(&mut self, queue: &Arc<BlocksQueue>) -> Result<(), IngestError> {
        if self.preloaded_items.is_empty() || queue.is_queue_full().await {
            return Ok(());
        }
        if self.shutdown.is_triggered() {
            return Err(IngestError::Cancelled);
        }

        let prefix = self.take_prefix();
        if prefix.is_empty() {
            return Ok(());
        }
        let heights: Vec<u64> = prefix.iter().map(|item| item.height).collect();

        let mut attempt = 0u32;
        let fetched = loop {
            match self.provider.get_many_blocks_by_heights(&heights, true, false).await {
                Ok(blocks) => break blocks,
                Err(err) if attempt < self.config.loader_max_retries && err.is_retryable() => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "retrying block fetch, no backoff at this layer");
                }
                Err(err) => return Err(err),
            }
        };

        let mut blocks: Vec<Block> = fetched.into_iter().flatten().collect();
        blocks.sort_by_key(|b| b.height);

        for block in blocks {
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
impl LoadingStrategy for PullStrategy {
    async fn load(&mut self, network_height: u64, queue: &Arc<BlocksQueue>) -> Result<(), IngestError> {
        let started = Instant::now();
        self.adapt_preload_count();

        if self.preloaded_items.is_empty() {
            self.preload(network_height, queue).await?;
        }
        self.load_and_enqueue(queue).await?;

        self.previous_duration = self.last_duration.replace(started.elapsed());
        Ok(())
    }

    async fn stop(&mut self) {
        self.preloaded_items.clear();
    }
}
