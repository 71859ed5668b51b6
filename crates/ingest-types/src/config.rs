//! Configuration recognized by the ingestion pipeline (spec §6), as a set of
//! plain, serde-friendly structs with `Default` impls and `with_*` builder
//! methods — the convention used throughout this workspace for config types.

use serde::{Deserialize, Serialize};

/// Capacity planner tuning, as spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub min_slots: usize,
    pub max_slots: usize,
    pub min_avg_bytes: u64,
    pub max_avg_bytes: u64,
    pub alpha: f64,
    pub grow_threshold: f64,
    pub shrink_threshold: f64,
    pub resize_cooldown_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_slots: 1,
            max_slots: 100_000,
            min_avg_bytes: 256,
            max_avg_bytes: 65_536,
            alpha: 0.05,
            grow_threshold: 0.30,
            shrink_threshold: 0.40,
            resize_cooldown_ms: 10_000,
        }
    }
}

/// Which loading strategy the loader should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderStrategyName {
    Pull,
    Push,
}

impl Default for LoaderStrategyName {
    fn default() -> Self {
        Self::Pull
    }
}

/// Top-level configuration for the ingestion pipeline, as spec §6.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Hard byte budget for the queue (`maxQueueSize`).
    pub max_queue_bytes: u64,
    /// Initial EMA seed, in bytes (`blockSize`).
    pub initial_block_size: u64,
    /// Terminating height; enqueue beyond this fails.
    pub max_block_height: u64,
    pub planner: PlannerConfig,
    pub loader_strategy: LoaderStrategyName,
    /// Reply-size budget for one fetch (`queueLoaderRequestBlocksBatchSize`).
    pub max_rpc_reply_bytes: u64,
    /// Initial `max_preload_count`.
    pub base_preload_count: usize,
    /// Byte target for iterator batches (`queueIteratorBlocksBatchSize`).
    pub iterator_batch_bytes: u64,
    /// Loader idle delay between polling attempts (`blockTimeMs`).
    pub block_time_ms: u64,
    /// Bounded retries inside the pull strategy's `load_blocks`.
    pub loader_max_retries: u32,
    /// Base delay for the loader's outer exponential backoff.
    pub loader_backoff_base_ms: u64,
    /// Cap for the loader's outer exponential backoff.
    pub loader_backoff_cap_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_queue_bytes: 1_048_576,
            initial_block_size: 1_048_576,
            max_block_height: u64::MAX,
            planner: PlannerConfig::default(),
            loader_strategy: LoaderStrategyName::Pull,
            max_rpc_reply_bytes: 10_000_000,
            base_preload_count: 25,
            iterator_batch_bytes: 1_048_576,
            block_time_ms: 1_000,
            loader_max_retries: 3,
            loader_backoff_base_ms: 500,
            loader_backoff_cap_ms: 30_000,
        }
    }
}

impl IngestConfig {
    pub fn with_max_queue_bytes(mut self, bytes: u64) -> Self {
        self.max_queue_bytes = bytes;
        self
    }

    pub fn with_max_block_height(mut self, height: u64) -> Self {
        self.max_block_height = height;
        self
    }

    pub fn with_planner(mut self, planner: PlannerConfig) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_loader_strategy(mut self, name: LoaderStrategyName) -> Self {
        self.loader_strategy = name;
        self
    }
}
