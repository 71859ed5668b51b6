//! Runs the ingestion pipeline end to end against an in-memory mock chain.
//!
//! By default the pipeline pulls blocks by polling the mock provider's
//! stats/fetch endpoints. Pass `--push` to drive the same pipeline off the
//! provider's block-subscription stream instead.
//!
//! Run with: `cargo run -p ingest-demo --bin demo`
//! Or:       `cargo run -p ingest-demo --bin demo -- --push`

use async_trait::async_trait;
use block_ingest::{
    BatchHandler, Block, BlockStats, BlockSubscription, IngestConfig, IngestError,
    LoaderStrategyName, Pipeline, Provider,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const STARTING_NETWORK_HEIGHT: u64 = 40;
const GROWTH_INTERVAL: Duration = Duration::from_millis(400);
const RUN_FOR: Duration = Duration::from_secs(6);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let push = std::env::args().any(|a| a == "--push");
    println!("=== block-ingest demo ({}) ===\n", if push { "push" } else { "pull" });

    let provider = MockProvider::new(STARTING_NETWORK_HEIGHT);
    tokio::spawn(provider.clone().grow_forever());

    let (handoff_tx, handoff_rx) = mpsc::unbounded_channel();
    let handler = Arc::new(PrintingHandler::new(handoff_tx));

    let strategy = if push { LoaderStrategyName::Push } else { LoaderStrategyName::Pull };
    let config = IngestConfig::default()
        .with_max_queue_bytes(256 * 1024)
        .with_loader_strategy(strategy);

    let pipeline = Pipeline::new(config, Arc::new(provider), handler, -1);
    let shutdown = pipeline.shutdown_handle();
    let iterator = pipeline.iterator().clone();

    let confirmer = tokio::spawn(confirm_batches(iterator, handoff_rx));

    println!("Running for {RUN_FOR:?}...\n");
    let run_task = tokio::spawn(pipeline.run());
    tokio::time::sleep(RUN_FOR).await;

    println!("\nTriggering shutdown...");
    shutdown.trigger();

    match run_task.await? {
        Ok(()) => println!("Pipeline stopped cleanly."),
        Err(e) => println!("Pipeline stopped with error: {e}"),
    }

    drop(confirmer);
    println!("=== demo complete ===");
    Ok(())
}

/// Forwards acknowledged batches from the handler back to the iterator.
///
/// `handle_batch` can't call `confirm_processed_batch` itself — it only sees
/// the blocks, not the iterator that handed them out — so the real
/// acknowledgement happens here, on the receiving end of the channel the
/// handler reports into. A production consumer would ack after it has
/// durably recorded the batch; here that's simulated by the channel send.
async fn confirm_batches(
    iterator: Arc<block_ingest::BatchIterator<PrintingHandler>>,
    mut handoff_rx: mpsc::UnboundedReceiver<Vec<String>>,
) {
    while let Some(hashes) = handoff_rx.recv().await {
        if let Err(e) = iterator.confirm_processed_batch(&hashes).await {
            tracing::warn!(error = %e, "failed to confirm batch");
        }
    }
}

/// Prints each batch it receives and hands its hashes off for acknowledgement.
struct PrintingHandler {
    handoff: mpsc::UnboundedSender<Vec<String>>,
}

impl PrintingHandler {
    fn new(handoff: mpsc::UnboundedSender<Vec<String>>) -> Self {
        Self { handoff }
    }
}

#[async_trait]
impl BatchHandler for PrintingHandler {
    async fn handle_batch(&self, batch: Vec<Block>, request_id: String) -> Result<(), IngestError> {
        let heights: Vec<u64> = batch.iter().map(|b| b.height).collect();
        println!("  [{request_id}] delivered {} block(s): heights {heights:?}", batch.len());

        let hashes = batch.into_iter().map(|b| b.hash).collect();
        let _ = self.handoff.send(hashes);
        Ok(())
    }
}

/// An in-memory chain that grows over time and can be polled or subscribed to.
#[derive(Clone)]
struct MockProvider(Arc<ProviderState>);

struct ProviderState {
    network_height: AtomicU64,
}

impl MockProvider {
    fn new(start_height: u64) -> Self {
        Self(Arc::new(ProviderState {
            network_height: AtomicU64::new(start_height),
        }))
    }

    /// Advances the chain tip on an interval, simulating new blocks arriving
    /// while the pipeline is ingesting.
    async fn grow_forever(self) {
        let mut tick = tokio::time::interval(GROWTH_INTERVAL);
        loop {
            tick.tick().await;
            self.0.network_height.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn block_at(height: u64) -> Block {
        let mut block = Block::new(height, format!("0x{height:016x}"), Self::size_at(height));
        block.transactions = Vec::new();
        block
    }

    fn size_at(height: u64) -> u64 {
        4_096 + (height % 7) * 1_024
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn get_block_height(&self) -> Result<u64, IngestError> {
        Ok(self.0.network_height.load(Ordering::Relaxed))
    }

    async fn get_many_blocks_stats_by_heights(
        &self,
        heights: &[u64],
    ) -> Result<Vec<BlockStats>, IngestError> {
        Ok(heights
            .iter()
            .map(|&height| BlockStats {
                hash: Some(format!("0x{height:016x}")),
                height: Some(height),
                total_size: Some(Self::size_at(height)),
            })
            .collect())
    }

    async fn get_many_blocks_by_heights(
        &self,
        heights: &[u64],
        _full_transactions: bool,
        _verify_merkle: bool,
    ) -> Result<Vec<Option<Block>>, IngestError> {
        Ok(heights.iter().map(|&height| Some(Self::block_at(height))).collect())
    }

    async fn subscribe_to_new_blocks(&self) -> Result<BlockSubscription, IngestError> {
        let (tx, rx) = mpsc::channel(64);
        let state = self.0.clone();
        let mut last_sent = state.network_height.load(Ordering::Relaxed);

        tokio::spawn(async move {
            let mut poll = tokio::time::interval(Duration::from_millis(100));
            loop {
                poll.tick().await;
                let current = state.network_height.load(Ordering::Relaxed);
                while last_sent < current {
                    last_sent += 1;
                    if tx.send(MockProvider::block_at(last_sent)).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(BlockSubscription::new(rx, || {}))
    }
}
