//! Hands FIFO batches to a consumer and advances only once acknowledged.

use crate::signal::BatchSignal;
use block_queue::BlocksQueue;
use ingest_types::{BatchHandler, IngestConfig, IngestError, Shutdown};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Drives the queue → consumer → acknowledgement loop.
///
/// `run` and `confirm_processed_batch` share one [`BatchSignal`]: the loop
/// waits on it both when the queue is empty (hoping a producer calls
/// [`Self::notify_new_blocks`]) and after handing off a batch, pending
/// acknowledgement. Every wakeup re-checks the actual condition rather than
/// assuming the wakeup means progress — level semantics, no lost wakeups.
/// Nothing upstream of this crate calls `notify_new_blocks` today, so the
/// signal's safety-net tick (see `signal.rs`) is what actually guarantees
/// the loop re-checks `queue` periodically; `notify_new_blocks` only shaves
/// latency off that bound when something does call it.
pub struct BatchIterator<H: BatchHandler> {
    queue: Arc<BlocksQueue>,
    handler: Arc<H>,
    config: IngestConfig,
    signal: BatchSignal,
    awaiting_ack: AtomicBool,
    next_request_id: AtomicU64,
    shutdown: Shutdown,
}

impl<H: BatchHandler> BatchIterator<H> {
    pub fn new(queue: Arc<BlocksQueue>, handler: Arc<H>, config: IngestConfig) -> Self {
        Self {
            queue,
            handler,
            config,
            signal: BatchSignal::new(),
            awaiting_ack: AtomicBool::new(false),
            next_request_id: AtomicU64::new(0),
            shutdown: Shutdown::new(),
        }
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Wakes a waiting iterator after new blocks are enqueued. Harmless
    /// to call when nothing is waiting, or when the iterator is waiting on
    /// an acknowledgement rather than on new data — the next wakeup just
    /// re-checks and goes back to waiting.
    pub fn notify_new_blocks(&self) {
        self.signal.resolve();
    }

    /// Dequeues `hashes` from the queue head and releases the iterator to
    /// fetch its next batch. Must be called with the exact hashes of the
    /// batch most recently handed to [`BatchHandler::handle_batch`].
    pub async fn confirm_processed_batch(&self, hashes: &[String]) -> Result<usize, IngestError> {
        let removed = self.queue.dequeue(hashes).await?;
        self.awaiting_ack.store(false, Ordering::Release);
        self.signal.resolve();
        Ok(removed)
    }

    /// Runs until the shutdown handle is triggered. A `handle_batch` error
    /// is fatal: it propagates without dequeuing, leaving the queue
    /// untouched for the surrounding supervisor to restart against.
    pub async fn run(&self) -> Result<(), IngestError> {
        loop {
            if self.shutdown.is_triggered() {
                return Ok(());
            }

            let batch = self.queue.get_batch_up_to_size(self.config.iterator_batch_bytes).await;
            if batch.is_empty() {
                self.signal.wait().await;
                continue;
            }

            let request_id = self.fresh_request_id();
            tracing::debug!(request_id, batch_len = batch.len(), "handing off batch");
            self.handler.handle_batch(batch, request_id).await?;

            self.awaiting_ack.store(true, Ordering::Release);
            while self.awaiting_ack.load(Ordering::Acquire) {
                if self.shutdown.is_triggered() {
                    return Ok(());
                }
                self.signal.wait().await;
            }
        }
    }

    fn fresh_request_id(&self) -> String {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        format!("req-{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ingest_types::{Block, IngestConfig};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct RecordingHandler {
        seen: StdMutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl BatchHandler for RecordingHandler {
        async fn handle_batch(&self, batch: Vec<Block>, _request_id: String) -> Result<(), IngestError> {
            self.seen.lock().unwrap().push(batch.iter().map(|b| b.hash.clone()).collect());
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_batches_and_advances_on_confirmation() {
        let config = IngestConfig::default()
            .with_max_queue_bytes(1_000_000)
            .with_max_block_height(u64::MAX);
        let config = IngestConfig { iterator_batch_bytes: 150, ..config };
        let queue = Arc::new(BlocksQueue::new(config, -1));
        queue.enqueue(Block::new(0, "a", 100)).await.unwrap();
        queue.enqueue(Block::new(1, "b", 100)).await.unwrap();

        let handler = Arc::new(RecordingHandler { seen: StdMutex::new(Vec::new()) });
        let iterator = Arc::new(BatchIterator::new(queue.clone(), handler.clone(), config));

        let shutdown = iterator.shutdown_handle();
        let run_iterator = iterator.clone();
        let task = tokio::spawn(async move { run_iterator.run().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        {
            let seen = handler.seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0], vec!["a".to_string()]);
        }

        iterator.confirm_processed_batch(&["a".to_string()]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        {
            let seen = handler.seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[1], vec!["b".to_string()]);
        }

        shutdown.trigger();
        iterator.notify_new_blocks();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn waits_for_data_when_queue_is_empty() {
        let config = IngestConfig::default().with_max_queue_bytes(1_000_000);
        let queue = Arc::new(BlocksQueue::new(config, -1));
        let handler = Arc::new(RecordingHandler { seen: StdMutex::new(Vec::new()) });
        let iterator = Arc::new(BatchIterator::new(queue.clone(), handler.clone(), config));

        let shutdown = iterator.shutdown_handle();
        let run_iterator = iterator.clone();
        let task = tokio::spawn(async move { run_iterator.run().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handler.seen.lock().unwrap().is_empty());

        queue.enqueue(Block::new(0, "only", 10)).await.unwrap();
        iterator.notify_new_blocks();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handler.seen.lock().unwrap().len(), 1);

        shutdown.trigger();
        iterator.notify_new_blocks();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn handle_batch_error_is_fatal_and_leaves_queue_untouched() {
        struct FailingHandler;
        #[async_trait]
        impl BatchHandler for FailingHandler {
            async fn handle_batch(&self, _batch: Vec<Block>, _request_id: String) -> Result<(), IngestError> {
                Err(IngestError::Unrecoverable { reason: "boom".into() })
            }
        }

        let config = IngestConfig::default().with_max_queue_bytes(1_000_000);
        let queue = Arc::new(BlocksQueue::new(config, -1));
        queue.enqueue(Block::new(0, "a", 10)).await.unwrap();

        let iterator = BatchIterator::new(queue.clone(), Arc::new(FailingHandler), config);
        let err = iterator.run().await.unwrap_err();
        assert!(matches!(err, IngestError::Unrecoverable { .. }));
        assert_eq!(queue.count().await, 1);
    }
}
