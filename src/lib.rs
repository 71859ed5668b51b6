//! Block ingestion pipeline: a bounded, memory-budgeted queue fed by a
//! pull or push loading strategy and drained by a batch iterator.
//!
//! This crate is a thin facade: it re-exports the four component crates
//! and wires them into one [`Pipeline`] for the common case of "run a
//! loader and an iterator against one queue until told to stop".
//!
//! # Example
//!
//! ```ignore
//! use block_ingest::{IngestConfig, Pipeline};
//! use std::sync::Arc;
//!
//! let config = IngestConfig::default();
//! let pipeline = Pipeline::new(config, provider, handler);
//! let handle = pipeline.shutdown_handle();
//! pipeline.run().await?;
//! ```

pub use block_iterator::BatchIterator;
pub use block_loader::{Loader, LoadingStrategy, PullStrategy, PushStrategy};
pub use block_queue::{BlocksQueue, CapacityPlanner};
pub use ingest_types::{
    BatchHandler, Block, BlockStats, BlockSubscription, IngestConfig, IngestError, LoaderStrategyName,
    PlannerConfig, PreloadItem, Provider, Shutdown, Transaction,
};

use std::sync::Arc;

/// Wires a [`BlocksQueue`], a [`Loader`], and a [`BatchIterator`] together
/// and runs the loader and iterator concurrently until either exits.
pub struct Pipeline<H: BatchHandler + 'static> {
    queue: Arc<BlocksQueue>,
    loader: Loader,
    iterator: Arc<BatchIterator<H>>,
}

impl<H: BatchHandler + 'static> Pipeline<H> {
    pub fn new(config: IngestConfig, provider: Arc<dyn Provider>, handler: Arc<H>, initial_last_height: i64) -> Self {
        let queue = Arc::new(BlocksQueue::new(config, initial_last_height));
        let loader = Loader::new(provider, config);
        let iterator = Arc::new(BatchIterator::new(queue.clone(), handler, config));

        Self { queue, loader, iterator }
    }

    pub fn queue(&self) -> &Arc<BlocksQueue> {
        &self.queue
    }

    pub fn iterator(&self) -> &Arc<BatchIterator<H>> {
        &self.iterator
    }

    /// A cloneable signal that stops both the loader loop and the iterator
    /// loop. Obtain it before calling `run`.
    pub fn shutdown_handle(&self) -> PipelineShutdown {
        PipelineShutdown {
            loader: self.loader.shutdown_handle(),
            iterator: self.iterator.shutdown_handle(),
        }
    }

    /// Runs the loader and iterator concurrently, returning once both have
    /// exited. An error from either side is surfaced; the other side is
    /// asked to stop before returning.
    pub async fn run(self) -> Result<(), IngestError> {
        let Self { queue, loader, iterator } = self;
        let iterator_shutdown = iterator.shutdown_handle();
        let loader_shutdown = loader.shutdown_handle();

        let loader_task = tokio::spawn(async move { loader.run(queue).await });
        let iterator_task = tokio::spawn(async move { iterator.run().await });

        tokio::select! {
            result = loader_task => {
                iterator_shutdown.trigger();
                let _ = iterator_task.await;
                result.map_err(|e| IngestError::Unrecoverable { reason: e.to_string() })?
            }
            result = iterator_task => {
                loader_shutdown.trigger();
                let _ = loader_task.await;
                result.map_err(|e| IngestError::Unrecoverable { reason: e.to_string() })?
            }
        }
    }
}

/// Cancels both halves of a running [`Pipeline`].
pub struct PipelineShutdown {
    loader: Shutdown,
    iterator: Shutdown,
}

impl PipelineShutdown {
    pub fn trigger(&self) {
        self.loader.trigger();
        self.iterator.trigger();
    }
}
