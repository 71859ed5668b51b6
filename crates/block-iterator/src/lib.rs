//! Hands size-bounded FIFO batches from a [`block_queue::BlocksQueue`] to a
//! consumer, advancing only once the consumer acknowledges each batch.

mod batch;
mod signal;

pub use batch::BatchIterator;
