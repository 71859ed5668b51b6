//! The bounded FIFO block queue: a circular buffer of `Option<Block>` plus
//! height/hash indexes, guarded by a single exclusive async lock so every
//! public operation below is linearized with respect to every other.
//!
//! Per spec §9's re-architecture note, the lock is never held across an
//! `.await` — every method here does its work synchronously while holding
//! the guard, then drops it before returning.

use crate::invariants::{
    debug_assert_bounded_occupancy, debug_assert_consecutive_heights, debug_assert_index_consistency,
    debug_assert_resize_preserves_occupancy, debug_assert_within_byte_budget,
};
use crate::planner::{CapacityPlanner, ResizeInputs};
use ingest_types::{Block, IngestConfig, IngestError};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tokio::sync::Mutex;

struct Inner {
    slots: Vec<Option<Block>>,
    head: usize,
    tail: usize,
    count: usize,
    height_index: HashMap<u64, usize>,
    hash_index: HashMap<String, usize>,
    current_bytes: u64,
    last_height: i64,
    max_queue_bytes: u64,
    max_block_height: u64,
    planner: CapacityPlanner,
}

impl Inner {
    fn resize(&mut self, new_capacity: usize) {
        let new_capacity = new_capacity.max(1).max(self.count);
        debug_assert_resize_preserves_occupancy!(new_capacity, self.count);

        let mut new_slots: Vec<Option<Block>> = (0..new_capacity).map(|_| None).collect();
        let mut new_height_index = HashMap::with_capacity(self.count);
        let mut new_hash_index = HashMap::with_capacity(self.count);

        let old_len = self.slots.len();
        for k in 0..self.count {
            let old_idx = (self.head + k) % old_len;
            let block = self.slots[old_idx].take().expect("occupied slot in FIFO range");
            new_height_index.insert(block.height, k);
            new_hash_index.insert(block.hash.clone(), k);
            new_slots[k] = Some(block);
        }

        self.slots = new_slots;
        self.height_index = new_height_index;
        self.hash_index = new_hash_index;
        self.head = 0;
        self.tail = self.count % new_capacity;

        tracing::debug!(new_capacity, count = self.count, "resized block ring");
    }

    fn check_invariants(&self) {
        debug_assert_index_consistency!(self.count, self.height_index.len(), self.hash_index.len());
        debug_assert_bounded_occupancy!(self.count, self.slots.len());
        debug_assert_within_byte_budget!(self.current_bytes, self.max_queue_bytes);
    }
}

/// A bounded, height-monotonic FIFO queue of blocks.
///
/// See the module-level docs and spec §4.2 for the full contract. All
/// methods are `async` only because they acquire the internal lock; none
/// of them ever suspends for any other reason.
pub struct BlocksQueue {
    inner: Mutex<Inner>,
}

impl BlocksQueue {
    /// Creates an empty queue seeded with `initial_last_height` (commonly
    /// `-1` before genesis, or the controller's last-known height after a
    /// restart).
    pub fn new(config: IngestConfig, initial_last_height: i64) -> Self {
        let planner = CapacityPlanner::new(config.planner, config.initial_block_size);
        let initial_capacity = planner
            .desired_slots(config.max_queue_bytes)
            .max(config.planner.min_slots)
            .max(1);

        let slots = (0..initial_capacity).map(|_| None).collect();

        Self {
            inner: Mutex::new(Inner {
                slots,
                head: 0,
                tail: 0,
                count: 0,
                height_index: HashMap::new(),
                hash_index: HashMap::new(),
                current_bytes: 0,
                last_height: initial_last_height,
                max_queue_bytes: config.max_queue_bytes,
                max_block_height: config.max_block_height,
                planner,
            }),
        }
    }

    /// Appends a block at the tail.
    ///
    /// Fails without mutating state on `DuplicateHash`, `NonConsecutiveHeight`,
    /// `MaxHeightReached`, `CapacityExceeded`, or `ByteBudgetExceeded`. The one
    /// exception is `planner.observe`, an idempotent statistical update that
    /// runs before the height/capacity checks and is never rolled back —
    /// it doesn't change queue contents, only the planner's size estimate.
    pub async fn enqueue(&self, mut block: Block) -> Result<(), IngestError> {
        let mut inner = self.inner.lock().await;

        if inner.hash_index.contains_key(&block.hash) {
            return Err(IngestError::DuplicateHash { hash: block.hash });
        }

        inner.planner.observe(block.size);
        let now = Instant::now();
        let decision = inner.planner.should_resize(
            now,
            ResizeInputs {
                max_queue_bytes: inner.max_queue_bytes,
                current_capacity: inner.slots.len(),
                current_count: inner.count,
            },
        );
        if decision.need {
            inner.resize(decision.target_slots);
            inner.planner.mark_resized(now);
        }

        let expected_height = inner.last_height + 1;
        if block.height as i64 != expected_height {
            return Err(IngestError::NonConsecutiveHeight {
                block_height: block.height,
                queue_last_height: inner.last_height,
            });
        }

        if inner.last_height >= 0 && inner.last_height as u64 >= inner.max_block_height {
            return Err(IngestError::MaxHeightReached {
                max_height: inner.max_block_height,
            });
        }

        if inner.count == inner.slots.len() {
            // Emergency grow: absorb startup bursts before the EMA stabilizes.
            let desired = inner.planner.desired_slots(inner.max_queue_bytes);
            let doubled = (inner.slots.len() * 2).min(100_000);
            let target = (inner.count + 1).max(desired).max(doubled);
            if target > inner.slots.len() {
                tracing::debug!(target, "emergency grow to absorb burst");
                inner.resize(target);
            }
            if inner.count == inner.slots.len() {
                return Err(IngestError::CapacityExceeded {
                    count: inner.count,
                    capacity: inner.slots.len(),
                    desired_slots: desired,
                });
            }
        }

        if inner.current_bytes + block.size > inner.max_queue_bytes {
            return Err(IngestError::ByteBudgetExceeded {
                current_bytes: inner.current_bytes,
                incoming_bytes: block.size,
                max_bytes: inner.max_queue_bytes,
            });
        }

        block.strip_hex_payload();

        let slot = inner.tail;
        let height = block.height;
        let hash = block.hash.clone();
        let size = block.size;
        let capacity = inner.slots.len();

        inner.slots[slot] = Some(block);
        inner.height_index.insert(height, slot);
        inner.hash_index.insert(hash, slot);
        inner.tail = (inner.tail + 1) % capacity;
        inner.count += 1;
        inner.current_bytes += size;

        debug_assert_consecutive_heights!(inner.last_height.max(-1), height as i64);
        inner.last_height = height as i64;

        inner.check_invariants();
        Ok(())
    }

    /// Dequeues the given hashes from the head, in the given order.
    ///
    /// Each hash must currently sit at the head slot — this is the strict
    /// FIFO guarantee: callers dequeue only prefixes they've already
    /// acknowledged via the iterator. Returns the count removed.
    ///
    /// If a later hash in the list fails the head check, hashes already
    /// dequeued earlier in the same call remain dequeued: they were
    /// legitimately at the head when processed, and the queue is never left
    /// with a gap or a duplicate as a result.
    pub async fn dequeue(&self, hashes: &[String]) -> Result<usize, IngestError> {
        let mut inner = self.inner.lock().await;
        let mut removed = 0usize;

        for hash in hashes {
            let slot = *inner
                .hash_index
                .get(hash)
                .ok_or_else(|| IngestError::NotFound { hash: hash.clone() })?;

            if slot != inner.head {
                let head_hash = inner.slots[inner.head].as_ref().map(|b| b.hash.clone());
                return Err(IngestError::NotAtHead {
                    hash: hash.clone(),
                    head_hash,
                });
            }

            let capacity = inner.slots.len();
            let block = inner.slots[inner.head].take().expect("head slot occupied");
            inner.height_index.remove(&block.height);
            inner.hash_index.remove(&block.hash);
            inner.current_bytes -= block.size;
            inner.head = (inner.head + 1) % capacity;
            inner.count -= 1;
            removed += 1;
        }

        inner.check_invariants();
        tracing::debug!(removed, "dequeued blocks from head");
        Ok(removed)
    }

    /// Returns a clone of the head block, or `None` if empty.
    ///
    /// Rust's borrow rules don't let a returned reference outlive the async
    /// lock guard, so this (and `fetch_by_height`/`find_by_hashes`) clones
    /// rather than exposing the stored instance by reference.
    pub async fn first_block(&self) -> Option<Block> {
        let inner = self.inner.lock().await;
        if inner.count == 0 {
            None
        } else {
            inner.slots[inner.head].clone()
        }
    }

    /// Returns a clone of the block at `height`, if stored.
    pub async fn fetch_by_height(&self, height: u64) -> Option<Block> {
        let inner = self.inner.lock().await;
        let slot = *inner.height_index.get(&height)?;
        inner.slots[slot].clone()
    }

    /// Returns clones of every stored block whose hash is in `hashes`.
    pub async fn find_by_hashes(&self, hashes: &HashSet<String>) -> Vec<Block> {
        let inner = self.inner.lock().await;
        hashes
            .iter()
            .filter_map(|h| inner.hash_index.get(h).and_then(|&slot| inner.slots[slot].clone()))
            .collect()
    }

    /// Returns the longest FIFO prefix whose cumulative size is `<= max_bytes`.
    ///
    /// Always returns at least one block if the queue is non-empty — the
    /// forward progress guarantee: an oversized head block is still
    /// returned alone rather than starving the consumer.
    pub async fn get_batch_up_to_size(&self, max_bytes: u64) -> Vec<Block> {
        let inner = self.inner.lock().await;
        let mut batch = Vec::new();
        let mut cumulative = 0u64;
        let capacity = inner.slots.len();

        for k in 0..inner.count {
            let idx = (inner.head + k) % capacity;
            let block = inner.slots[idx].as_ref().expect("block in FIFO range");
            if !batch.is_empty() && cumulative + block.size > max_bytes {
                break;
            }
            cumulative += block.size;
            batch.push(block.clone());
        }

        batch
    }

    /// Empties the queue, retaining `last_height` and ring capacity.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        self.clear_locked(&mut inner);
    }

    /// Clears all state and overwrites `last_height`, as signaled by a
    /// chain reorganization.
    pub async fn reorganize(&self, new_last_height: i64) {
        let mut inner = self.inner.lock().await;
        self.clear_locked(&mut inner);
        inner.last_height = new_last_height;
        tracing::warn!(new_last_height, "queue reorganized");
    }

    fn clear_locked(&self, inner: &mut Inner) {
        for slot in &mut inner.slots {
            *slot = None;
        }
        inner.height_index.clear();
        inner.hash_index.clear();
        inner.head = 0;
        inner.tail = 0;
        inner.count = 0;
        inner.current_bytes = 0;
    }

    /// `true` when the byte budget is fully used.
    pub async fn is_queue_full(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.current_bytes >= inner.max_queue_bytes
    }

    /// `true` if `extra_bytes` more would push the queue over its byte budget.
    pub async fn is_queue_overloaded(&self, extra_bytes: u64) -> bool {
        let inner = self.inner.lock().await;
        inner.current_bytes + extra_bytes > inner.max_queue_bytes
    }

    /// `true` once `last_height` has reached the configured max.
    pub async fn is_max_height_reached(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.last_height >= 0 && inner.last_height as u64 >= inner.max_block_height
    }

    pub async fn length(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    pub async fn count(&self) -> usize {
        self.inner.lock().await.count
    }

    pub async fn current_bytes(&self) -> u64 {
        self.inner.lock().await.current_bytes
    }

    pub async fn last_height(&self) -> i64 {
        self.inner.lock().await.last_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_types::PlannerConfig;

    fn config(max_queue_bytes: u64, block_size: u64, min_slots: usize) -> IngestConfig {
        IngestConfig::default()
            .with_max_queue_bytes(max_queue_bytes)
            .with_planner(PlannerConfig {
                min_slots,
                ..PlannerConfig::default()
            })
    }

    #[tokio::test]
    async fn basic_lifecycle() {
        let queue = BlocksQueue::new(config(1_048_576, 1_048_576, 2), -1);
        queue.enqueue(Block::new(0, "h0", 100)).await.unwrap();

        assert_eq!(queue.length().await, 1);
        assert_eq!(queue.current_bytes().await, 100);
        assert!(!queue.is_queue_full().await);

        let removed = queue.dequeue(&["h0".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(queue.first_block().await.is_none());
        assert_eq!(queue.count().await, 0);
    }

    #[tokio::test]
    async fn height_sequence_enforcement() {
        let queue = BlocksQueue::new(config(1_048_576, 1_048_576, 2), -1);
        let err = queue.enqueue(Block::new(1, "h1", 100)).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Block height: 1, Queue last height: -1"
        );
        assert_eq!(queue.count().await, 0);
    }

    #[tokio::test]
    async fn wrap_around_fifo() {
        let queue = BlocksQueue::new(config(8 * 1024 * 1024, 1024, 1), -1);

        queue.enqueue(Block::new(0, "a", 512)).await.unwrap();
        queue.enqueue(Block::new(1, "b", 512)).await.unwrap();
        assert_eq!(queue.dequeue(&["a".to_string()]).await.unwrap(), 1);
        queue.enqueue(Block::new(2, "c", 512)).await.unwrap();
        assert_eq!(queue.dequeue(&["b".to_string()]).await.unwrap(), 1);
        assert_eq!(queue.dequeue(&["c".to_string()]).await.unwrap(), 1);

        assert_eq!(queue.count().await, 0);
        assert_eq!(queue.current_bytes().await, 0);
    }

    #[tokio::test]
    async fn duplicate_hash_is_rejected() {
        let queue = BlocksQueue::new(config(1_048_576, 1024, 2), -1);
        queue.enqueue(Block::new(0, "h0", 100)).await.unwrap();
        let err = queue.enqueue(Block::new(1, "h0", 100)).await.unwrap_err();
        assert!(matches!(err, IngestError::DuplicateHash { .. }));
    }

    #[tokio::test]
    async fn dequeue_rejects_non_head_hash() {
        let queue = BlocksQueue::new(config(1_048_576, 1024, 2), -1);
        queue.enqueue(Block::new(0, "a", 100)).await.unwrap();
        queue.enqueue(Block::new(1, "b", 100)).await.unwrap();

        let err = queue.dequeue(&["b".to_string()]).await.unwrap_err();
        assert!(matches!(err, IngestError::NotAtHead { .. }));
    }

    #[tokio::test]
    async fn batch_forward_progress_on_oversized_head() {
        let queue = BlocksQueue::new(config(1_048_576, 100, 2), -1);
        queue.enqueue(Block::new(0, "a", 5_000)).await.unwrap();
        queue.enqueue(Block::new(1, "b", 10)).await.unwrap();

        let batch = queue.get_batch_up_to_size(1).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].hash, "a");
    }

    #[tokio::test]
    async fn reorganize_clears_and_overwrites_last_height() {
        let queue = BlocksQueue::new(config(1_048_576, 1024, 2), -1);
        queue.enqueue(Block::new(0, "a", 100)).await.unwrap();
        queue.enqueue(Block::new(1, "b", 100)).await.unwrap();

        queue.reorganize(5).await;

        assert_eq!(queue.count().await, 0);
        assert_eq!(queue.last_height().await, 5);

        queue.enqueue(Block::new(6, "c", 100)).await.unwrap();
        assert_eq!(queue.count().await, 1);
    }

    #[tokio::test]
    async fn clear_retains_last_height() {
        let queue = BlocksQueue::new(config(1_048_576, 1024, 2), -1);
        queue.enqueue(Block::new(0, "a", 100)).await.unwrap();
        queue.clear().await;

        assert_eq!(queue.count().await, 0);
        assert_eq!(queue.last_height().await, 0);
    }

    #[tokio::test]
    async fn byte_budget_is_enforced() {
        let queue = BlocksQueue::new(config(150, 1024, 2), -1);
        queue.enqueue(Block::new(0, "a", 100)).await.unwrap();
        let err = queue.enqueue(Block::new(1, "b", 100)).await.unwrap_err();
        assert!(matches!(err, IngestError::ByteBudgetExceeded { .. }));
    }

    #[tokio::test]
    async fn find_by_hashes_returns_intersection() {
        let queue = BlocksQueue::new(config(1_048_576, 1024, 2), -1);
        queue.enqueue(Block::new(0, "a", 10)).await.unwrap();
        queue.enqueue(Block::new(1, "b", 10)).await.unwrap();

        let mut wanted = HashSet::new();
        wanted.insert("a".to_string());
        wanted.insert("zzz".to_string());

        let found = queue.find_by_hashes(&wanted).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].hash, "a");
    }
}
