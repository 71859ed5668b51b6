//! Property-based tests checking `BlocksQueue` against a naive `VecDeque`
//! model under random enqueue/dequeue sequences.
//!
//! Coverage:
//! - FIFO order matches a reference model regardless of ring resizes
//! - `find_by_hashes` always matches a plain set intersection

use block_queue::BlocksQueue;
use ingest_types::{Block, IngestConfig, PlannerConfig};
use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};

fn run<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(fut)
}

#[derive(Debug, Clone)]
enum Op {
    Enqueue { size: u64 },
    Dequeue,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..500).prop_map(|size| Op::Enqueue { size }),
        Just(Op::Dequeue),
    ]
}

proptest! {
    /// Randomized enqueue/dequeue sequence matches a `VecDeque` reference
    /// model's FIFO order, even as resizes happen along the way.
    #[test]
    fn fifo_matches_reference_model(ops in prop::collection::vec(op_strategy(), 0..200)) {
        run(async {
            let config = IngestConfig::default()
                .with_max_queue_bytes(1_000_000)
                .with_planner(PlannerConfig {
                    min_slots: 2,
                    max_slots: 64,
                    resize_cooldown_ms: 0,
                    ..PlannerConfig::default()
                });
            let queue = BlocksQueue::new(config, -1);
            let mut model: VecDeque<(u64, String, u64)> = VecDeque::new();
            let mut next_height = 0u64;
            let mut model_bytes = 0u64;

            for op in ops {
                match op {
                    Op::Enqueue { size } => {
                        if model_bytes + size > 1_000_000 {
                            continue;
                        }
                        let hash = format!("h{next_height}");
                        let block = Block::new(next_height, hash.clone(), size);
                        if queue.enqueue(block).await.is_ok() {
                            model.push_back((next_height, hash, size));
                            model_bytes += size;
                            next_height += 1;
                        }
                    }
                    Op::Dequeue => {
                        if let Some((_, hash, size)) = model.front().cloned() {
                            let removed = queue.dequeue(&[hash]).await.unwrap();
                            prop_assert_eq!(removed, 1);
                            model.pop_front();
                            model_bytes -= size;
                        }
                    }
                }
            }

            prop_assert_eq!(queue.count().await, model.len());
            if let Some((height, hash, _)) = model.front() {
                let first = queue.first_block().await.unwrap();
                prop_assert_eq!(&first.hash, hash);
                prop_assert_eq!(first.height, *height);
            } else {
                prop_assert!(queue.first_block().await.is_none());
            }
            Ok(())
        })?;
    }

    /// `find_by_hashes` always matches a plain `HashSet` intersection against
    /// what's actually stored.
    #[test]
    fn find_by_hashes_matches_intersection(
        count in 0usize..30,
        queried in prop::collection::hash_set(0usize..40, 0..20),
    ) {
        run(async {
            let config = IngestConfig::default().with_max_queue_bytes(10_000_000);
            let queue = BlocksQueue::new(config, -1);
            for i in 0..count as u64 {
                queue.enqueue(Block::new(i, format!("h{i}"), 10)).await.unwrap();
            }

            let wanted: HashSet<String> = queried.iter().map(|i| format!("h{i}")).collect();
            let found = queue.find_by_hashes(&wanted).await;
            let found_hashes: HashSet<String> = found.iter().map(|b| b.hash.clone()).collect();

            let expected: HashSet<String> = (0..count as u64)
                .map(|i| format!("h{i}"))
                .filter(|h| wanted.contains(h))
                .collect();

            prop_assert_eq!(found_hashes, expected);
            Ok(())
        })?;
    }
}
