//! Shared types for the block ingestion pipeline.
//!
//! This crate has no I/O and no concurrency of its own: it is the contract
//! `block-queue`, `block-loader`, and `block-iterator` all compile against.

mod block;
mod config;
mod error;
mod provider;
mod shutdown;

pub use block::{Block, BlockStats, PreloadItem, Transaction};
pub use config::{IngestConfig, LoaderStrategyName, PlannerConfig};
pub use error::IngestError;
pub use provider::{BatchHandler, BlockSubscription, Provider};
pub use shutdown::Shutdown;
