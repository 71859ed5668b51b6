//! The block type the rest of the pipeline treats as opaque payload.

use serde::{Deserialize, Serialize};

/// A block as seen by the ingestion pipeline.
///
/// Only `height`, `hash`, and `size` are meaningful to [`crate::error`] and to
/// `block-queue`'s ordering/indexing logic. `transactions` and `full_hex` are
/// opaque payload carried through for the downstream consumer; the queue's
/// only interaction with them is [`Block::strip_hex_payload`], called once
/// before storage to drop large transient hex data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Strictly non-negative, strictly consecutive within a queue instance.
    pub height: u64,
    /// Stable identifier, unique within a queue instance.
    pub hash: String,
    /// Size in bytes, as reported or measured by the provider layer.
    pub size: u64,
    /// Opaque payload: transactions carried for the downstream consumer.
    pub transactions: Vec<Transaction>,
    /// Large raw hex encoding of the full block, if the provider included one.
    /// Cleared by [`Block::strip_hex_payload`] before the block is stored.
    pub full_hex: Option<String>,
}

/// A transaction within a [`Block`]. Opaque to the queue except for its hex payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    /// Raw hex encoding of the transaction. Cleared before storage.
    pub hex: Option<String>,
}

impl Block {
    /// Creates a minimal block with no transactions and no hex payload.
    ///
    /// Convenient for tests and for providers that never report full hex data.
    pub fn new(height: u64, hash: impl Into<String>, size: u64) -> Self {
        Self {
            height,
            hash: hash.into(),
            size,
            transactions: Vec::new(),
            full_hex: None,
        }
    }

    /// Drops large transient hex payload on the block and its transactions.
    ///
    /// Called once by `block-queue` before a block is stored, to reduce the
    /// queue's memory footprint. Idempotent.
    pub fn strip_hex_payload(&mut self) {
        self.full_hex = None;
        for tx in &mut self.transactions {
            tx.hex = None;
        }
    }
}

/// Lightweight descriptor staged by the pull loading strategy before the
/// full block body is fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadItem {
    pub height: u64,
    pub hash: String,
    /// Estimated size in bytes: `total_size` if the provider reported one,
    /// otherwise the configured default block size.
    pub size: u64,
}

/// A single record returned by the provider's block-stats API.
///
/// `total_size` and `height` are optional on the wire; a record missing
/// either a hash or a height is rejected by the pull strategy with
/// [`crate::error::IngestError::MalformedStats`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockStats {
    pub hash: Option<String>,
    pub height: Option<u64>,
    pub total_size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_hex_payload_clears_block_and_transactions() {
        let mut block = Block {
            height: 1,
            hash: "h1".into(),
            size: 100,
            transactions: vec![Transaction {
                hash: "t1".into(),
                hex: Some("deadbeef".into()),
            }],
            full_hex: Some("cafebabe".into()),
        };

        block.strip_hex_payload();

        assert!(block.full_hex.is_none());
        assert!(block.transactions[0].hex.is_none());
    }
}
