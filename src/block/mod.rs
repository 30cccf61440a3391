//! Block input model
//!
//! A candidate block as handed to the play engine: a header, the previous
//! header, and the ordered raw transactions. The block is immutable for the
//! duration of play; everything the engine derives from it lives in
//! play-scoped state owned by the coordinator.

use serde::{Deserialize, Serialize};

use crate::types::KeyId;

/// Header of a candidate block.
///
/// Only the fields the play engine consumes. Validation of the header itself
/// (signature, position, timestamps) happens before a block reaches play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Canonical position of the block in the chain.
    pub block_id: i64,
    /// Unix timestamp of block production. Seeds per-tx determinism.
    pub timestamp: i64,
    /// Key of the node that generated the block.
    pub generator_key: KeyId,
}

/// A candidate block: header plus ordered raw transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// Header of the parent block; absent only for the first block.
    pub prev: Option<BlockHeader>,
    /// Raw transaction bytes in block order. The order is authoritative.
    pub transactions: Vec<Vec<u8>>,
    /// This node is generating the block (failures tolerated, block may
    /// truncate). When false the block is replayed for validation.
    pub gen_block: bool,
    /// First block of the chain.
    pub is_genesis: bool,
    /// The block signals a system-parameter update. Pre-set by header
    /// parsing; consumed by the log-shipping validation shortcut.
    pub sys_update: bool,
}

impl Block {
    pub fn new(header: BlockHeader, prev: Option<BlockHeader>, transactions: Vec<Vec<u8>>) -> Self {
        Self {
            header,
            prev,
            transactions,
            gen_block: false,
            is_genesis: false,
            sys_update: false,
        }
    }

    pub fn generating(mut self) -> Self {
        self.gen_block = true;
        self
    }

    pub fn genesis(mut self) -> Self {
        self.is_genesis = true;
        self
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}
