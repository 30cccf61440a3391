//! Post-play bookkeeping records
//!
//! Everything the engine accumulates while a block plays and hands to the
//! after-play hook once all phases are done: the per-transaction log records,
//! rollback records for future chain reorganisation, and the replication
//! log of storage operations.

use serde::{Deserialize, Serialize};

use super::{InvokeStatus, KeyId, TxHash};

/// Log record for one transaction accepted into the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfterTx {
    pub hash: TxHash,
    /// Complete raw bytes of the transaction as carried by the block.
    pub full_data: Vec<u8>,
    pub block_id: i64,
    pub timestamp: i64,
    pub sender: KeyId,
    /// Zero for transactions with no contract backing.
    pub ecosystem_id: i64,
    pub contract_name: String,
    pub invoke_status: InvokeStatus,
    pub result_code: i32,
}

/// Undo record for one storage write, kept for chain reorganisation.
///
/// `prev = None` means the key did not exist before the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub tx_hash: TxHash,
    pub tree: String,
    pub key: Vec<u8>,
    pub prev: Option<Vec<u8>>,
}

/// One replicated storage operation.
///
/// The ordered sequence of these ops is the replication log a follower can
/// apply verbatim to reach the same post-state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinLogOp {
    Put {
        tree: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        tree: String,
        key: Vec<u8>,
    },
}

impl BinLogOp {
    pub fn tree(&self) -> &str {
        match self {
            BinLogOp::Put { tree, .. } | BinLogOp::Delete { tree, .. } => tree,
        }
    }
}

/// Append-only accumulator for post-commit side effects, scoped to one play.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfterTxs {
    /// One record per accepted transaction, in acceptance order.
    pub txs: Vec<AfterTx>,
    /// Rollback records of every accepted transaction, in acceptance order.
    pub rts: Vec<RollbackRecord>,
    /// Replication log of every accepted transaction, in acceptance order.
    pub tx_bin_log: Vec<BinLogOp>,
}

impl AfterTxs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty() && self.rts.is_empty() && self.tx_bin_log.is_empty()
    }
}
