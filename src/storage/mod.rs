//! Storage layer for block play
//!
//! All persistence goes through the [`PlayStore`] trait. The engine never
//! talks to a database backend directly.
//!
//! # Data Model Invariants
//!
//! These invariants are NON-NEGOTIABLE. Any PR violating them is rejected.
//!
//! 1. **State writes only occur inside an open transaction** - between
//!    `start_transaction` and `commit`/`rollback`. There is no autocommit.
//!
//! 2. **Savepoints bracket exactly one transaction's writes** - after
//!    `savepoint(n)` … `rollback_savepoint(n)` the state observable through
//!    the store is identical to the state at the `savepoint(n)` call, while
//!    writes made before the savepoint stay pending.
//!
//! 3. **Reads observe pending writes** - a contract that wrote a key inside
//!    the open transaction reads its own value back, committed or not.
//!
//! 4. **Rollback restores exact pre-transaction state** - `rollback` leaves
//!    the backend as if `start_transaction` had never been called.
//!
//! 5. **The replication log mirrors accepted writes only** - operations of a
//!    rolled-back savepoint never reach the bin log.
//!
//! # Design Principles
//!
//! - Callers MUST NOT know which database backend is used
//! - Key encoding is protocol - see `keys.rs`
//! - Types are canonical - no ad-hoc types cross the storage boundary

pub mod keys;
pub mod sled_store;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{BinLogOp, KeyId, RollbackRecord, TxHash};

pub use sled_store::SledStore;

/// Storage error taxonomy. Every variant is fatal to the block being played.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("no active transaction")]
    NoActiveTransaction,

    #[error("transaction already active")]
    TransactionAlreadyActive,

    #[error("unknown savepoint: {0}")]
    SavepointMissing(String),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Named keyspaces of the store.
///
/// The closed set keeps tree names protocol instead of stringly-typed call
/// sites; backends map each to a physical tree/table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateTree {
    /// Contract-visible state.
    State,
    /// Unspent output rows.
    Outputs,
    /// Engine metadata.
    Meta,
}

impl StateTree {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateTree::State => "state",
            StateTree::Outputs => "outputs",
            StateTree::Meta => "meta",
        }
    }
}

impl fmt::Display for StateTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One output row: an amount owned by a key, spendable until marked spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentInfo {
    /// Transaction that created the output.
    pub output_tx_hash: TxHash,
    /// Index of the output within that transaction.
    pub output_index: u32,
    pub owner: KeyId,
    pub amount: u64,
    /// Transaction that consumed the output, if any.
    pub spent_by: Option<TxHash>,
}

impl SpentInfo {
    pub fn is_spent(&self) -> bool {
        self.spent_by.is_some()
    }
}

/// Output produced by a transaction, before it is assigned an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub recipient: KeyId,
    pub amount: u64,
}

/// In-memory ledger of output rows for every key referenced by the block
/// being played.
///
/// Invariant: at every observable moment the map reflects exactly the set of
/// transactions accepted into the in-progress block so far.
pub type OutputsMap = HashMap<KeyId, Vec<SpentInfo>>;

/// Seed an outputs map from preloaded rows.
pub fn put_all_outputs_map(rows: Vec<SpentInfo>, map: &mut OutputsMap) {
    for row in rows {
        map.entry(row.owner).or_default().push(row);
    }
}

/// Mark the given inputs as spent by `tx_hash`.
///
/// Rows are matched by (creating tx, index); rows not present in the map are
/// ignored, matching the preload contract that the map covers every key the
/// block references.
pub fn update_tx_inputs(tx_hash: &TxHash, inputs: &[SpentInfo], map: &mut OutputsMap) {
    for input in inputs {
        if let Some(rows) = map.get_mut(&input.owner) {
            for row in rows.iter_mut() {
                if row.output_tx_hash == input.output_tx_hash
                    && row.output_index == input.output_index
                    && !row.is_spent()
                {
                    row.spent_by = Some(*tx_hash);
                }
            }
        }
    }
}

/// Append the outputs created by `tx_hash`, indexed in order.
pub fn insert_tx_outputs(tx_hash: &TxHash, outputs: &[TxOutput], map: &mut OutputsMap) {
    for (index, out) in outputs.iter().enumerate() {
        map.entry(out.recipient).or_default().push(SpentInfo {
            output_tx_hash: *tx_hash,
            output_index: index as u32,
            owner: out.recipient,
            amount: out.amount,
            spent_by: None,
        });
    }
}

/// Unspent rows of one key, in row order.
pub fn unspent_of(map: &OutputsMap, key: KeyId) -> Vec<&SpentInfo> {
    map.get(&key)
        .map(|rows| rows.iter().filter(|r| !r.is_spent()).collect())
        .unwrap_or_default()
}

/// Write every row of the map through the store, in key order.
///
/// The after-play hook receives the block's final outputs map and calls this
/// inside the outer transaction, so spends and new outputs become durable at
/// commit and the next block's preload reads them back.
pub fn flush_outputs_map(store: &dyn PlayStore, map: &OutputsMap) -> StorageResult<()> {
    let mut keys: Vec<_> = map.keys().copied().collect();
    keys.sort();
    for key in keys {
        for row in &map[&key] {
            let bytes = bincode::serialize(row)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            store.put(
                StateTree::Outputs,
                &keys::output_key(row.owner, &row.output_tx_hash, row.output_index),
                &bytes,
            )?;
        }
    }
    Ok(())
}

/// Database capabilities the play engine consumes.
///
/// The backend must provide an outer transaction with named savepoints.
/// Savepoint failures indicate backend corruption or misuse and abort the
/// whole block.
pub trait PlayStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Transaction lifecycle
    // -------------------------------------------------------------------------

    fn start_transaction(&self) -> StorageResult<()>;
    fn commit(&self) -> StorageResult<()>;
    fn rollback(&self) -> StorageResult<()>;

    fn savepoint(&self, name: &str) -> StorageResult<()>;
    /// Fold the savepoint's writes into the enclosing scope.
    fn release_savepoint(&self, name: &str) -> StorageResult<()>;
    /// Discard every write made since the savepoint.
    fn rollback_savepoint(&self, name: &str) -> StorageResult<()>;

    // -------------------------------------------------------------------------
    // State access (reads observe pending writes)
    // -------------------------------------------------------------------------

    fn get(&self, tree: StateTree, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;
    fn put(&self, tree: StateTree, key: &[u8], value: &[u8]) -> StorageResult<()>;
    fn delete(&self, tree: StateTree, key: &[u8]) -> StorageResult<()>;

    // -------------------------------------------------------------------------
    // Block-play specific queries
    // -------------------------------------------------------------------------

    /// Committed unspent output rows of the given keys, in key order.
    fn get_tx_outputs(&self, key_ids: &[KeyId]) -> StorageResult<Vec<SpentInfo>>;

    /// Drain the replication log of the current savepoint scope.
    fn take_bin_log(&self) -> StorageResult<Vec<BinLogOp>>;

    /// Drain the undo records of the current savepoint scope, attributed to
    /// the given transaction.
    fn take_rollback_records(&self, tx_hash: &TxHash) -> StorageResult<Vec<RollbackRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(owner: i64, tx: &[u8], index: u32, amount: u64) -> SpentInfo {
        SpentInfo {
            output_tx_hash: TxHash::of(tx),
            output_index: index,
            owner: KeyId(owner),
            amount,
            spent_by: None,
        }
    }

    #[test]
    fn put_all_groups_rows_by_owner() {
        let mut map = OutputsMap::new();
        put_all_outputs_map(
            vec![row(1, b"a", 0, 10), row(2, b"b", 0, 20), row(1, b"c", 0, 30)],
            &mut map,
        );
        assert_eq!(map[&KeyId(1)].len(), 2);
        assert_eq!(map[&KeyId(2)].len(), 1);
    }

    #[test]
    fn update_inputs_marks_exactly_the_matched_rows() {
        let mut map = OutputsMap::new();
        put_all_outputs_map(vec![row(1, b"a", 0, 10), row(1, b"a", 1, 20)], &mut map);

        let spender = TxHash::of(b"spender");
        update_tx_inputs(&spender, &[row(1, b"a", 0, 10)], &mut map);

        assert_eq!(map[&KeyId(1)][0].spent_by, Some(spender));
        assert_eq!(map[&KeyId(1)][1].spent_by, None);
    }

    #[test]
    fn insert_outputs_appends_indexed_unspent_rows() {
        let mut map = OutputsMap::new();
        let tx = TxHash::of(b"t");
        insert_tx_outputs(
            &tx,
            &[
                TxOutput { recipient: KeyId(5), amount: 7 },
                TxOutput { recipient: KeyId(6), amount: 8 },
            ],
            &mut map,
        );
        assert_eq!(map[&KeyId(5)][0].output_index, 0);
        assert_eq!(map[&KeyId(6)][0].output_index, 1);
        assert_eq!(unspent_of(&map, KeyId(5)).len(), 1);
    }

    /// A row spent once stays spent: re-marking cannot reassign the spender.
    #[test]
    fn invariant_spent_rows_keep_their_spender() {
        let mut map = OutputsMap::new();
        put_all_outputs_map(vec![row(1, b"a", 0, 10)], &mut map);

        let first = TxHash::of(b"first");
        let second = TxHash::of(b"second");
        update_tx_inputs(&first, &[row(1, b"a", 0, 10)], &mut map);
        update_tx_inputs(&second, &[row(1, b"a", 0, 10)], &mut map);

        assert_eq!(map[&KeyId(1)][0].spent_by, Some(first));
    }
}
