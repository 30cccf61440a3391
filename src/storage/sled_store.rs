//! Sled-based PlayStore implementation
//!
//! The backend keeps committed state in sled trees and buffers the open
//! transaction in memory as a stack of write layers: the bottom layer is the
//! outer transaction, each savepoint pushes a named layer on top. Reads fall
//! through the stack before touching the trees, so contracts observe their
//! own pending writes. Rolling a savepoint back drops its layer; releasing it
//! folds the layer into its parent; committing folds everything into per-tree
//! batches and applies them.
//!
//! Do not rely on sled-specific features beyond basic KV + batches.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use sled::{Batch, Db, Tree};

use super::{keys, PlayStore, SpentInfo, StateTree, StorageError, StorageResult};
use crate::types::{BinLogOp, KeyId, RollbackRecord, TxHash};

// Tree names come from StateTree::as_str and are protocol: changing them
// breaks existing databases.

/// One scope of pending writes: the outer transaction (unnamed) or a
/// savepoint (named).
struct WriteLayer {
    name: Option<String>,
    /// `None` value = pending delete.
    writes: HashMap<(StateTree, Vec<u8>), Option<Vec<u8>>>,
    /// Pre-images of keys first written in this layer, in write order.
    undo: Vec<(StateTree, Vec<u8>, Option<Vec<u8>>)>,
    /// Replication log of this layer, in write order.
    ops: Vec<BinLogOp>,
}

impl WriteLayer {
    fn new(name: Option<String>) -> Self {
        Self {
            name,
            writes: HashMap::new(),
            undo: Vec::new(),
            ops: Vec::new(),
        }
    }
}

/// The open outer transaction.
struct TxState {
    layers: Vec<WriteLayer>,
}

impl TxState {
    fn new() -> Self {
        Self {
            layers: vec![WriteLayer::new(None)],
        }
    }

    fn lookup(&self, tree: StateTree, key: &[u8]) -> Option<Option<Vec<u8>>> {
        let probe = (tree, key.to_vec());
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.writes.get(&probe).cloned())
    }

    fn top(&mut self) -> &mut WriteLayer {
        // A TxState always holds at least the base layer.
        self.layers.last_mut().unwrap()
    }

    /// Index of the topmost layer carrying this savepoint name.
    fn find(&self, name: &str) -> Option<usize> {
        self.layers
            .iter()
            .rposition(|layer| layer.name.as_deref() == Some(name))
    }

    fn top_contains(&self, probe: &(StateTree, Vec<u8>)) -> bool {
        self.layers
            .last()
            .map_or(false, |layer| layer.writes.contains_key(probe))
    }
}

/// Sled-backed [`PlayStore`].
pub struct SledStore {
    _db: Db,
    state: Tree,
    outputs: Tree,
    meta: Tree,
    tx: Mutex<Option<TxState>>,
    // Keeps a temporary database directory alive for the store's lifetime.
    _temp: Option<tempfile::TempDir>,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let depth = self
            .tx
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|tx| tx.layers.len()));
        f.debug_struct("SledStore")
            .field("tx_layers", &depth)
            .finish_non_exhaustive()
    }
}

impl SledStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path).map_err(|e| StorageError::Database(e.to_string()))?;
        Self::from_db(db, None)
    }

    /// Open a store in a throwaway temporary directory.
    pub fn open_temporary() -> StorageResult<Self> {
        let temp = tempfile::tempdir().map_err(|e| StorageError::Database(e.to_string()))?;
        let db = sled::open(temp.path()).map_err(|e| StorageError::Database(e.to_string()))?;
        Self::from_db(db, Some(temp))
    }

    fn from_db(db: Db, temp: Option<tempfile::TempDir>) -> StorageResult<Self> {
        let open = |name: &str, db: &Db| {
            db.open_tree(name)
                .map_err(|e| StorageError::Database(e.to_string()))
        };
        let state = open(StateTree::State.as_str(), &db)?;
        let outputs = open(StateTree::Outputs.as_str(), &db)?;
        let meta = open(StateTree::Meta.as_str(), &db)?;
        Ok(Self {
            state,
            outputs,
            meta,
            _db: db,
            tx: Mutex::new(None),
            _temp: temp,
        })
    }

    fn tree(&self, tree: StateTree) -> &Tree {
        match tree {
            StateTree::State => &self.state,
            StateTree::Outputs => &self.outputs,
            StateTree::Meta => &self.meta,
        }
    }

    fn tree_get(&self, tree: StateTree, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.tree(tree)
            .get(key)
            .map(|v| v.map(|ivec| ivec.to_vec()))
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Value visible at the top of the stack, pre-images included.
    fn visible(&self, tx: &TxState, tree: StateTree, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match tx.lookup(tree, key) {
            Some(pending) => Ok(pending),
            None => self.tree_get(tree, key),
        }
    }

    fn write(
        &self,
        tree: StateTree,
        key: &[u8],
        value: Option<Vec<u8>>,
    ) -> StorageResult<()> {
        let mut guard = self.tx.lock().map_err(|_| poisoned())?;
        let tx = guard.as_mut().ok_or(StorageError::NoActiveTransaction)?;

        let probe = (tree, key.to_vec());
        if !tx.top_contains(&probe) {
            let prev = self.visible(tx, tree, key)?;
            tx.top().undo.push((tree, key.to_vec(), prev));
        }
        let op = match &value {
            Some(v) => BinLogOp::Put {
                tree: tree.as_str().to_string(),
                key: key.to_vec(),
                value: v.clone(),
            },
            None => BinLogOp::Delete {
                tree: tree.as_str().to_string(),
                key: key.to_vec(),
            },
        };
        let top = tx.top();
        top.ops.push(op);
        top.writes.insert(probe, value);
        Ok(())
    }

    /// Insert a committed output row directly, outside any transaction.
    ///
    /// Setup path for genesis funding and tests; block play itself only
    /// touches outputs through the outer transaction.
    pub fn insert_output_row(&self, row: &SpentInfo) -> StorageResult<()> {
        let bytes =
            bincode::serialize(row).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.outputs
            .insert(
                keys::output_key(row.owner, &row.output_tx_hash, row.output_index),
                bytes,
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }
}

fn poisoned() -> StorageError {
    StorageError::Database("store mutex poisoned".to_string())
}

impl PlayStore for SledStore {
    // =========================================================================
    // Transaction lifecycle
    // =========================================================================

    fn start_transaction(&self) -> StorageResult<()> {
        let mut guard = self.tx.lock().map_err(|_| poisoned())?;
        if guard.is_some() {
            return Err(StorageError::TransactionAlreadyActive);
        }
        *guard = Some(TxState::new());
        Ok(())
    }

    fn commit(&self) -> StorageResult<()> {
        let tx = {
            let mut guard = self.tx.lock().map_err(|_| poisoned())?;
            guard.take().ok_or(StorageError::NoActiveTransaction)?
        };

        // Fold the stack bottom-up; later layers win.
        let mut folded: HashMap<(StateTree, Vec<u8>), Option<Vec<u8>>> = HashMap::new();
        for layer in tx.layers {
            folded.extend(layer.writes);
        }

        let mut batches: HashMap<StateTree, Batch> = HashMap::new();
        for ((tree, key), value) in folded {
            let batch = batches.entry(tree).or_default();
            match value {
                Some(v) => batch.insert(key, v),
                None => batch.remove(key),
            }
        }
        for (tree, batch) in batches {
            self.tree(tree)
                .apply_batch(batch)
                .map_err(|e| StorageError::Database(e.to_string()))?;
        }
        Ok(())
    }

    fn rollback(&self) -> StorageResult<()> {
        let mut guard = self.tx.lock().map_err(|_| poisoned())?;
        guard.take().ok_or(StorageError::NoActiveTransaction)?;
        Ok(())
    }

    fn savepoint(&self, name: &str) -> StorageResult<()> {
        let mut guard = self.tx.lock().map_err(|_| poisoned())?;
        let tx = guard.as_mut().ok_or(StorageError::NoActiveTransaction)?;
        tx.layers.push(WriteLayer::new(Some(name.to_string())));
        Ok(())
    }

    fn release_savepoint(&self, name: &str) -> StorageResult<()> {
        let mut guard = self.tx.lock().map_err(|_| poisoned())?;
        let tx = guard.as_mut().ok_or(StorageError::NoActiveTransaction)?;
        let idx = tx
            .find(name)
            .ok_or_else(|| StorageError::SavepointMissing(name.to_string()))?;

        // Releasing a savepoint folds it (and any nested savepoints above it)
        // into the enclosing scope, preserving write order in undo and ops.
        let released: Vec<WriteLayer> = tx.layers.drain(idx..).collect();
        let parent = tx.top();
        for layer in released {
            parent.writes.extend(layer.writes);
            parent.undo.extend(layer.undo);
            parent.ops.extend(layer.ops);
        }
        Ok(())
    }

    fn rollback_savepoint(&self, name: &str) -> StorageResult<()> {
        let mut guard = self.tx.lock().map_err(|_| poisoned())?;
        let tx = guard.as_mut().ok_or(StorageError::NoActiveTransaction)?;
        let idx = tx
            .find(name)
            .ok_or_else(|| StorageError::SavepointMissing(name.to_string()))?;
        tx.layers.truncate(idx);
        Ok(())
    }

    // =========================================================================
    // State access
    // =========================================================================

    fn get(&self, tree: StateTree, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let guard = self.tx.lock().map_err(|_| poisoned())?;
        match guard.as_ref() {
            Some(tx) => self.visible(tx, tree, key),
            None => self.tree_get(tree, key),
        }
    }

    fn put(&self, tree: StateTree, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.write(tree, key, Some(value.to_vec()))
    }

    fn delete(&self, tree: StateTree, key: &[u8]) -> StorageResult<()> {
        self.write(tree, key, None)
    }

    // =========================================================================
    // Block-play specific queries
    // =========================================================================

    fn get_tx_outputs(&self, key_ids: &[KeyId]) -> StorageResult<Vec<SpentInfo>> {
        let mut ids: Vec<KeyId> = key_ids.to_vec();
        ids.sort();
        ids.dedup();

        let mut rows = Vec::new();
        for id in ids {
            for entry in self.outputs.scan_prefix(keys::outputs_prefix(id)) {
                let (_, bytes) = entry.map_err(|e| StorageError::Database(e.to_string()))?;
                let row: SpentInfo = bincode::deserialize(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                if !row.is_spent() {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }

    fn take_bin_log(&self) -> StorageResult<Vec<BinLogOp>> {
        let mut guard = self.tx.lock().map_err(|_| poisoned())?;
        let tx = guard.as_mut().ok_or(StorageError::NoActiveTransaction)?;
        Ok(std::mem::take(&mut tx.top().ops))
    }

    fn take_rollback_records(&self, tx_hash: &TxHash) -> StorageResult<Vec<RollbackRecord>> {
        let mut guard = self.tx.lock().map_err(|_| poisoned())?;
        let tx = guard.as_mut().ok_or(StorageError::NoActiveTransaction)?;
        Ok(std::mem::take(&mut tx.top().undo)
            .into_iter()
            .map(|(tree, key, prev)| RollbackRecord {
                tx_hash: *tx_hash,
                tree: tree.as_str().to_string(),
                key,
                prev,
            })
            .collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
