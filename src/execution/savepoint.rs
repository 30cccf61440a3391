//! Per-transaction savepoint bracket
//!
//! Every transaction executes inside a savepoint named after its hash, so
//! the name is stable and unique within a block. On success the savepoint is
//! released and the writes fold into the outer transaction; on failure a
//! rollback restores the state to the bracket's start while earlier accepted
//! transactions stay pending.
//!
//! Savepoint operations that themselves fail indicate backend corruption or
//! misuse; callers treat them as fatal to the whole block.

use crate::storage::{PlayStore, StorageResult};
use crate::types::TxHash;

/// Savepoint name for a transaction, stable within block scope.
pub fn savepoint_name(hash: &TxHash) -> String {
    format!("tx-{}", hash.to_hex())
}

/// An established savepoint; must be consumed by [`release`](Self::release)
/// or [`rollback`](Self::rollback).
pub struct TxSavepoint<'a> {
    store: &'a dyn PlayStore,
    name: String,
}

impl<'a> TxSavepoint<'a> {
    pub fn establish(store: &'a dyn PlayStore, hash: &TxHash) -> StorageResult<Self> {
        let name = savepoint_name(hash);
        store.savepoint(&name)?;
        Ok(Self { store, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fold this transaction's writes into the outer transaction.
    pub fn release(self) -> StorageResult<()> {
        self.store.release_savepoint(&self.name)
    }

    /// Discard this transaction's writes.
    pub fn rollback(self) -> StorageResult<()> {
        self.store.rollback_savepoint(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{PlayStore, SledStore, StateTree};

    #[test]
    fn name_is_stable_and_unique_per_hash() {
        let a = TxHash::of(b"a");
        let b = TxHash::of(b"b");
        assert_eq!(savepoint_name(&a), savepoint_name(&a));
        assert_ne!(savepoint_name(&a), savepoint_name(&b));
    }

    #[test]
    fn release_folds_rollback_discards() {
        let store = SledStore::open_temporary().unwrap();
        store.start_transaction().unwrap();

        let kept = TxSavepoint::establish(&store, &TxHash::of(b"kept")).unwrap();
        store.put(StateTree::State, b"kept", b"1").unwrap();
        kept.release().unwrap();

        let dropped = TxSavepoint::establish(&store, &TxHash::of(b"dropped")).unwrap();
        store.put(StateTree::State, b"dropped", b"1").unwrap();
        dropped.rollback().unwrap();

        store.commit().unwrap();
        assert_eq!(
            store.get(StateTree::State, b"kept").unwrap(),
            Some(b"1".to_vec())
        );
        assert_eq!(store.get(StateTree::State, b"dropped").unwrap(), None);
    }
}
