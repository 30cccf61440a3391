//! Block execution pipeline
//!
//! This module is the ONLY entry point for applying candidate blocks to
//! persistent state.
//!
//! # Architecture
//!
//! ```text
//! BlockPlayer::play(block)
//!     │
//!     ├── start outer transaction
//!     ├── classify transactions by kind, group by disjoint accounts
//!     ├── preload unspent outputs for every referenced key
//!     ├── phases (strict order):
//!     │     stop-network        serial
//!     │     genesis             serial (sole content of a genesis block)
//!     │     delay               serial
//!     │     transfer-self       account-disjoint groups, parallel
//!     │     utxo ∪ contracts    account-disjoint groups, parallel
//!     │         per tx: savepoint → bind context → runtime play
//!     │                 → fold or roll back just that transaction
//!     ├── after-play aggregation
//!     └── commit / rollback, then notification dispatch
//! ```
//!
//! # Invariants
//!
//! - A block commits completely or not at all; a failed transaction never
//!   leaves partial writes behind its savepoint
//! - Group account sets are pairwise disjoint within a phase
//! - Identical inputs produce identical bookkeeping on every node
//! - Notifications leave the node only after a successful commit

pub mod classifier;
pub mod errors;
pub mod executor;
pub mod savepoint;
mod serial;

use crate::block::Block;
use crate::storage::{OutputsMap, PlayStore, StorageResult};
use crate::types::{AfterTxs, KeyId, TxHash};

pub use classifier::{classify, group_disjoint, ClassifiedTxs, GroupLabel};
pub use errors::{CompositeError, PlayError};
pub use executor::{BlockPlayer, PlayEnv, PlayOutcome};
pub use savepoint::{savepoint_name, TxSavepoint};

// =============================================================================
// COLLABORATOR SEAMS
// =============================================================================
// The engine drives these; their implementations live elsewhere in the node.
// =============================================================================

/// Side channel recording rejected transactions and offender keys.
pub trait TxStatusSink: Send + Sync {
    /// Record a transaction as bad, with the failure message.
    fn mark_transaction_bad(&self, hash: TxHash, reason: &str) -> StorageResult<()>;

    /// Register a key whose contract-backed transaction failed during block
    /// generation, for administrative banning.
    fn bad_tx_for_ban(&self, key: KeyId) -> StorageResult<()>;
}

/// Why the node is being asked to pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    NetworkStopping,
}

/// Node lifecycle control.
pub trait NodeControl: Send + Sync {
    fn pause_activity(&self, reason: PauseReason);
}

/// System-parameter cache refresh.
pub trait SysParams: Send + Sync {
    fn sys_update(&self, store: &dyn PlayStore) -> StorageResult<()>;
}

/// Chain-level persistence hooks invoked around commit.
pub trait ChainHooks: Send + Sync {
    /// Persist the block's bookkeeping into the node's side tables and make
    /// the final outputs map durable (see
    /// [`flush_outputs_map`](crate::storage::flush_outputs_map)). Runs
    /// exactly once per play, after all phases, inside the outer transaction.
    fn after_play_txs(
        &self,
        store: &dyn PlayStore,
        afters: &AfterTxs,
        outputs: &OutputsMap,
    ) -> StorageResult<()>;

    /// Persist the block itself before the outer commit.
    fn insert_into_blockchain(
        &self,
        store: &dyn PlayStore,
        block: &Block,
        afters: &AfterTxs,
    ) -> StorageResult<()>;
}
