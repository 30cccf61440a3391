//! # Block-Play Engine
//!
//! Deterministic application of candidate blocks to persistent state: given a
//! block (header plus ordered transactions), play every transaction under a
//! single outer database transaction and either commit the block durably or
//! roll everything back, with precise bookkeeping of what was rejected and
//! why.
//!
//! The engine guarantees:
//!
//! - **Atomicity** - a block's writes become visible all at once or not at
//!   all, with per-transaction savepoints isolating failures
//! - **Safe parallelism** - transactions touching provably disjoint accounts
//!   execute in concurrent groups
//! - **Two modes** - generating a new block tolerates transaction failures;
//!   validating a received block aborts on the first one
//! - **Determinism** - identical inputs yield identical post-state and
//!   bookkeeping on every honest node
//!
//! Consensus, gossip, pool admission, signature verification and the
//! contract runtime itself live behind seams; see [`execution`] and [`vm`].

pub mod block;
pub mod config;
pub mod events;
pub mod execution;
pub mod random;
pub mod resources;
pub mod storage;
pub mod transaction;
pub mod types;
pub mod vm;

// Re-export the engine surface
pub use block::{Block, BlockHeader};
pub use config::{BlockSyncMethod, PlayConfig};
pub use events::{Notification, NotificationQueue, NotificationTransport};
pub use execution::{
    classify, group_disjoint, BlockPlayer, ChainHooks, ClassifiedTxs, CompositeError, GroupLabel,
    NodeControl, PauseReason, PlayEnv, PlayError, PlayOutcome, SysParams, TxStatusSink,
};
pub use random::SeedSource;
pub use resources::{LimitMode, LimitParams, LimitVerdict, Limits, TxCost};
pub use storage::{
    insert_tx_outputs, put_all_outputs_map, unspent_of, update_tx_inputs, OutputsMap, PlayStore,
    SledStore, SpentInfo, StateTree, StorageError, TxOutput,
};
pub use transaction::{Transaction, TxEnvelope, UnmarshalError};
pub use types::{AfterTx, AfterTxs, BinLogOp, InvokeStatus, KeyId, RollbackRecord, TxHash, TxKind};
pub use vm::{ContractVm, TxContext, VmError, VM_TIME_LIMIT_MSG};
