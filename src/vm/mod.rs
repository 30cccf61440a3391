//! Contract runtime seam
//!
//! The engine does not execute contracts; it binds each transaction to an
//! execution context and hands it to a [`ContractVm`]. The runtime reads and
//! writes state exclusively through the context's store handle, inside the
//! savepoint the executor established, and reports its results through the
//! context's output fields.

use thiserror::Error;

use crate::block::BlockHeader;
use crate::events::NotificationQueue;
use crate::storage::{OutputsMap, PlayStore, SpentInfo, StorageError, TxOutput};
use crate::transaction::Transaction;
use crate::types::InvokeStatus;

/// Message of the runtime's per-transaction execution deadline. Kept stable:
/// the executor recognizes the deadline by this text when errors arrive
/// wrapped.
pub const VM_TIME_LIMIT_MSG: &str = "contract execution time limit exceeded";

#[derive(Error, Debug)]
pub enum VmError {
    /// An authorized stop-network transaction executed. The node must pause.
    #[error("network stop requested")]
    NetworkStopping,

    /// The runtime's per-transaction execution deadline fired.
    #[error("{}", VM_TIME_LIMIT_MSG)]
    TimeLimit,

    /// The contract rejected the transaction (revert, failed condition,
    /// bad signature discovered during execution).
    #[error("contract error: {0}")]
    Contract(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Everything a transaction execution may see and everything it reports
/// back, bound together for one `play` call.
pub struct TxContext<'a> {
    pub tx: &'a Transaction,
    pub store: &'a dyn PlayStore,
    pub header: &'a BlockHeader,
    pub prev: Option<&'a BlockHeader>,
    /// The block is being generated locally.
    pub gen_block: bool,
    /// Savepoint bracketing this execution; the runtime may pass it to
    /// nested storage helpers but must not release or roll it back.
    pub savepoint: String,
    /// Deterministic RNG seed for this transaction.
    pub seed: [u8; 32],
    /// Unspent-output view for every key the block references.
    pub outputs: &'a OutputsMap,

    // ---- populated by the runtime ------------------------------------------
    pub result_code: i32,
    pub invoke_status: InvokeStatus,
    pub fuel_used: u64,
    /// The transaction changed system parameters; the engine refreshes the
    /// parameter cache independently of the transaction's fate.
    pub sys_update: bool,
    pub notifications: NotificationQueue,
    /// Output rows this transaction consumed (UTXO kinds).
    pub tx_inputs: Vec<SpentInfo>,
    /// Outputs this transaction created (UTXO kinds), in index order.
    pub tx_outputs: Vec<TxOutput>,
}

impl<'a> TxContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn bind(
        tx: &'a Transaction,
        store: &'a dyn PlayStore,
        header: &'a BlockHeader,
        prev: Option<&'a BlockHeader>,
        gen_block: bool,
        savepoint: String,
        seed: [u8; 32],
        outputs: &'a OutputsMap,
    ) -> Self {
        Self {
            tx,
            store,
            header,
            prev,
            gen_block,
            savepoint,
            seed,
            outputs,
            result_code: 0,
            invoke_status: InvokeStatus::Success,
            fuel_used: 0,
            sys_update: false,
            notifications: NotificationQueue::new(),
            tx_inputs: Vec::new(),
            tx_outputs: Vec::new(),
        }
    }
}

/// The contract runtime. Executions may block; the engine bounds them with
/// its limits and the runtime's own deadline.
pub trait ContractVm: Send + Sync {
    fn play(&self, ctx: &mut TxContext<'_>) -> Result<(), VmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_limit_error_carries_the_stable_message() {
        assert_eq!(VmError::TimeLimit.to_string(), VM_TIME_LIMIT_MSG);
    }

    #[test]
    fn wrapped_time_limit_is_still_recognizable() {
        let wrapped = VmError::Contract(format!("call stack: {}", VmError::TimeLimit));
        assert!(wrapped.to_string().contains(VM_TIME_LIMIT_MSG));
    }
}
