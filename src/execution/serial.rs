//! Serial executor
//!
//! Runs one ordered group of transactions. Parallel groups all funnel through
//! here; the play-state mutex is held for the whole group, serialising access
//! to the shared outer transaction (savepoint scopes must not interleave)
//! while groups overlap on their non-storage work.
//!
//! Per-transaction protocol: charge limits, establish the savepoint, bind the
//! execution context, invoke the runtime, then either fold the writes and
//! bookkeeping into the group's output or roll back exactly this transaction
//! and record the failure according to the block's mode.
//!
//! Bookkeeping accumulates per group and is merged by the coordinator in a
//! deterministic order, so identical inputs yield identical records no matter
//! how the fan-out was scheduled.

use std::sync::Mutex;

use tracing::{debug, warn};

use super::errors::PlayError;
use super::executor::PlayState;
use super::savepoint::TxSavepoint;
use super::{PauseReason, PlayEnv};
use crate::block::Block;
use crate::events::NotificationQueue;
use crate::random::SeedSource;
use crate::resources::{LimitVerdict, TxCost};
use crate::storage::{insert_tx_outputs, update_tx_inputs};
use crate::transaction::Transaction;
use crate::types::{AfterTx, AfterTxs};
use crate::vm::{TxContext, VmError, VM_TIME_LIMIT_MSG};

/// Bookkeeping produced by one group run.
#[derive(Debug, Default)]
pub(crate) struct GroupOutput {
    pub afters: AfterTxs,
    pub processed: Vec<Vec<u8>>,
    pub notifications: Vec<NotificationQueue>,
}

/// Result of one group run. The output is kept even when the group failed,
/// so the coordinator can tell an all-rejected block from a partially-played
/// one.
pub(crate) struct GroupRun {
    pub output: GroupOutput,
    pub error: Option<PlayError>,
}

pub(crate) fn execute_group(
    env: &PlayEnv<'_>,
    block: &Block,
    seeds: &SeedSource,
    state: &Mutex<PlayState>,
    txs: &[Transaction],
) -> GroupRun {
    let mut output = GroupOutput::default();
    let error = run_group(env, block, seeds, state, txs, &mut output).err();
    GroupRun { output, error }
}

fn run_group(
    env: &PlayEnv<'_>,
    block: &Block,
    seeds: &SeedSource,
    state: &Mutex<PlayState>,
    txs: &[Transaction],
    out: &mut GroupOutput,
) -> Result<(), PlayError> {
    let mut guard = state.lock().map_err(|_| PlayError::StatePoisoned)?;
    let st = &mut *guard;

    for (position, tx) in txs.iter().enumerate() {
        let cost = TxCost {
            size: tx.raw().len() as u64,
        };
        match st.limits.charge(tx, cost) {
            LimitVerdict::Proceed => {}
            LimitVerdict::StopBlock => {
                if block.gen_block && position > 0 {
                    debug!(
                        block_id = block.header.block_id,
                        tx_hash = %tx.hash(),
                        "block limits reached, finalizing with accepted transactions"
                    );
                    break;
                }
                return Err(PlayError::LimitStop);
            }
            LimitVerdict::StopTx => {
                let reason = "sender transaction quota exceeded for this block";
                if st.marked_bad.insert(tx.hash()) {
                    let _ = env.sink.mark_transaction_bad(tx.hash(), reason);
                }
                let failure = PlayError::TxFailed {
                    hash: tx.hash(),
                    reason: reason.to_string(),
                };
                if block.gen_block {
                    st.gen_error = Some(failure);
                    continue;
                }
                return Err(failure);
            }
        }

        let savepoint = TxSavepoint::establish(env.store, &tx.hash())?;
        let mut ctx = TxContext::bind(
            tx,
            env.store,
            &block.header,
            block.prev.as_ref(),
            block.gen_block,
            savepoint.name().to_string(),
            seeds.tx_seed(&tx.hash()),
            &st.outputs,
        );

        match env.vm.play(&mut ctx) {
            Ok(()) => {
                // Drain per-tx artifacts while the savepoint scope is still
                // the current one, then fold the writes into the outer tx.
                let rts = env.store.take_rollback_records(&tx.hash())?;
                let ops = env.store.take_bin_log()?;
                let TxContext {
                    result_code,
                    invoke_status,
                    fuel_used,
                    sys_update,
                    notifications,
                    tx_inputs,
                    tx_outputs,
                    ..
                } = ctx;
                savepoint.release()?;

                st.limits.consume_fuel(fuel_used);
                if sys_update {
                    st.sys_update = true;
                }
                if !notifications.is_empty() {
                    out.notifications.push(notifications);
                }

                let (ecosystem_id, contract_name) = if tx.is_smart_contract() {
                    (tx.ecosystem_id(), tx.contract_name().to_string())
                } else {
                    (0, String::new())
                };
                out.afters.txs.push(AfterTx {
                    hash: tx.hash(),
                    full_data: tx.raw().to_vec(),
                    block_id: block.header.block_id,
                    timestamp: tx.timestamp(),
                    sender: tx.key_id(),
                    ecosystem_id,
                    contract_name,
                    invoke_status,
                    result_code,
                });
                out.afters.rts.extend(rts);
                out.afters.tx_bin_log.extend(ops);
                out.processed.push(tx.raw().to_vec());

                update_tx_inputs(&tx.hash(), &tx_inputs, &mut st.outputs);
                insert_tx_outputs(&tx.hash(), &tx_outputs, &mut st.outputs);
            }

            Err(VmError::NetworkStopping) => {
                // The outer rollback discards this transaction's writes along
                // with the rest of the block.
                env.node.pause_activity(PauseReason::NetworkStopping);
                return Err(PlayError::NetworkStopping);
            }

            Err(err) => {
                let sys_update_signalled = ctx.sys_update;
                drop(ctx);

                if let Err(roll_err) = savepoint.rollback() {
                    let primary = PlayError::TxFailed {
                        hash: tx.hash(),
                        reason: err.to_string(),
                    };
                    return Err(PlayError::compose(primary, PlayError::Storage(roll_err)));
                }

                let failure = if block.gen_block && err.to_string().contains(VM_TIME_LIMIT_MSG) {
                    PlayError::VmTimeLimit
                } else {
                    PlayError::TxFailed {
                        hash: tx.hash(),
                        reason: err.to_string(),
                    }
                };
                let reason = match &failure {
                    PlayError::TxFailed { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };

                if tx.is_smart_contract() && st.banned.insert(tx.key_id()) {
                    let _ = env.sink.bad_tx_for_ban(tx.key_id());
                }
                if st.marked_bad.insert(tx.hash()) {
                    let _ = env.sink.mark_transaction_bad(tx.hash(), &reason);
                }

                // System-parameter changes are separated from transaction
                // success: a tx that signalled one before failing still
                // refreshes the parameter cache.
                if sys_update_signalled {
                    env.syspar.sys_update(env.store)?;
                }

                if block.gen_block {
                    warn!(
                        block_id = block.header.block_id,
                        tx_hash = %tx.hash(),
                        error = %reason,
                        "transaction rejected during generation, continuing"
                    );
                    st.gen_error = Some(failure);
                    continue;
                }
                return Err(failure);
            }
        }
    }

    Ok(())
}
