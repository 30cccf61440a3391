//! Block play coordinator (single authority)
//!
//! [`BlockPlayer`] is the **single entry point** for applying a candidate
//! block to persistent state. No other code opens the outer transaction or
//! decides commit versus rollback.
//!
//! # Execution order (NON-NEGOTIABLE)
//!
//! ```text
//! start_transaction
//! classify + group
//! preload outputs
//! phases: stop-network → genesis → delay → transfer-self ∥ → utxo ∪ contracts ∥
//! after_play_txs
//! commit or rollback
//! notification dispatch (commit only)
//! ```
//!
//! Validation aborts on the first failure; generation records failures,
//! truncates on exhausted limits, and finalizes with whatever succeeded.
//!
//! Group bookkeeping merges in phase order, and within a parallel phase in
//! group-label order, so the records are identical however the fan-out was
//! scheduled.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::{debug, error, info, warn};

use super::classifier::{classify, group_disjoint, ClassifiedTxs, GroupLabel};
use super::errors::PlayError;
use super::serial::{execute_group, GroupOutput, GroupRun};
use super::{ChainHooks, NodeControl, SysParams, TxStatusSink};
use crate::block::Block;
use crate::config::{BlockSyncMethod, PlayConfig};
use crate::events::{NotificationQueue, NotificationTransport};
use crate::random::SeedSource;
use crate::resources::{LimitMode, Limits};
use crate::storage::{put_all_outputs_map, OutputsMap, PlayStore};
use crate::transaction::Transaction;
use crate::types::{AfterTxs, KeyId, TxHash, TxKind};
use crate::vm::ContractVm;

/// Collaborators the coordinator drives. All borrowed: the engine owns no
/// node infrastructure.
#[derive(Clone, Copy)]
pub struct PlayEnv<'a> {
    pub store: &'a dyn PlayStore,
    pub vm: &'a dyn ContractVm,
    pub sink: &'a dyn TxStatusSink,
    pub node: &'a dyn NodeControl,
    pub syspar: &'a dyn SysParams,
    pub hooks: &'a dyn ChainHooks,
    pub transport: &'a dyn NotificationTransport,
}

/// Everything a committed play hands back to the caller.
#[derive(Debug)]
pub struct PlayOutcome {
    /// Raw bytes of every accepted transaction, in acceptance order. During
    /// generation this is the block's final transaction list.
    pub processed_txs: Vec<Vec<u8>>,
    /// Bookkeeping collected during play.
    pub afters: AfterTxs,
    /// Final unspent-output view after the block's accepted transactions.
    pub outputs: OutputsMap,
    /// An accepted transaction changed system parameters; the caller
    /// refreshes its caches after the commit.
    pub sys_update: bool,
}

/// State shared across the parallel fan-out behind a single mutex: the
/// mutex doubles as the writer lock on the outer database transaction, so a
/// group holds it for its entire run. Nothing here survives the `play` call.
pub(crate) struct PlayState {
    pub limits: Limits,
    pub outputs: OutputsMap,
    pub sys_update: bool,
    /// Last non-fatal failure recorded while generating. Surfaces as the
    /// play error only when nothing was accepted.
    pub gen_error: Option<PlayError>,
    /// Transactions already reported bad; keeps every transaction's mark
    /// unique across the executor path and the rejection sweep.
    pub marked_bad: HashSet<TxHash>,
    /// Senders already registered for banning.
    pub banned: HashSet<KeyId>,
}

impl PlayState {
    fn new(limits: Limits) -> Self {
        Self {
            limits,
            outputs: OutputsMap::new(),
            sys_update: false,
            gen_error: None,
            marked_bad: HashSet::new(),
            banned: HashSet::new(),
        }
    }
}

/// Bookkeeping accumulated by the coordinator, in deterministic merge order.
#[derive(Default)]
struct PlayAccum {
    afters: AfterTxs,
    processed: Vec<Vec<u8>>,
    notifications: Vec<NotificationQueue>,
}

impl PlayAccum {
    fn merge(&mut self, group: GroupOutput) {
        self.afters.txs.extend(group.afters.txs);
        self.afters.rts.extend(group.afters.rts);
        self.afters.tx_bin_log.extend(group.afters.tx_bin_log);
        self.processed.extend(group.processed);
        self.notifications.extend(group.notifications);
    }
}

/// The block play coordinator.
pub struct BlockPlayer<'a> {
    env: PlayEnv<'a>,
    config: PlayConfig,
}

impl<'a> BlockPlayer<'a> {
    pub fn new(env: PlayEnv<'a>, config: PlayConfig) -> Self {
        Self { env, config }
    }

    /// Play a block against persistent state.
    ///
    /// On success the block is durably committed and queued notifications
    /// have been dispatched. On error nothing of the block is visible,
    /// except that an empty generation result commits its bookkeeping and
    /// returns [`PlayError::EmptyBlock`].
    pub fn play(&self, block: &Block) -> Result<PlayOutcome, PlayError> {
        let store = self.env.store;
        if let Err(err) = store.start_transaction() {
            error!(block_id = block.header.block_id, error = %err, "starting outer transaction");
            return Err(err.into());
        }

        let mode = if block.gen_block {
            LimitMode::Generating
        } else {
            LimitMode::Validating
        };
        let state = Mutex::new(PlayState::new(Limits::new(mode, self.config.limits)));
        let mut accum = PlayAccum::default();

        let result = self.process_txs(block, &state, &mut accum);
        let mut state = state.into_inner().unwrap_or_else(|p| p.into_inner());

        if let Err(err) = result {
            if let Err(rb) = store.rollback() {
                warn!(block_id = block.header.block_id, error = %rb, "rolling back after failed play");
            }
            if block.gen_block && accum.processed.is_empty() {
                self.ban_sweep(block, &err, &mut state)?;
            }
            return Err(err);
        }

        if block.gen_block && accum.processed.is_empty() {
            // Commit anyway: the side bookkeeping written during play (bad-tx
            // queues, after-play tables) must survive the empty result.
            store.commit()?;
            info!(block_id = block.header.block_id, "generation produced an empty block");
            return Err(PlayError::EmptyBlock);
        }

        if let Err(err) = self
            .env
            .hooks
            .insert_into_blockchain(store, block, &accum.afters)
        {
            if let Err(rb) = store.rollback() {
                warn!(block_id = block.header.block_id, error = %rb, "rolling back after insert failure");
            }
            return Err(err.into());
        }

        store.commit()?;

        for queue in &accum.notifications {
            queue.send(self.env.transport);
        }
        info!(
            block_id = block.header.block_id,
            accepted = accum.processed.len(),
            "block committed"
        );

        Ok(PlayOutcome {
            processed_txs: accum.processed,
            afters: accum.afters,
            outputs: state.outputs,
            sys_update: state.sys_update,
        })
    }

    /// Run all phases, then the after-play aggregation, composing their
    /// errors so the primary cause survives.
    fn process_txs(
        &self,
        block: &Block,
        state: &Mutex<PlayState>,
        accum: &mut PlayAccum,
    ) -> Result<(), PlayError> {
        let phase_result = self.run_phases(block, state, accum);

        // An all-failed generation block surfaces its recorded error so the
        // caller rolls back and the rejection sweep runs.
        let phase_result = match phase_result {
            Ok(()) if block.gen_block && accum.processed.is_empty() => {
                let mut st = state.lock().map_err(|_| PlayError::StatePoisoned)?;
                match st.gen_error.take() {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            other => other,
        };

        let after_result = match state.lock() {
            Ok(st) => self
                .env
                .hooks
                .after_play_txs(self.env.store, &accum.afters, &st.outputs)
                .map_err(PlayError::from),
            Err(_) => Err(PlayError::StatePoisoned),
        };

        match (phase_result, after_result) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(after)) => Err(after),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(after)) => Err(PlayError::compose(err, after)),
        }
    }

    fn run_phases(
        &self,
        block: &Block,
        state: &Mutex<PlayState>,
        accum: &mut PlayAccum,
    ) -> Result<(), PlayError> {
        // Validated blocks can skip replay entirely when state arrives as a
        // shipped storage log; only a signalled parameter update remains.
        if !block.gen_block
            && !block.is_genesis
            && self.config.block_sync_method == BlockSyncMethod::LogShipping
        {
            debug!(block_id = block.header.block_id, "log-shipping sync, skipping replay");
            if block.sys_update {
                self.env.syspar.sys_update(self.env.store)?;
            }
            return Ok(());
        }

        let (mut classified, genesis_txs) = if block.is_genesis {
            (ClassifiedTxs::default(), self.parse_genesis(block)?)
        } else {
            (classify(&block.transactions), Vec::new())
        };

        // Preload unspent outputs for every sender the block references.
        let key_ids: Vec<KeyId> = if block.is_genesis {
            genesis_txs.iter().map(Transaction::key_id).collect()
        } else {
            classified.sender_keys()
        };
        let rows = self.env.store.get_tx_outputs(&key_ids)?;
        {
            let mut st = state.lock().map_err(|_| PlayError::StatePoisoned)?;
            put_all_outputs_map(rows, &mut st.outputs);
            for (hash, reason) in &classified.bad {
                if st.marked_bad.insert(*hash) {
                    let _ = self.env.sink.mark_transaction_bad(*hash, reason);
                }
            }
        }

        let seeds = SeedSource::new(block.header.timestamp);

        let stop_network = classified.take(TxKind::StopNetwork);
        if !stop_network.is_empty() {
            self.run_serial(block, &seeds, state, accum, &stop_network)?;
        }

        if block.is_genesis && !genesis_txs.is_empty() {
            self.run_serial(block, &seeds, state, accum, &genesis_txs)?;
        }

        let delay = classified.take(TxKind::Delay);
        if !delay.is_empty() {
            self.run_serial(block, &seeds, state, accum, &delay)?;
        }

        let transfer_self = classified.take(TxKind::TransferSelf);
        if !transfer_self.is_empty() {
            let groups: Vec<(GroupLabel, Vec<Transaction>)> = group_disjoint(transfer_self)
                .into_iter()
                .map(|(serial, txs)| (GroupLabel::Accounts(serial), txs))
                .collect();
            self.fan_out(block, &seeds, state, accum, groups)?;
        }

        let utxo = classified.take(TxKind::Utxo);
        let contracts = classified.take(TxKind::SmartContract);
        if !utxo.is_empty() || !contracts.is_empty() {
            let mut groups: Vec<(GroupLabel, Vec<Transaction>)> = group_disjoint(utxo)
                .into_iter()
                .map(|(serial, txs)| (GroupLabel::Accounts(serial), txs))
                .collect();
            if !contracts.is_empty() {
                groups.push((GroupLabel::Contracts, contracts));
            }
            self.fan_out(block, &seeds, state, accum, groups)?;
        }

        Ok(())
    }

    /// Run one group and merge its bookkeeping, error or not.
    fn run_serial(
        &self,
        block: &Block,
        seeds: &SeedSource,
        state: &Mutex<PlayState>,
        accum: &mut PlayAccum,
        txs: &[Transaction],
    ) -> Result<(), PlayError> {
        let run = execute_group(&self.env, block, seeds, state, txs);
        accum.merge(run.output);
        match run.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Run a phase's groups concurrently and join them all before returning.
    ///
    /// Results merge in label order; accepted work of every group is kept
    /// even when a sibling fails, so the caller can tell an all-rejected
    /// block from a partially-played one. The first error in label order
    /// becomes the phase error.
    fn fan_out(
        &self,
        block: &Block,
        seeds: &SeedSource,
        state: &Mutex<PlayState>,
        accum: &mut PlayAccum,
        groups: Vec<(GroupLabel, Vec<Transaction>)>,
    ) -> Result<(), PlayError> {
        let env = &self.env;
        let mut results: Vec<(GroupLabel, GroupRun)> = Vec::with_capacity(groups.len());

        std::thread::scope(|scope| {
            let handles: Vec<_> = groups
                .iter()
                .map(|(label, txs)| {
                    let handle = scope.spawn(move || execute_group(env, block, seeds, state, txs));
                    (*label, handle)
                })
                .collect();
            for (label, handle) in handles {
                let run = handle.join().unwrap_or_else(|_| GroupRun {
                    output: Default::default(),
                    error: Some(PlayError::StatePoisoned),
                });
                results.push((label, run));
            }
        });

        results.sort_by_key(|(label, _)| *label);
        let mut phase_error = None;
        for (label, run) in results {
            accum.merge(run.output);
            if let Some(err) = run.error {
                warn!(
                    block_id = block.header.block_id,
                    group = %label,
                    error = %err,
                    "transaction group failed"
                );
                if phase_error.is_none() {
                    phase_error = Some(err);
                }
            }
        }
        match phase_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// A genesis block's raw transactions are its sole content; any parse
    /// failure aborts the block.
    fn parse_genesis(&self, block: &Block) -> Result<Vec<Transaction>, PlayError> {
        let mut txs = Vec::with_capacity(block.transactions.len());
        for raw in &block.transactions {
            match Transaction::unmarshal(raw) {
                Ok(tx) => txs.push(tx),
                Err(err) => {
                    let _ = self
                        .env
                        .sink
                        .mark_transaction_bad(TxHash::of(raw), &err.to_string());
                    return Err(PlayError::Parse(err.to_string()));
                }
            }
        }
        Ok(txs)
    }

    /// Rejection sweep for a generation block that failed with nothing
    /// accepted: ban each contract sender at most once, mark every input tx
    /// bad exactly once (marks already made while playing are not repeated).
    fn ban_sweep(
        &self,
        block: &Block,
        err: &PlayError,
        state: &mut PlayState,
    ) -> Result<(), PlayError> {
        let message = err.to_string();
        for raw in &block.transactions {
            if let Ok(tx) = Transaction::unmarshal(raw) {
                if tx.is_smart_contract() && state.banned.insert(tx.key_id()) {
                    let _ = self.env.sink.bad_tx_for_ban(tx.key_id());
                }
            }
            let hash = TxHash::of(raw);
            if state.marked_bad.insert(hash) {
                self.env.sink.mark_transaction_bad(hash, &message)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
