//! Per-block resource accounting
//!
//! Tracks cumulative resource usage while a block plays and decides, before
//! each transaction, whether it may proceed. The decision is a three-way
//! verdict: proceed, skip this transaction, or stop the whole block.
//!
//! The mode matters only for how the caller reacts to a block-stop verdict
//! (generation truncates the block, validation fails it) and for the
//! generation wall-clock budget, which never runs during validation because
//! replay must be deterministic.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;
use crate::types::KeyId;

/// Whether the block is being built locally or replayed for validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitMode {
    Generating,
    Validating,
}

/// Configured ceilings for one block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitParams {
    /// Maximum number of transactions per block.
    pub max_tx_count: u32,
    /// Maximum cumulative raw size of the block's transactions.
    pub max_block_size: u64,
    /// Maximum number of transactions a single sender key may place in one
    /// block. Exceeding this skips the transaction, not the block.
    pub max_txs_per_key: u32,
    /// Maximum cumulative execution fuel per block.
    pub max_fuel: u64,
    /// Wall-clock budget for building a block, milliseconds. Generation only.
    pub generation_budget_ms: u64,
}

impl Default for LimitParams {
    fn default() -> Self {
        Self {
            max_tx_count: 10_000,
            max_block_size: 4 * 1024 * 1024, // 4 MiB
            max_txs_per_key: 100,
            max_fuel: 100_000_000,
            generation_budget_ms: 2_000,
        }
    }
}

impl LimitParams {
    /// Permissive limits for tests.
    pub fn for_testing() -> Self {
        Self {
            max_tx_count: u32::MAX,
            max_block_size: u64::MAX,
            max_txs_per_key: u32::MAX,
            max_fuel: u64::MAX,
            generation_budget_ms: u64::MAX,
        }
    }
}

/// Admission cost of one transaction, known before it executes.
#[derive(Debug, Clone, Copy)]
pub struct TxCost {
    /// Raw byte size of the transaction.
    pub size: u64,
}

/// Outcome of charging one transaction against the block's limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitVerdict {
    Proceed,
    /// Skip this transaction, keep playing the block.
    StopTx,
    /// The block is full; no further transaction may start.
    StopBlock,
}

/// Mutable limit state scoped to one block play.
#[derive(Debug)]
pub struct Limits {
    mode: LimitMode,
    params: LimitParams,
    tx_count: u32,
    block_size: u64,
    fuel: u64,
    per_key: HashMap<KeyId, u32>,
    started: Instant,
}

impl Limits {
    pub fn new(mode: LimitMode, params: LimitParams) -> Self {
        Self {
            mode,
            params,
            tx_count: 0,
            block_size: 0,
            fuel: 0,
            per_key: HashMap::new(),
            started: Instant::now(),
        }
    }

    pub fn mode(&self) -> LimitMode {
        self.mode
    }

    /// Charge a transaction about to execute.
    ///
    /// Checks run before any counter moves; a refused transaction leaves the
    /// state untouched. Block-wide exhaustion (count, size, fuel, generation
    /// clock) stops the block; a per-sender overflow only skips the tx.
    pub fn charge(&mut self, tx: &Transaction, cost: TxCost) -> LimitVerdict {
        let new_count = self.tx_count.saturating_add(1);
        if new_count > self.params.max_tx_count {
            return LimitVerdict::StopBlock;
        }

        let new_size = self.block_size.saturating_add(cost.size);
        if new_size > self.params.max_block_size {
            return LimitVerdict::StopBlock;
        }

        // Fuel is reported by the runtime after execution, so exhaustion is
        // observed by the first transaction that finds the tank already dry.
        if self.fuel >= self.params.max_fuel {
            return LimitVerdict::StopBlock;
        }

        if self.mode == LimitMode::Generating
            && self.started.elapsed().as_millis() as u64 > self.params.generation_budget_ms
        {
            return LimitVerdict::StopBlock;
        }

        let sender_count = self.per_key.get(&tx.key_id()).copied().unwrap_or(0);
        if sender_count >= self.params.max_txs_per_key {
            return LimitVerdict::StopTx;
        }

        self.tx_count = new_count;
        self.block_size = new_size;
        *self.per_key.entry(tx.key_id()).or_insert(0) = sender_count + 1;
        LimitVerdict::Proceed
    }

    /// Record fuel burned by a transaction that executed successfully.
    pub fn consume_fuel(&mut self, fuel: u64) {
        self.fuel = self.fuel.saturating_add(fuel);
    }

    pub fn usage(&self) -> (u32, u64, u64) {
        (self.tx_count, self.block_size, self.fuel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TxEnvelope;
    use crate::types::TxKind;

    fn tx(key: i64) -> Transaction {
        let raw = TxEnvelope {
            kind: TxKind::SmartContract,
            key_id: KeyId(key),
            timestamp: 1_000,
            ecosystem_id: 1,
            contract_name: "T".into(),
            utxo_to: None,
            payload: vec![],
        }
        .encode();
        Transaction::unmarshal(&raw).unwrap()
    }

    fn params() -> LimitParams {
        LimitParams {
            max_tx_count: 3,
            max_block_size: 1_000,
            max_txs_per_key: 2,
            max_fuel: 100,
            generation_budget_ms: u64::MAX,
        }
    }

    #[test]
    fn charge_proceeds_within_limits() {
        let mut limits = Limits::new(LimitMode::Validating, params());
        assert_eq!(
            limits.charge(&tx(1), TxCost { size: 10 }),
            LimitVerdict::Proceed
        );
        assert_eq!(limits.usage(), (1, 10, 0));
    }

    #[test]
    fn tx_count_exhaustion_stops_block() {
        let mut limits = Limits::new(LimitMode::Validating, params());
        for k in 0..3 {
            assert_eq!(
                limits.charge(&tx(k), TxCost { size: 1 }),
                LimitVerdict::Proceed
            );
        }
        assert_eq!(
            limits.charge(&tx(9), TxCost { size: 1 }),
            LimitVerdict::StopBlock
        );
    }

    #[test]
    fn size_exhaustion_stops_block() {
        let mut limits = Limits::new(LimitMode::Validating, params());
        assert_eq!(
            limits.charge(&tx(1), TxCost { size: 1_001 }),
            LimitVerdict::StopBlock
        );
    }

    #[test]
    fn fuel_exhaustion_stops_next_tx() {
        let mut limits = Limits::new(LimitMode::Validating, params());
        assert_eq!(
            limits.charge(&tx(1), TxCost { size: 1 }),
            LimitVerdict::Proceed
        );
        limits.consume_fuel(100);
        assert_eq!(
            limits.charge(&tx(2), TxCost { size: 1 }),
            LimitVerdict::StopBlock
        );
    }

    #[test]
    fn per_key_overflow_skips_only_that_tx() {
        let mut limits = Limits::new(LimitMode::Validating, params());
        assert_eq!(
            limits.charge(&tx(5), TxCost { size: 1 }),
            LimitVerdict::Proceed
        );
        assert_eq!(
            limits.charge(&tx(5), TxCost { size: 1 }),
            LimitVerdict::Proceed
        );
        assert_eq!(
            limits.charge(&tx(5), TxCost { size: 1 }),
            LimitVerdict::StopTx
        );
        // Another sender still proceeds.
        assert_eq!(
            limits.charge(&tx(6), TxCost { size: 1 }),
            LimitVerdict::Proceed
        );
    }

    /// A refused charge must not move any counter.
    #[test]
    fn invariant_refused_charge_leaves_state_untouched() {
        let mut limits = Limits::new(LimitMode::Validating, params());
        limits.charge(&tx(1), TxCost { size: 10 });
        let before = limits.usage();
        assert_eq!(
            limits.charge(&tx(1), TxCost { size: 10_000 }),
            LimitVerdict::StopBlock
        );
        assert_eq!(limits.usage(), before);
    }

    #[test]
    fn edge_case_generation_clock_only_in_generation() {
        let exhausted = LimitParams {
            generation_budget_ms: 0,
            ..params()
        };
        let mut gen = Limits::new(LimitMode::Generating, exhausted);
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert_eq!(
            gen.charge(&tx(1), TxCost { size: 1 }),
            LimitVerdict::StopBlock
        );

        let mut val = Limits::new(LimitMode::Validating, exhausted);
        assert_eq!(
            val.charge(&tx(1), TxCost { size: 1 }),
            LimitVerdict::Proceed
        );
    }

    #[test]
    fn golden_default_params() {
        let p = LimitParams::default();
        assert_eq!(p.max_tx_count, 10_000);
        assert_eq!(p.max_block_size, 4 * 1024 * 1024);
        assert_eq!(p.max_txs_per_key, 100);
        assert_eq!(p.max_fuel, 100_000_000);
        assert_eq!(p.generation_budget_ms, 2_000);
    }
}
