//! Transaction classification and account-disjoint grouping
//!
//! Classification parses a block's raw transactions into per-kind lists,
//! preserving block order. Grouping partitions the parallelizable kinds into
//! numbered groups whose account sets do not intersect, so groups can execute
//! concurrently without write conflicts.
//!
//! Both steps are pure functions of their input: no state survives the call,
//! and identical input produces identical output on every node.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use tracing::debug;

use crate::transaction::Transaction;
use crate::types::{KeyId, TxHash, TxKind};

/// Per-kind transaction lists, in block order, plus the transactions that
/// failed to parse.
#[derive(Debug, Default)]
pub struct ClassifiedTxs {
    by_kind: HashMap<TxKind, Vec<Transaction>>,
    /// Unparseable transactions, by raw-bytes hash, with the parse error.
    pub bad: Vec<(TxHash, String)>,
}

impl ClassifiedTxs {
    /// Remove and return the list of one kind.
    pub fn take(&mut self, kind: TxKind) -> Vec<Transaction> {
        self.by_kind.remove(&kind).unwrap_or_default()
    }

    pub fn len(&self, kind: TxKind) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.values().all(Vec::is_empty)
    }

    /// Sender keys of every classified transaction, unordered.
    pub fn sender_keys(&self) -> Vec<KeyId> {
        self.by_kind
            .values()
            .flatten()
            .map(Transaction::key_id)
            .collect()
    }
}

/// Parse and classify a block's raw transactions.
///
/// A transaction that fails to parse is reported in `bad` (its hash is the
/// digest of the raw bytes, so it is always recoverable) and excluded; the
/// rest of the block classifies normally.
pub fn classify(raw_txs: &[Vec<u8>]) -> ClassifiedTxs {
    let mut classified = ClassifiedTxs::default();
    for raw in raw_txs {
        match Transaction::unmarshal(raw) {
            Ok(tx) => classified.by_kind.entry(tx.kind()).or_default().push(tx),
            Err(err) => {
                let hash = TxHash::of(raw);
                debug!(tx_hash = %hash, error = %err, "excluding unparseable transaction");
                classified.bad.push((hash, err.to_string()));
            }
        }
    }
    classified
}

/// Identity of one executable group within a parallel phase.
///
/// Account groups and the contracts group deliberately live in different
/// variants so their numbering can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupLabel {
    /// Account-disjoint group, numbered from 1.
    Accounts(u16),
    /// The block's smart-contract transactions, executed as one group.
    Contracts,
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupLabel::Accounts(serial) => write!(f, "accounts-{serial}"),
            GroupLabel::Contracts => write!(f, "contracts"),
        }
    }
}

/// Partition transactions into account-disjoint groups.
///
/// Worklist formulation: seed a group with the first unassigned transaction's
/// accounts, sweep the remainder absorbing every transaction that shares an
/// account with the group (widening the account set as it goes), and repeat
/// the sweep until a full pass absorbs nothing. Each closed group is ordered
/// by source position. Terminates because every iteration either absorbs a
/// transaction or closes a group.
pub fn group_disjoint(txs: Vec<Transaction>) -> Vec<(u16, Vec<Transaction>)> {
    let mut remaining: VecDeque<(usize, Transaction)> = txs.into_iter().enumerate().collect();
    let mut groups = Vec::new();
    let mut serial: u16 = 1;

    while let Some((seed_index, seed)) = remaining.pop_front() {
        let mut accounts: HashSet<KeyId> = seed.accounts().collect();
        let mut members = vec![(seed_index, seed)];

        loop {
            let absorbed_before = members.len();
            let mut rest = VecDeque::with_capacity(remaining.len());
            while let Some((index, tx)) = remaining.pop_front() {
                if tx.accounts().any(|account| accounts.contains(&account)) {
                    accounts.extend(tx.accounts());
                    members.push((index, tx));
                } else {
                    rest.push_back((index, tx));
                }
            }
            remaining = rest;
            if members.len() == absorbed_before {
                break;
            }
        }

        members.sort_by_key(|(index, _)| *index);
        groups.push((
            serial,
            members.into_iter().map(|(_, tx)| tx).collect::<Vec<_>>(),
        ));
        serial = serial.saturating_add(1);
    }

    groups
}
