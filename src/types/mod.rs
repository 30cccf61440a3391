//! Core type definitions
//!
//! Fixed-size identifiers and the closed transaction-kind set used by the
//! block-play pipeline.
//!
//! # CONSENSUS CORE RULE
//!
//! **No String identifiers in consensus state. Ever.**
//!
//! Hashes are `[u8; 32]` newtypes, account keys are `i64` newtypes. Strings
//! (contract names, error messages) are metadata, never keys.

pub mod after;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use after::{AfterTx, AfterTxs, BinLogOp, RollbackRecord};

/// BLAKE3 digest of a transaction's raw bytes.
///
/// This is the canonical transaction identity everywhere in the engine:
/// savepoint names, bad-tx marks, after-play records, outputs-map entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash raw transaction bytes.
    pub fn of(raw: &[u8]) -> Self {
        Self(*blake3::hash(raw).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for TxHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for TxHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Account key identifier (sender or recipient of value).
///
/// Signed 64-bit, matching the wallet address space of the surrounding node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct KeyId(pub i64);

impl KeyId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for KeyId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// Transaction kinds, in processing-phase order.
///
/// The set is closed: the phase dispatcher matches exhaustively and a new
/// variant forces an explicit scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    /// Network-wide kill switch; runs before anything mutates state
    StopNetwork,
    /// Chain-bootstrap transaction; only meaningful inside a genesis block
    FirstBlock,
    /// Scheduled (delayed) contract invocation
    Delay,
    /// Value transfer from a key to itself (account consolidation)
    TransferSelf,
    /// UTXO transfer between two keys
    Utxo,
    /// General smart-contract invocation
    SmartContract,
}

impl TxKind {
    /// Kinds executed one-by-one before any parallel fan-out.
    pub fn is_serial(&self) -> bool {
        matches!(self, TxKind::StopNetwork | TxKind::FirstBlock | TxKind::Delay)
    }

    /// Kinds eligible for account-disjoint group execution.
    pub fn is_group_parallel(&self) -> bool {
        matches!(self, TxKind::TransferSelf | TxKind::Utxo | TxKind::SmartContract)
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxKind::StopNetwork => "stop-network",
            TxKind::FirstBlock => "first-block",
            TxKind::Delay => "delay",
            TxKind::TransferSelf => "transfer-self",
            TxKind::Utxo => "utxo",
            TxKind::SmartContract => "smart-contract",
        };
        write!(f, "{}", s)
    }
}

/// Outcome classification of a contract invocation, recorded per accepted tx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvokeStatus {
    Success,
    /// Contract ran and was accepted into the block but reported a
    /// non-success result code (e.g. a handled revert).
    Penalty,
}

impl Default for InvokeStatus {
    fn default() -> Self {
        InvokeStatus::Success
    }
}
