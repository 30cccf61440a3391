//! Transaction envelope and parsed form
//!
//! A transaction travels through the node as raw bytes; the play engine is
//! the last consumer to parse them. The envelope is a bincode struct carrying
//! the scheduling metadata (kind, sender, counterparty) next to the opaque
//! payload handed to the contract runtime.
//!
//! The transaction hash is the BLAKE3 digest of the raw bytes, so it is
//! recoverable even when decoding fails and a corrupt transaction can still
//! be reported by hash.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{KeyId, TxHash, TxKind};

/// Wire form of a transaction, bincode-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEnvelope {
    pub kind: TxKind,
    /// Sender key.
    pub key_id: KeyId,
    /// Unix timestamp assigned at signing time.
    pub timestamp: i64,
    /// Ecosystem the contract belongs to; zero for non-contract kinds.
    pub ecosystem_id: i64,
    /// Invoked contract name; empty for non-contract kinds.
    pub contract_name: String,
    /// Recipient key. Required for UTXO transfers, absent otherwise.
    pub utxo_to: Option<KeyId>,
    /// Opaque contract-runtime payload.
    pub payload: Vec<u8>,
}

impl TxEnvelope {
    pub fn encode(&self) -> Vec<u8> {
        // Envelope encoding cannot fail: all fields are plain owned data.
        bincode::serialize(self).unwrap_or_default()
    }
}

#[derive(Error, Debug)]
pub enum UnmarshalError {
    #[error("transaction decode failed: {0}")]
    Decode(String),

    #[error("utxo transaction without counterparty key")]
    MissingCounterparty,

    #[error("counterparty key on non-utxo transaction kind {0}")]
    UnexpectedCounterparty(TxKind),
}

/// A parsed transaction, paired with the raw bytes it was parsed from.
#[derive(Debug, Clone)]
pub struct Transaction {
    raw: Vec<u8>,
    hash: TxHash,
    envelope: TxEnvelope,
}

impl Transaction {
    /// Parse raw bytes into a transaction.
    ///
    /// The hash of the raw bytes identifies the transaction whether or not
    /// parsing succeeds; callers that need to report a corrupt transaction
    /// use [`TxHash::of`] on the same bytes.
    pub fn unmarshal(raw: &[u8]) -> Result<Self, UnmarshalError> {
        let envelope: TxEnvelope =
            bincode::deserialize(raw).map_err(|e| UnmarshalError::Decode(e.to_string()))?;
        match envelope.kind {
            TxKind::Utxo if envelope.utxo_to.is_none() => {
                return Err(UnmarshalError::MissingCounterparty)
            }
            kind if kind != TxKind::Utxo && envelope.utxo_to.is_some() => {
                return Err(UnmarshalError::UnexpectedCounterparty(kind))
            }
            _ => {}
        }
        Ok(Self {
            hash: TxHash::of(raw),
            raw: raw.to_vec(),
            envelope,
        })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    pub fn key_id(&self) -> KeyId {
        self.envelope.key_id
    }

    pub fn kind(&self) -> TxKind {
        self.envelope.kind
    }

    pub fn timestamp(&self) -> i64 {
        self.envelope.timestamp
    }

    pub fn payload(&self) -> &[u8] {
        &self.envelope.payload
    }

    pub fn ecosystem_id(&self) -> i64 {
        self.envelope.ecosystem_id
    }

    pub fn contract_name(&self) -> &str {
        &self.envelope.contract_name
    }

    /// Recipient of a UTXO transfer.
    pub fn utxo_to(&self) -> Option<KeyId> {
        self.envelope.utxo_to
    }

    /// Contract-backed kinds: failures of these get their sender banned
    /// during block generation.
    pub fn is_smart_contract(&self) -> bool {
        matches!(
            self.envelope.kind,
            TxKind::TransferSelf | TxKind::Utxo | TxKind::SmartContract
        )
    }

    /// Accounts this transaction contends on. Two transactions sharing any
    /// of these cannot execute in different groups.
    pub fn accounts(&self) -> impl Iterator<Item = KeyId> + '_ {
        std::iter::once(self.envelope.key_id).chain(self.envelope.utxo_to)
    }
}
