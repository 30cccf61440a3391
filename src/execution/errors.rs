//! Play errors
//!
//! Error taxonomy of the block-play pipeline. These are distinct from storage
//! errors - a play error classifies how a block or transaction failed and
//! drives the commit/abort decision; storage errors are always fatal and
//! arrive here wrapped.

use std::fmt;

use thiserror::Error;

use crate::storage::StorageError;
use crate::types::TxHash;
use crate::vm::VM_TIME_LIMIT_MSG;

/// Error produced while playing a block.
#[derive(Error, Debug)]
pub enum PlayError {
    // =========================================================================
    // Fatal infrastructure errors
    // =========================================================================
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A sibling transaction group panicked; the play state is unreliable.
    #[error("block play state lock poisoned")]
    StatePoisoned,

    // =========================================================================
    // Block-level outcomes
    // =========================================================================
    /// A stop-network transaction executed; the node pauses and the block
    /// aborts.
    #[error("network stop requested")]
    NetworkStopping,

    /// Per-block resource exhaustion. Hard failure during validation; during
    /// generation the block truncates unless nothing ran yet.
    #[error("block resource limit reached")]
    LimitStop,

    /// Generation produced zero accepted transactions. The outer transaction
    /// is still committed to capture bookkeeping.
    #[error("empty block")]
    EmptyBlock,

    /// A genesis block carried an unparseable transaction.
    #[error("parse transaction error({0})")]
    Parse(String),

    // =========================================================================
    // Transaction-level outcomes
    // =========================================================================
    /// The runtime's per-transaction deadline fired.
    #[error("{}", VM_TIME_LIMIT_MSG)]
    VmTimeLimit,

    /// Any other transaction failure (revert, bad signature, quota).
    #[error("transaction {hash} failed: {reason}")]
    TxFailed { hash: TxHash, reason: String },

    /// A primary failure followed by failures during cleanup.
    #[error(transparent)]
    Composite(Box<CompositeError>),
}

impl PlayError {
    /// Attach a secondary (cleanup) failure, preserving the primary cause.
    pub fn compose(primary: PlayError, secondary: PlayError) -> PlayError {
        match primary {
            PlayError::Composite(mut composite) => {
                composite.secondary.push(secondary);
                PlayError::Composite(composite)
            }
            primary => PlayError::Composite(Box::new(CompositeError {
                primary,
                secondary: vec![secondary],
            })),
        }
    }

    /// The original cause, looking through composition.
    pub fn primary(&self) -> &PlayError {
        match self {
            PlayError::Composite(composite) => composite.primary.primary(),
            other => other,
        }
    }
}

/// A primary error plus the ordered cleanup errors that followed it.
#[derive(Debug)]
pub struct CompositeError {
    pub primary: PlayError,
    pub secondary: Vec<PlayError>,
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        for err in &self.secondary {
            write!(f, "; {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.primary)
    }
}
