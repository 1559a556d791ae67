//! Chain storage collaborator interface
//!
//! The name index sits on top of an append-only block ledger it does not own.
//! `ChainStore` is the slice of that ledger the index and the RPC layer need:
//! block application, output and location lookup, head height, and block
//! fetch for replay.

use crate::types::{Block, BlockId, Output, OutputReference, Transaction, TransactionLocation, TxId};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur in chain storage operations
#[derive(Debug, Error)]
pub enum ChainError {
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cannot open chain store at {}: {reason}", .path.display())]
    StorageOpen { path: PathBuf, reason: String },

    #[error("Block not found: height={height}")]
    BlockNotFound { height: u32 },

    #[error("Transaction not found: {trx_id}")]
    TransactionNotFound { trx_id: TxId },

    #[error("Output not found: {reference}")]
    OutputNotFound { reference: OutputReference },

    #[error("Height violation: expected {expected}, got {actual}")]
    HeightViolation { expected: u32, actual: u32 },

    #[error("Chain ordering violation: expected previous {expected}, got {actual}")]
    ChainOrderingViolation { expected: BlockId, actual: BlockId },

    #[error("Duplicate transaction: {trx_id}")]
    DuplicateTransaction { trx_id: TxId },

    #[error("Ledger corrupted: {0}")]
    CorruptionDetected(String),

    #[error("Chain store is closed")]
    Closed,

    #[error("Chain store lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Append-only block ledger as consumed by the name index.
///
/// Implementations own their own locking; every method takes `&self`.
pub trait ChainStore: Send + Sync {
    /// Persist an already-validated block plus its derived transactions.
    ///
    /// Must be durable when this returns `Ok`.
    fn apply_block(&self, block: &Block, derived: &[Transaction]) -> Result<()>;

    /// Fetch a stored block (without derived transactions) by height
    fn fetch_block(&self, height: u32) -> Result<Block>;

    /// Fetch the output a reference points at
    fn fetch_output(&self, reference: &OutputReference) -> Result<Output>;

    /// Locate the block that recorded a transaction
    fn fetch_transaction_location(&self, trx_id: &TxId) -> Result<TransactionLocation>;

    /// Height of the last applied block; 0 for an empty ledger
    fn current_head_height(&self) -> Result<u32>;

    /// Release underlying storage. Idempotent.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: ChainStore + ?Sized> ChainStore for Arc<T> {
    fn apply_block(&self, block: &Block, derived: &[Transaction]) -> Result<()> {
        (**self).apply_block(block, derived)
    }

    fn fetch_block(&self, height: u32) -> Result<Block> {
        (**self).fetch_block(height)
    }

    fn fetch_output(&self, reference: &OutputReference) -> Result<Output> {
        (**self).fetch_output(reference)
    }

    fn fetch_transaction_location(&self, trx_id: &TxId) -> Result<TransactionLocation> {
        (**self).fetch_transaction_location(trx_id)
    }

    fn current_head_height(&self) -> Result<u32> {
        (**self).current_head_height()
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}
