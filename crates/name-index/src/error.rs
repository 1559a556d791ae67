//! Name index error types

use namechain_core::{ChainError, TxId};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in name index operations
#[derive(Debug, Error)]
pub enum IndexError {
    /// Database missing, inaccessible or corrupt
    #[error("Cannot open name index at {}: {reason}", .path.display())]
    StorageOpen { path: PathBuf, reason: String },

    /// No entry for the name
    #[error("Name not found: {name}")]
    NotFound { name: String },

    /// Ledger has no record of the transaction
    #[error("Transaction not found: {trx_id}")]
    UnknownTransaction { trx_id: TxId },

    /// Block is not the one after the index's applied height
    #[error("Name index expected block {expected}, got {actual}")]
    HeightMismatch { expected: u32, actual: u32 },

    /// Malformed name or other bad input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation after `close`
    #[error("Name index is closed")]
    Closed,

    /// SQLite failure
    #[error("Database error in {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Chain store failure
    #[error("Chain error in {context}: {source}")]
    Chain {
        context: String,
        #[source]
        source: ChainError,
    },

    /// A writer panicked while holding a lock
    #[error("Name index lock poisoned")]
    LockPoisoned,
}

impl IndexError {
    /// True for a missing name or transaction
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            IndexError::NotFound { .. } | IndexError::UnknownTransaction { .. }
        )
    }
}

/// Name index result type
pub type Result<T> = std::result::Result<T, IndexError>;

/// Attach an operation context to a SQLite error
pub(crate) fn db_err(context: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> IndexError {
    let context = context.into();
    move |source| IndexError::Database { context, source }
}

/// Attach an operation context to a chain error, lifting unknown
/// transactions into `UnknownTransaction`
pub(crate) fn chain_err(context: impl Into<String>) -> impl FnOnce(ChainError) -> IndexError {
    let context = context.into();
    move |source| match source {
        ChainError::TransactionNotFound { trx_id } => IndexError::UnknownTransaction { trx_id },
        source => IndexError::Chain { context, source },
    }
}
