//! Core functionality for the namechain name registry.
//!
//! This crate provides the ledger data model, the chain storage interface
//! the name index is built over, a SQLite reference chain store, and the
//! configuration and logging used across the workspace.

pub mod chain;
pub mod config;
pub mod error;
#[cfg(feature = "sqlite")]
pub mod ledger;
pub mod logging;
pub mod types;

pub use chain::{ChainError, ChainStore};
pub use config::{Config, LoggingConfig, StorageConfig};
pub use error::CoreError;
#[cfg(feature = "sqlite")]
pub use ledger::{ChainHealth, ChainMetrics, SqliteChainStore};
pub use types::{
    Address, Asset, Block, BlockId, ClaimCondition, NameClaim, Output, OutputReference,
    ParseError, RecordPayload, Transaction, TransactionLocation, TxId, ADDRESS_LEN, HASH_LEN,
};
