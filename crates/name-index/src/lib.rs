//! Durable name index for namechain
//!
//! Maps each registered name to the output that currently claims it and
//! keeps that map in lock-step with the chain store as blocks are applied.

#![warn(missing_docs)]

pub mod db;
pub mod error;
pub mod index;
pub mod lookup;

pub use db::{NameDb, RecoveryAction, CHAIN_DB_FILE, INDEX_DB_FILE};
pub use error::{IndexError, Result};
pub use index::{validate_name, NameIndex, MAX_NAME_LEN};
pub use lookup::NameLookup;
