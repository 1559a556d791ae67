//! Wallet and broadcast collaborators
//!
//! The dispatcher never owns a wallet. The hosting process hands in trait
//! objects through [`ServiceContext`](crate::ServiceContext); each wallet is
//! responsible for serializing access to its own state.

#![warn(missing_docs)]

use namechain_core::{Address, Asset, Output, RecordPayload, Transaction, TxId};
use namechain_name_index::{IndexError, NameLookup};
use thiserror::Error;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Wallet is not open
    #[error("Wallet is not open")]
    Closed,

    /// Wallet is locked
    #[error("Wallet is locked")]
    Locked,

    /// Name has no claim the wallet can act on
    #[error("Name not found: {name}")]
    NameNotFound {
        /// Requested name
        name: String,
    },

    /// Wallet does not hold the claim for the name
    #[error("Wallet does not own name {name}")]
    NotOwner {
        /// Requested name
        name: String,
    },

    /// Not enough funds to cover the amount
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// Amount required
        needed: Asset,
        /// Amount held
        available: Asset,
    },

    /// Name index failure while building the transaction
    #[error("Name index error: {0}")]
    Index(#[from] IndexError),

    /// Any other refusal
    #[error("Wallet rejected request: {0}")]
    Rejected(String),
}

/// Broadcast errors
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// Transaction refused by the network client
    #[error("Transaction {trx_id} rejected: {reason}")]
    Rejected {
        /// Rejected transaction
        trx_id: TxId,
        /// Reason given
        reason: String,
    },

    /// Network client unreachable
    #[error("Broadcast unavailable: {0}")]
    Unavailable(String),
}

/// Transaction construction for name operations
///
/// `pending` holds transactions not yet in a block that the wallet should
/// build on top of. `names` is the current name index.
pub trait NameWallet: Send + Sync {
    /// True once the wallet file is open
    fn is_open(&self) -> bool;

    /// True while the wallet can sign
    fn is_unlocked(&self) -> bool;

    /// Bid `amount` on `name`
    fn bid(
        &self,
        name: &str,
        amount: Asset,
        pending: &[Transaction],
        names: &dyn NameLookup,
    ) -> Result<Transaction, WalletError>;

    /// Offer an owned `name` for bidding at a minimum `price`
    fn ask(
        &self,
        name: &str,
        price: Asset,
        pending: &[Transaction],
        names: &dyn NameLookup,
    ) -> Result<Transaction, WalletError>;

    /// Hand an owned `name` to `to`
    fn transfer(
        &self,
        name: &str,
        to: &Address,
        pending: &[Transaction],
        names: &dyn NameLookup,
    ) -> Result<Transaction, WalletError>;

    /// Replace the record attached to an owned `name`
    fn set_record(
        &self,
        name: &str,
        value: &RecordPayload,
        pending: &[Transaction],
        names: &dyn NameLookup,
    ) -> Result<Transaction, WalletError>;

    /// Current record for `name`
    fn lookup(
        &self,
        name: &str,
        pending: &[Transaction],
        names: &dyn NameLookup,
    ) -> Result<RecordPayload, WalletError>;

    /// Name claim outputs currently open for bidding
    fn active_auctions(&self) -> Result<Vec<Output>, WalletError>;
}

/// Hands finished transactions to the network
pub trait TransactionBroadcaster: Send + Sync {
    /// Submit `trx` for inclusion in a future block
    fn broadcast_transaction(&self, trx: &Transaction) -> Result<(), BroadcastError>;
}
