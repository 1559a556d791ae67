//! Per-request caller state and injected collaborators

use crate::wallet::{NameWallet, TransactionBroadcaster};
use namechain_core::Transaction;
use namechain_name_index::NameLookup;

/// Caller state established by the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    /// Caller passed transport authentication
    pub authenticated: bool,
}

impl Session {
    /// Authenticated caller
    pub fn authenticated() -> Self {
        Self {
            authenticated: true,
        }
    }

    /// Caller with no credentials
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Collaborators a handler may call
///
/// Borrowed from the hosting process for the duration of one request.
#[derive(Clone, Copy)]
pub struct ServiceContext<'a> {
    /// Name index
    pub names: &'a dyn NameLookup,
    /// Wallet
    pub wallet: &'a dyn NameWallet,
    /// Network client
    pub broadcaster: &'a dyn TransactionBroadcaster,
    /// Unconfirmed transactions the wallet should build on
    pub pending: &'a [Transaction],
}

impl<'a> ServiceContext<'a> {
    /// Context with an empty pending pool
    pub fn new(
        names: &'a dyn NameLookup,
        wallet: &'a dyn NameWallet,
        broadcaster: &'a dyn TransactionBroadcaster,
    ) -> Self {
        Self {
            names,
            wallet,
            broadcaster,
            pending: &[],
        }
    }

    /// Same context building on `pending`
    pub fn with_pending(self, pending: &'a [Transaction]) -> Self {
        Self { pending, ..self }
    }
}
