//! In-memory collaborators for unit tests

use crate::wallet::{BroadcastError, NameWallet, TransactionBroadcaster, WalletError};
use namechain_core::{
    Address, Asset, NameClaim, Output, OutputReference, RecordPayload, Transaction, TxId,
    ADDRESS_LEN, HASH_LEN,
};
use namechain_name_index::{IndexError, NameLookup};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub(crate) fn claim(name: &str, record: &str) -> Output {
    Output::claim_name(
        NameClaim {
            name: name.to_string(),
            owner: Address([7; ADDRESS_LEN]),
            record: RecordPayload::new(record),
        },
        Asset::new(100),
    )
}

#[derive(Default)]
pub(crate) struct MockLookup {
    entries: BTreeMap<String, (OutputReference, Output)>,
}

impl MockLookup {
    pub(crate) fn with_claim(mut self, name: &str, record: &str) -> Self {
        let reference = OutputReference::new(TxId([self.entries.len() as u8; HASH_LEN]), 0);
        self.entries
            .insert(name.to_string(), (reference, claim(name, record)));
        self
    }
}

impl NameLookup for MockLookup {
    fn get_ref(&self, name: &str) -> Result<OutputReference, IndexError> {
        self.entries
            .get(name)
            .map(|(r, _)| *r)
            .ok_or_else(|| IndexError::NotFound {
                name: name.to_string(),
            })
    }

    fn has_ref(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn resolve_record(&self, name: &str) -> Result<Output, IndexError> {
        self.entries
            .get(name)
            .map(|(_, o)| o.clone())
            .ok_or_else(|| IndexError::NotFound {
                name: name.to_string(),
            })
    }

    fn claim_age(&self, _reference: &OutputReference) -> Result<u32, IndexError> {
        Ok(0)
    }

    fn head_height(&self) -> Result<u32, IndexError> {
        Ok(0)
    }
}

/// Wallet that records every call and builds a one-output transaction
pub(crate) struct MockWallet {
    open: bool,
    unlocked: bool,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) auctions: Vec<Output>,
}

impl MockWallet {
    fn new(open: bool, unlocked: bool) -> Self {
        Self {
            open,
            unlocked,
            calls: Mutex::new(Vec::new()),
            auctions: Vec::new(),
        }
    }

    pub(crate) fn closed() -> Self {
        Self::new(false, false)
    }

    pub(crate) fn locked() -> Self {
        Self::new(true, false)
    }

    pub(crate) fn unlocked() -> Self {
        Self::new(true, true)
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn build(&self, call: String, output: Output) -> Result<Transaction, WalletError> {
        self.calls.lock().unwrap().push(call);
        Ok(Transaction::new(vec![], vec![output]))
    }
}

impl NameWallet for MockWallet {
    fn is_open(&self) -> bool {
        self.open
    }

    fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    fn bid(
        &self,
        name: &str,
        amount: Asset,
        _pending: &[Transaction],
        _names: &dyn NameLookup,
    ) -> Result<Transaction, WalletError> {
        self.build(format!("bid {} {}", name, amount), claim(name, ""))
    }

    fn ask(
        &self,
        name: &str,
        price: Asset,
        _pending: &[Transaction],
        names: &dyn NameLookup,
    ) -> Result<Transaction, WalletError> {
        let output = names.resolve_record(name)?;
        self.build(format!("ask {} {}", name, price), output)
    }

    fn transfer(
        &self,
        name: &str,
        to: &Address,
        _pending: &[Transaction],
        _names: &dyn NameLookup,
    ) -> Result<Transaction, WalletError> {
        self.build(format!("transfer {} {}", name, to), claim(name, ""))
    }

    fn set_record(
        &self,
        name: &str,
        value: &RecordPayload,
        _pending: &[Transaction],
        _names: &dyn NameLookup,
    ) -> Result<Transaction, WalletError> {
        self.build(
            format!("set_record {} {}", name, value.as_str()),
            claim(name, value.as_str()),
        )
    }

    fn lookup(
        &self,
        name: &str,
        _pending: &[Transaction],
        names: &dyn NameLookup,
    ) -> Result<RecordPayload, WalletError> {
        self.calls.lock().unwrap().push(format!("lookup {}", name));
        let output = names.resolve_record(name)?;
        output
            .name_claim()
            .map(|c| c.record.clone())
            .ok_or_else(|| WalletError::NameNotFound {
                name: name.to_string(),
            })
    }

    fn active_auctions(&self) -> Result<Vec<Output>, WalletError> {
        Ok(self.auctions.clone())
    }
}

#[derive(Default)]
pub(crate) struct MockBroadcaster {
    pub(crate) sent: Mutex<Vec<Transaction>>,
    pub(crate) offline: bool,
}

impl MockBroadcaster {
    pub(crate) fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().unwrap().clone()
    }
}

impl TransactionBroadcaster for MockBroadcaster {
    fn broadcast_transaction(&self, trx: &Transaction) -> Result<(), BroadcastError> {
        if self.offline {
            return Err(BroadcastError::Unavailable("offline".to_string()));
        }
        self.sent.lock().unwrap().push(trx.clone());
        Ok(())
    }
}
