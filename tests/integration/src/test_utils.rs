//! Test fixtures: a ledger-backed wallet and a mempool broadcaster

use namechain_core::{
    Address, Asset, Block, ChainStore, NameClaim, Output, OutputReference, RecordPayload,
    Transaction, TxId, HASH_LEN,
};
use namechain_name_index::{NameDb, NameLookup};
use namechain_rpc::{BroadcastError, NameWallet, TransactionBroadcaster, WalletError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Fresh data directory under the system temp dir
pub fn temp_data_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("test_{}_{}", label, uuid::Uuid::new_v4()))
}

/// Funding input no other transaction spends
fn funding_input(nonce: u32) -> OutputReference {
    OutputReference::new(TxId([0xF0; HASH_LEN]), nonce)
}

/// Wallet for a single owner that builds name transactions against the index
pub struct LedgerWallet {
    pub owner: Address,
    open: AtomicBool,
    unlocked: AtomicBool,
    nonce: AtomicU32,
    auctions: Mutex<Vec<Output>>,
}

impl LedgerWallet {
    /// Open, unlocked wallet for `owner`
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            open: AtomicBool::new(true),
            unlocked: AtomicBool::new(true),
            nonce: AtomicU32::new(0),
            auctions: Mutex::new(Vec::new()),
        }
    }

    pub fn lock(&self) {
        self.unlocked.store(false, Ordering::SeqCst);
    }

    pub fn unlock(&self) {
        self.unlocked.store(true, Ordering::SeqCst);
    }

    fn next_input(&self) -> OutputReference {
        // Spread nonces per owner so two wallets never build the same input
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        funding_input(((self.owner.0[0] as u32) << 24) | nonce)
    }

    /// Current claim for `name`, which this wallet must own
    fn owned_claim(
        &self,
        name: &str,
        names: &dyn NameLookup,
    ) -> Result<(OutputReference, Output, NameClaim), WalletError> {
        let reference = names.get_ref(name)?;
        let output = names.resolve_record(name)?;
        let claim = output
            .name_claim()
            .cloned()
            .ok_or_else(|| WalletError::NameNotFound {
                name: name.to_string(),
            })?;

        if claim.owner != self.owner {
            return Err(WalletError::NotOwner {
                name: name.to_string(),
            });
        }
        Ok((reference, output, claim))
    }
}

impl NameWallet for LedgerWallet {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::SeqCst)
    }

    fn bid(
        &self,
        name: &str,
        amount: Asset,
        _pending: &[Transaction],
        names: &dyn NameLookup,
    ) -> Result<Transaction, WalletError> {
        let mut inputs = vec![self.next_input()];
        if names.has_ref(name) {
            inputs.push(names.get_ref(name)?);
        }

        let claim = NameClaim {
            name: name.to_string(),
            owner: self.owner,
            record: RecordPayload::default(),
        };
        Ok(Transaction::new(
            inputs,
            vec![Output::claim_name(claim, amount)],
        ))
    }

    fn ask(
        &self,
        name: &str,
        price: Asset,
        _pending: &[Transaction],
        names: &dyn NameLookup,
    ) -> Result<Transaction, WalletError> {
        let (reference, _, claim) = self.owned_claim(name, names)?;
        let output = Output::claim_name(claim, price);

        if let Ok(mut auctions) = self.auctions.lock() {
            auctions.retain(|o| o.name_claim().map(|c| c.name.as_str()) != Some(name));
            auctions.push(output.clone());
        }
        Ok(Transaction::new(vec![reference], vec![output]))
    }

    fn transfer(
        &self,
        name: &str,
        to: &Address,
        _pending: &[Transaction],
        names: &dyn NameLookup,
    ) -> Result<Transaction, WalletError> {
        let (reference, output, mut claim) = self.owned_claim(name, names)?;
        claim.owner = *to;
        Ok(Transaction::new(
            vec![reference],
            vec![Output::claim_name(claim, output.amount)],
        ))
    }

    fn set_record(
        &self,
        name: &str,
        value: &RecordPayload,
        _pending: &[Transaction],
        names: &dyn NameLookup,
    ) -> Result<Transaction, WalletError> {
        let (reference, output, mut claim) = self.owned_claim(name, names)?;
        claim.record = value.clone();
        Ok(Transaction::new(
            vec![reference],
            vec![Output::claim_name(claim, output.amount)],
        ))
    }

    fn lookup(
        &self,
        name: &str,
        _pending: &[Transaction],
        names: &dyn NameLookup,
    ) -> Result<RecordPayload, WalletError> {
        let output = names.resolve_record(name)?;
        output
            .name_claim()
            .map(|claim| claim.record.clone())
            .ok_or_else(|| WalletError::NameNotFound {
                name: name.to_string(),
            })
    }

    fn active_auctions(&self) -> Result<Vec<Output>, WalletError> {
        self.auctions
            .lock()
            .map(|a| a.clone())
            .map_err(|_| WalletError::Rejected("auction list poisoned".to_string()))
    }
}

/// Broadcaster that queues transactions for the next mined block
#[derive(Default)]
pub struct Mempool {
    queue: Mutex<Vec<Transaction>>,
}

impl Mempool {
    pub fn len(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply every queued transaction to `db` as one new block
    pub fn mine(&self, db: &NameDb) -> Block {
        let transactions = std::mem::take(&mut *self.queue.lock().unwrap());
        let head = db.head_height().unwrap();

        let block = if head == 0 {
            Block::first(current_timestamp_ms(), transactions)
        } else {
            let previous = db.chain().fetch_block(head).unwrap();
            previous.child(current_timestamp_ms(), transactions)
        };

        db.apply_block(&block, &[]).unwrap();
        block
    }
}

impl TransactionBroadcaster for Mempool {
    fn broadcast_transaction(&self, trx: &Transaction) -> Result<(), BroadcastError> {
        self.queue
            .lock()
            .map_err(|_| BroadcastError::Unavailable("mempool poisoned".to_string()))?
            .push(trx.clone());
        Ok(())
    }
}
