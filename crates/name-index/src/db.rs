//! Chain store and name index opened, written and closed as one unit
//!
//! `NameDb` owns both halves and a reader/writer gate. `apply_block` holds the
//! write side across the ledger write and the index write, so readers never
//! see one without the other.
//!
//! Durability ordering: the ledger commits first, then the index commits its
//! entries together with its applied-height marker. If the process dies in
//! between, or the index write fails, the ledger is ahead and the missing
//! blocks are replayed by the next `apply_block` or by `recover` on the next
//! open. The index never references a block the ledger lacks.
//!
//! Reorganizations are handled by rebuilding: if the ledger head drops below
//! the index's applied height, the whole index is cleared and replayed.

use crate::error::{chain_err, IndexError, Result};
use crate::index::NameIndex;
use namechain_core::{Block, ChainStore, Output, OutputReference, SqliteChainStore, Transaction};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info, warn};

/// Chain store file under the data directory
pub const CHAIN_DB_FILE: &str = "chain.db";

/// Name index file under the data directory
pub const INDEX_DB_FILE: &str = "name_refs.db";

/// What `recover` had to do to line the index up with the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Index already matched the ledger head
    InSync { height: u32 },
    /// Index was behind; blocks `from..=to` were replayed
    Replayed { from: u32, to: u32 },
    /// Index was ahead of the ledger; it was rebuilt up to `height`
    Rebuilt { height: u32 },
}

/// Name index kept in lock-step with a chain store
pub struct NameDb<C: ChainStore = SqliteChainStore> {
    chain: C,
    index: NameIndex,
    gate: RwLock<()>,
}

impl NameDb<SqliteChainStore> {
    /// Open the chain store and name index under `dir`
    ///
    /// The two databases are siblings (`chain.db`, `name_refs.db`). After
    /// opening, the index is brought up to the ledger head.
    pub fn open(dir: impl AsRef<Path>, create: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let chain_path = dir.join(CHAIN_DB_FILE);

        let chain =
            SqliteChainStore::open(&chain_path, create).map_err(|e| IndexError::StorageOpen {
                path: chain_path.clone(),
                reason: e.to_string(),
            })?;

        Self::with_chain(chain, dir, create)
    }
}

impl<C: ChainStore> NameDb<C> {
    /// Attach a name index under `dir` to an already-open chain store
    pub fn with_chain(chain: C, dir: impl AsRef<Path>, create: bool) -> Result<Self> {
        let index = NameIndex::open(dir.as_ref().join(INDEX_DB_FILE), create)?;

        let db = Self {
            chain,
            index,
            gate: RwLock::new(()),
        };

        let action = db.recover()?;
        info!(?action, "Name database opened");

        Ok(db)
    }

    fn read_gate(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.gate.read().map_err(|_| IndexError::LockPoisoned)
    }

    fn write_gate(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        self.gate.write().map_err(|_| IndexError::LockPoisoned)
    }

    /// Close the index, then the chain store. Idempotent.
    pub fn close(&self) -> Result<()> {
        let _guard = self.write_gate()?;
        self.index.close()?;
        self.chain.close().map_err(chain_err("close"))?;
        Ok(())
    }

    /// Store a block in the ledger and fold its name claims into the index.
    ///
    /// Only the block's own transactions are scanned for claims; `derived`
    /// transactions are passed through to the ledger. If an earlier index
    /// write failed, the missing blocks are replayed first so the index
    /// never skips a height. Returns the number of claims indexed.
    pub fn apply_block(&self, block: &Block, derived: &[Transaction]) -> Result<usize> {
        let _guard = self.write_gate()?;
        let context = format!("apply_block(height={})", block.height);

        self.sync_index()?;

        self.chain
            .apply_block(block, derived)
            .map_err(chain_err(context.as_str()))?;

        self.index.apply_block(block).map_err(|e| {
            error!(
                height = block.height,
                error = %e,
                "Ledger committed but name index did not; next write or recover() replays it"
            );
            e
        })
    }

    /// Bring the index to the ledger head. Caller holds the write gate.
    fn sync_index(&self) -> Result<RecoveryAction> {
        let head = self
            .chain
            .current_head_height()
            .map_err(chain_err("recover"))?;
        let applied = self.index.applied_height()?;

        match applied.cmp(&head) {
            Ordering::Equal => Ok(RecoveryAction::InSync { height: head }),
            Ordering::Less => {
                info!(from = applied + 1, to = head, "Replaying blocks into name index");
                self.replay(applied + 1, head)?;
                Ok(RecoveryAction::Replayed {
                    from: applied + 1,
                    to: head,
                })
            }
            Ordering::Greater => {
                warn!(
                    applied,
                    head, "Name index is ahead of the ledger, rebuilding"
                );
                self.rebuild()?;
                Ok(RecoveryAction::Rebuilt { height: head })
            }
        }
    }

    /// Line the index up with the ledger head.
    pub fn recover(&self) -> Result<RecoveryAction> {
        let _guard = self.write_gate()?;
        self.sync_index()
    }

    /// Discard the index and rebuild it from every block in the ledger.
    ///
    /// Returns the height the index was rebuilt to.
    pub fn reindex(&self) -> Result<u32> {
        let _guard = self.write_gate()?;
        self.rebuild()
    }

    fn rebuild(&self) -> Result<u32> {
        let head = self
            .chain
            .current_head_height()
            .map_err(chain_err("reindex"))?;
        self.index.clear()?;
        self.replay(1, head)?;
        info!(height = head, "Name index rebuilt");
        Ok(head)
    }

    fn replay(&self, from: u32, to: u32) -> Result<()> {
        for height in from..=to {
            let block = self
                .chain
                .fetch_block(height)
                .map_err(chain_err(format!("replay(height={})", height)))?;
            self.index.apply_block(&block)?;
        }
        Ok(())
    }

    /// Point `name` at `reference` directly, bypassing block application
    pub fn set_ref(&self, name: &str, reference: &OutputReference) -> Result<()> {
        let _guard = self.write_gate()?;
        self.index.set_ref(name, reference)
    }

    /// Current reference for `name`
    pub fn get_ref(&self, name: &str) -> Result<OutputReference> {
        let _guard = self.read_gate()?;
        self.index.get_ref(name)
    }

    /// True if `name` has an entry
    pub fn has_ref(&self, name: &str) -> bool {
        match self.read_gate() {
            Ok(_guard) => self.index.has_ref(name),
            Err(_) => false,
        }
    }

    /// See [`NameIndex::scan`]
    ///
    /// Reads only the index, so no gate is held; the predicate may call back
    /// into this `NameDb`, including writes.
    pub fn scan<F>(&self, predicate: F) -> Result<BTreeMap<String, OutputReference>>
    where
        F: FnMut(&str, &OutputReference, &NameIndex) -> bool,
    {
        self.index.scan(predicate)
    }

    /// Full output currently claiming `name`
    pub fn resolve_record(&self, name: &str) -> Result<Output> {
        let _guard = self.read_gate()?;
        let reference = self.index.get_ref(name)?;
        self.chain
            .fetch_output(&reference)
            .map_err(chain_err(format!("resolve_record({})", name)))
    }

    /// Blocks elapsed since the claim's transaction was recorded
    pub fn claim_age(&self, reference: &OutputReference) -> Result<u32> {
        let _guard = self.read_gate()?;
        let context = format!("claim_age({})", reference);

        let location = self
            .chain
            .fetch_transaction_location(&reference.trx_id)
            .map_err(chain_err(context.as_str()))?;
        let head = self
            .chain
            .current_head_height()
            .map_err(chain_err(context.as_str()))?;

        Ok(head.saturating_sub(location.block_number))
    }

    /// Ledger head height
    pub fn head_height(&self) -> Result<u32> {
        let _guard = self.read_gate()?;
        self.chain
            .current_head_height()
            .map_err(chain_err("head_height"))
    }

    /// The underlying index
    pub fn index(&self) -> &NameIndex {
        &self.index
    }

    /// The underlying chain store
    pub fn chain(&self) -> &C {
        &self.chain
    }
}
