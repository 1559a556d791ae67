//! SQLite Chain Store - Reference Append-Only Block Ledger
//!
//! This module provides a durable block ledger implementing [`ChainStore`]:
//! - SQLite backend with WAL mode and full synchronous commits
//! - Strict append-only semantics (no updates or deletes)
//! - Height and previous-block validation at append time
//! - Startup continuity checks for corruption detection
//! - Observability metrics and structured alerting
//!
//! # Layout
//!
//! - `chain_blocks`: one row per block (height, block_id, previous_id, timestamp)
//! - `chain_transactions`: one row per transaction, keyed by trx_id, carrying
//!   its block height, position and JSON body. Derived transactions are
//!   stored after the block's own transactions with `derived = 1`.
//!
//! # Guarantees
//!
//! - Heights increase by exactly 1, starting at 1
//! - Each block's previous_id matches the block_id of its predecessor
//! - A block and all of its transactions commit in one SQLite transaction
//! - Durability: a block is on disk when `apply_block` returns

use crate::chain::{ChainError, ChainStore, Result};
use crate::types::{
    Block, BlockId, Output, OutputReference, Transaction, TransactionLocation, TxId,
};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Chain store health status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChainHealth {
    /// Chain is healthy
    Ok,
    /// Chain is corrupted
    Corrupted {
        /// Last good block height
        last_good_height: Option<u32>,
        /// First failing block height
        first_bad_height: u32,
        /// Error type description
        error_type: String,
    },
}

impl ChainHealth {
    /// Check if the chain is healthy
    pub fn is_ok(&self) -> bool {
        matches!(self, ChainHealth::Ok)
    }
}

/// Observability metrics for the chain store
#[derive(Debug, Default, Clone)]
pub struct ChainMetrics {
    /// Total blocks appended
    pub blocks_applied_total: u64,
    /// Total transactions stored (block and derived)
    pub transactions_stored_total: u64,
    /// Total startup checks performed
    pub startup_checks_total: u64,
    /// Total corruption detections
    pub corruption_detections_total: u64,
}

struct ChainState {
    conn: Connection,
    health: ChainHealth,
    metrics: ChainMetrics,
}

/// Block ledger with SQLite backend
pub struct SqliteChainStore {
    path: PathBuf,
    state: Mutex<Option<ChainState>>,
}

impl SqliteChainStore {
    /// Open a chain store at the specified path
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    /// * `create` - Create the database if it does not exist
    ///
    /// # Returns
    /// * `Ok(SqliteChainStore)` - Successfully opened and continuity-checked
    /// * `Err(ChainError)` - Missing, unreadable or corrupted store
    pub fn open(path: impl AsRef<Path>, create: bool) -> Result<Self> {
        let path = path.as_ref();

        info!(path = %path.display(), create, "Opening chain store");

        if !create && !path.exists() {
            return Err(ChainError::StorageOpen {
                path: path.to_path_buf(),
                reason: "database does not exist".to_string(),
            });
        }

        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if create {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        let open_err = |e: rusqlite::Error| ChainError::StorageOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let conn = Connection::open_with_flags(path, flags).map_err(open_err)?;

        // The ledger is the write-ahead record for the name index, so every
        // commit must reach disk before the index is touched.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(open_err)?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(open_err)?;

        Self::init_schema(&conn).map_err(open_err)?;

        let mut state = ChainState {
            conn,
            health: ChainHealth::Ok,
            metrics: ChainMetrics::default(),
        };

        Self::startup_continuity_check(&mut state)?;

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(Some(state)),
        })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chain_blocks (
                height INTEGER PRIMARY KEY,
                block_id BLOB NOT NULL UNIQUE,
                previous_id BLOB NOT NULL,
                timestamp INTEGER NOT NULL,
                trx_count INTEGER NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000)
            );

            CREATE TABLE IF NOT EXISTS chain_transactions (
                trx_id BLOB PRIMARY KEY,
                block_height INTEGER NOT NULL REFERENCES chain_blocks(height),
                trx_num INTEGER NOT NULL,
                derived INTEGER NOT NULL DEFAULT 0,
                body TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_trx_block ON chain_transactions(block_height, trx_num);
            "#,
        )
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ChainState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.lock().map_err(|_| ChainError::LockPoisoned)?;
        let state = guard.as_mut().ok_or(ChainError::Closed)?;
        f(state)
    }

    fn head_internal(conn: &Connection) -> Result<Option<(u32, BlockId)>> {
        let head = conn
            .query_row(
                "SELECT height, block_id FROM chain_blocks ORDER BY height DESC LIMIT 1",
                [],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, BlockId>(1)?)),
            )
            .optional()?;
        Ok(head)
    }

    /// Verify heights are contiguous from 1 and every previous_id links to
    /// its predecessor.
    fn startup_continuity_check(state: &mut ChainState) -> Result<()> {
        state.metrics.startup_checks_total += 1;

        info!("Starting chain continuity check");

        let blocks: Vec<(u32, BlockId, BlockId)> = {
            let mut stmt = state.conn.prepare(
                "SELECT height, block_id, previous_id FROM chain_blocks ORDER BY height ASC",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        if blocks.is_empty() {
            info!("Chain is empty, continuity check passed");
            return Ok(());
        }

        let mut expected_height = 1u32;
        let mut expected_previous = BlockId::GENESIS;

        for (i, (height, block_id, previous_id)) in blocks.iter().enumerate() {
            let violation = if *height != expected_height {
                Some(format!(
                    "Height gap: expected {}, found {}",
                    expected_height, height
                ))
            } else if *previous_id != expected_previous {
                Some(format!(
                    "Previous-block mismatch at height {}: expected {}, got {}",
                    height, expected_previous, previous_id
                ))
            } else {
                None
            };

            if let Some(error_type) = violation {
                state.health = ChainHealth::Corrupted {
                    last_good_height: if i > 0 { Some(blocks[i - 1].0) } else { None },
                    first_bad_height: *height,
                    error_type: error_type.clone(),
                };
                state.metrics.corruption_detections_total += 1;

                error!(
                    height = height,
                    error_type = %error_type,
                    "Chain corruption detected"
                );

                return Err(ChainError::CorruptionDetected(error_type));
            }

            expected_previous = *block_id;
            expected_height += 1;
        }

        info!(block_count = blocks.len(), "Chain continuity check passed");

        Ok(())
    }

    fn load_transaction(conn: &Connection, trx_id: &TxId) -> Result<Transaction> {
        let body: String = conn
            .query_row(
                "SELECT body FROM chain_transactions WHERE trx_id = ?1",
                [trx_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(ChainError::TransactionNotFound { trx_id: *trx_id })?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Get chain health status
    pub fn health(&self) -> Result<ChainHealth> {
        self.with_state(|state| Ok(state.health.clone()))
    }

    /// Get chain metrics
    pub fn metrics(&self) -> Result<ChainMetrics> {
        self.with_state(|state| Ok(state.metrics.clone()))
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Execute raw SQL for testing purposes only
    ///
    /// **WARNING**: This bypasses continuity checks and exists only so tests
    /// can simulate on-disk corruption.
    #[doc(hidden)]
    pub fn __test_execute_raw_sql(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<usize> {
        self.with_state(|state| Ok(state.conn.execute(sql, params)?))
    }
}

impl ChainStore for SqliteChainStore {
    fn apply_block(&self, block: &Block, derived: &[Transaction]) -> Result<()> {
        self.with_state(|state| {
            if !state.health.is_ok() {
                warn!(height = block.height, "Attempted to append to corrupted chain");
                return Err(ChainError::CorruptionDetected(
                    "Cannot append to corrupted chain".to_string(),
                ));
            }

            let block_id = block.id();
            let tx = state.conn.transaction()?;

            let (expected_height, expected_previous) = match Self::head_internal(&tx)? {
                Some((height, id)) => (height + 1, id),
                None => (1, BlockId::GENESIS),
            };

            if block.height != expected_height {
                return Err(ChainError::HeightViolation {
                    expected: expected_height,
                    actual: block.height,
                });
            }

            if block.previous != expected_previous {
                return Err(ChainError::ChainOrderingViolation {
                    expected: expected_previous,
                    actual: block.previous,
                });
            }

            tx.execute(
                r#"
                INSERT INTO chain_blocks (height, block_id, previous_id, timestamp, trx_count)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    block.height,
                    block_id,
                    block.previous,
                    block.timestamp as i64,
                    block.transactions.len() as i64,
                ],
            )?;

            let first_derived = block.transactions.len();
            for (trx_num, trx) in block.transactions.iter().chain(derived).enumerate() {
                let trx_id = trx.id();
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM chain_transactions WHERE trx_id = ?1)",
                    [trx_id],
                    |row| row.get(0),
                )?;
                if exists {
                    return Err(ChainError::DuplicateTransaction { trx_id });
                }

                tx.execute(
                    r#"
                    INSERT INTO chain_transactions (trx_id, block_height, trx_num, derived, body)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                    params![
                        trx_id,
                        block.height,
                        trx_num as i64,
                        trx_num >= first_derived,
                        serde_json::to_string(trx)?,
                    ],
                )?;
            }

            tx.commit()?;

            state.metrics.blocks_applied_total += 1;
            state.metrics.transactions_stored_total +=
                (block.transactions.len() + derived.len()) as u64;

            debug!(
                height = block.height,
                block_id = %block_id,
                trx_count = block.transactions.len(),
                derived_count = derived.len(),
                "Block appended to chain"
            );

            Ok(())
        })
    }

    fn fetch_block(&self, height: u32) -> Result<Block> {
        self.with_state(|state| {
            let header = state
                .conn
                .query_row(
                    "SELECT previous_id, timestamp FROM chain_blocks WHERE height = ?1",
                    [height],
                    |row| Ok((row.get::<_, BlockId>(0)?, row.get::<_, i64>(1)? as u64)),
                )
                .optional()?;

            let (previous, timestamp) = header.ok_or(ChainError::BlockNotFound { height })?;

            let mut stmt = state.conn.prepare(
                r#"
                SELECT body FROM chain_transactions
                WHERE block_height = ?1 AND derived = 0
                ORDER BY trx_num ASC
                "#,
            )?;
            let bodies = stmt
                .query_map([height], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let transactions = bodies
                .iter()
                .map(|body| serde_json::from_str(body))
                .collect::<std::result::Result<Vec<Transaction>, _>>()?;

            Ok(Block {
                height,
                previous,
                timestamp,
                transactions,
            })
        })
    }

    fn fetch_output(&self, reference: &OutputReference) -> Result<Output> {
        self.with_state(|state| {
            let trx = Self::load_transaction(&state.conn, &reference.trx_id)?;
            trx.outputs
                .into_iter()
                .nth(reference.output_index as usize)
                .ok_or(ChainError::OutputNotFound {
                    reference: *reference,
                })
        })
    }

    fn fetch_transaction_location(&self, trx_id: &TxId) -> Result<TransactionLocation> {
        self.with_state(|state| {
            state
                .conn
                .query_row(
                    "SELECT block_height, trx_num FROM chain_transactions WHERE trx_id = ?1",
                    [trx_id],
                    |row| {
                        Ok(TransactionLocation {
                            block_number: row.get(0)?,
                            trx_num: row.get(1)?,
                        })
                    },
                )
                .optional()?
                .ok_or(ChainError::TransactionNotFound { trx_id: *trx_id })
        })
    }

    fn current_head_height(&self) -> Result<u32> {
        self.with_state(|state| {
            Ok(Self::head_internal(&state.conn)?
                .map(|(height, _)| height)
                .unwrap_or(0))
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.state.lock().map_err(|_| ChainError::LockPoisoned)?;
        if let Some(state) = guard.take() {
            state.conn.close().map_err(|(_, e)| ChainError::DatabaseError(e))?;
            info!(path = %self.path.display(), "Chain store closed");
        }
        Ok(())
    }
}
