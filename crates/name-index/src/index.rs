//! Durable name → output-reference map
//!
//! One SQLite table keyed by name. Keys sort by byte order of their UTF-8
//! encoding (SQLite's BINARY collation), which is the same order `String`
//! uses, so scan results line up with `BTreeMap<String, _>` iteration.
//!
//! The index also records the height of the last block folded into it. That
//! marker commits in the same SQLite transaction as the block's entries, so
//! after a crash the index is always exactly "all blocks up to
//! `applied_height`".

use crate::error::{db_err, IndexError, Result};
use namechain_core::{Block, OutputReference, TxId};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Longest accepted name, in bytes
pub const MAX_NAME_LEN: usize = 255;

/// Rows fetched per round trip while scanning
const SCAN_BATCH: i64 = 128;

const APPLIED_HEIGHT_KEY: &str = "applied_height";

/// Reject names the index will not store
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(IndexError::InvalidArgument(
            "name cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(IndexError::InvalidArgument(format!(
            "name is {} bytes, limit is {}",
            name.len(),
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// Name index backed by SQLite
pub struct NameIndex {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl NameIndex {
    /// Open the index at `location`
    ///
    /// # Arguments
    /// * `location` - Path to the SQLite database file
    /// * `create` - Create the database if it does not exist
    ///
    /// # Returns
    /// * `Ok(NameIndex)` - Opened and integrity-checked
    /// * `Err(IndexError::StorageOpen)` - Missing (without `create`), inaccessible or corrupt
    pub fn open(location: impl AsRef<Path>, create: bool) -> Result<Self> {
        let path = location.as_ref().to_path_buf();

        info!(path = %path.display(), create, "Opening name index");

        let open_err = |reason: String| IndexError::StorageOpen {
            path: path.clone(),
            reason,
        };

        if !create && !path.exists() {
            return Err(open_err("database does not exist".to_string()));
        }

        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if create {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| open_err(e.to_string()))?;
            }
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        let conn =
            Connection::open_with_flags(&path, flags).map_err(|e| open_err(e.to_string()))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| open_err(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| open_err(e.to_string()))?;

        let check: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(|e| open_err(e.to_string()))?;
        if check != "ok" {
            return Err(open_err(format!("integrity check failed: {}", check)));
        }

        Self::init_schema(&conn).map_err(|e| open_err(e.to_string()))?;

        Ok(Self {
            path,
            conn: Mutex::new(Some(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS name_refs (
                name TEXT PRIMARY KEY NOT NULL,
                trx_id BLOB NOT NULL,
                output_index INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY NOT NULL,
                value INTEGER NOT NULL
            );
            "#,
        )
    }

    /// Release the database. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().map_err(|_| IndexError::LockPoisoned)?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| IndexError::Database {
                context: "close".to_string(),
                source: e,
            })?;
            info!(path = %self.path.display(), "Name index closed");
        }
        Ok(())
    }

    /// True until `close` is called
    pub fn is_open(&self) -> bool {
        self.conn
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Database file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().map_err(|_| IndexError::LockPoisoned)?;
        let conn = guard.as_mut().ok_or(IndexError::Closed)?;
        f(conn)
    }

    fn store_ref(conn: &Connection, name: &str, reference: &OutputReference) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO name_refs (name, trx_id, output_index) VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                trx_id = excluded.trx_id,
                output_index = excluded.output_index
            "#,
            params![name, reference.trx_id, reference.output_index],
        )
        .map_err(db_err(format!("set_ref({})", name)))?;
        Ok(())
    }

    /// Point `name` at `reference`, replacing any previous entry
    pub fn set_ref(&self, name: &str, reference: &OutputReference) -> Result<()> {
        validate_name(name)?;
        self.with_conn(|conn| Self::store_ref(conn, name, reference))?;
        debug!(name = %name, reference = %reference, "Name reference stored");
        Ok(())
    }

    /// Current reference for `name`
    pub fn get_ref(&self, name: &str) -> Result<OutputReference> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT trx_id, output_index FROM name_refs WHERE name = ?1",
                [name],
                |row| Ok(OutputReference::new(row.get::<_, TxId>(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err(format!("get_ref({})", name)))?
            .ok_or_else(|| IndexError::NotFound {
                name: name.to_string(),
            })
        })
    }

    /// True if `name` has an entry. Never fails; storage faults count as absent.
    pub fn has_ref(&self, name: &str) -> bool {
        let found = self.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM name_refs WHERE name = ?1)",
                [name],
                |row| row.get::<_, bool>(0),
            )
            .map_err(db_err(format!("has_ref({})", name)))
        });

        match found {
            Ok(found) => found,
            Err(e) => {
                warn!(name = %name, error = %e, "has_ref treated storage failure as absent");
                false
            }
        }
    }

    /// Collect every entry accepted by `predicate`, in ascending key order.
    ///
    /// The largest key present when the scan starts is the boundary; the scan
    /// ends right after that entry is tested. Keys inserted past the boundary
    /// while scanning are never visited. The connection is not held while the
    /// predicate runs, so the predicate may read or write the index.
    pub fn scan<F>(&self, mut predicate: F) -> Result<BTreeMap<String, OutputReference>>
    where
        F: FnMut(&str, &OutputReference, &NameIndex) -> bool,
    {
        let mut matches = BTreeMap::new();

        let boundary: Option<String> = self.with_conn(|conn| {
            conn.query_row("SELECT MAX(name) FROM name_refs", [], |row| row.get(0))
                .map_err(db_err("scan"))
        })?;

        let Some(boundary) = boundary else {
            return Ok(matches);
        };

        let mut cursor: Option<String> = None;

        loop {
            let batch = self.with_conn(|conn| Self::scan_batch(conn, cursor.as_deref(), &boundary))?;

            if batch.is_empty() {
                warn!(boundary = %boundary, "Scan boundary vanished before it was reached");
                return Ok(matches);
            }

            for (name, reference) in batch {
                if predicate(&name, &reference, self) {
                    matches.insert(name.clone(), reference);
                }

                if name == boundary {
                    debug!(matched = matches.len(), "Scan reached boundary key");
                    return Ok(matches);
                }

                cursor = Some(name);
            }
        }
    }

    fn scan_batch(
        conn: &Connection,
        after: Option<&str>,
        boundary: &str,
    ) -> Result<Vec<(String, OutputReference)>> {
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, OutputReference)> {
            Ok((
                row.get::<_, String>(0)?,
                OutputReference::new(row.get::<_, TxId>(1)?, row.get(2)?),
            ))
        };

        let rows = match after {
            None => {
                let mut stmt = conn
                    .prepare_cached(
                        r#"
                        SELECT name, trx_id, output_index FROM name_refs
                        WHERE name <= ?1
                        ORDER BY name ASC
                        LIMIT ?2
                        "#,
                    )
                    .map_err(db_err("scan"))?;
                let rows = stmt
                    .query_map(params![boundary, SCAN_BATCH], map_row)
                    .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                    .map_err(db_err("scan"))?;
                rows
            }
            Some(after) => {
                let mut stmt = conn
                    .prepare_cached(
                        r#"
                        SELECT name, trx_id, output_index FROM name_refs
                        WHERE name > ?1 AND name <= ?2
                        ORDER BY name ASC
                        LIMIT ?3
                        "#,
                    )
                    .map_err(db_err(format!("scan(after={})", after)))?;
                let rows = stmt
                    .query_map(params![after, boundary, SCAN_BATCH], map_row)
                    .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                    .map_err(db_err(format!("scan(after={})", after)))?;
                rows
            }
        };

        Ok(rows)
    }

    /// Fold every name claim in `block` into the index and advance the
    /// applied-height marker, all in one SQLite transaction.
    ///
    /// Claims are applied in transaction order, then output order, so the
    /// last claim for a name in the block wins. Every claim the ledger
    /// accepted is indexed; name rules apply only to `set_ref`. The block
    /// must be the one right after `applied_height`, otherwise nothing is
    /// written and `HeightMismatch` is returned. Returns the number of
    /// claims indexed.
    pub fn apply_block(&self, block: &Block) -> Result<usize> {
        let context = format!("apply_block(height={})", block.height);

        let indexed = self.with_conn(|conn| {
            let tx = conn.transaction().map_err(db_err(context.as_str()))?;

            let expected = Self::applied_height_in(&tx)? + 1;
            if block.height != expected {
                return Err(IndexError::HeightMismatch {
                    expected,
                    actual: block.height,
                });
            }

            let mut indexed = 0usize;
            for trx in &block.transactions {
                for (reference, claim) in trx.name_claims() {
                    Self::store_ref(&tx, &claim.name, &reference)?;
                    indexed += 1;
                }
            }

            tx.execute(
                r#"
                INSERT INTO index_meta (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
                params![APPLIED_HEIGHT_KEY, block.height],
            )
            .map_err(db_err(context.as_str()))?;

            tx.commit().map_err(db_err(context.as_str()))?;
            Ok(indexed)
        })?;

        debug!(height = block.height, indexed, "Block folded into name index");

        Ok(indexed)
    }

    fn applied_height_in(conn: &Connection) -> Result<u32> {
        let height = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                [APPLIED_HEIGHT_KEY],
                |row| row.get::<_, u32>(0),
            )
            .optional()
            .map_err(db_err("applied_height"))?;
        Ok(height.unwrap_or(0))
    }

    /// Height of the last block folded in by `apply_block`; 0 if none
    pub fn applied_height(&self) -> Result<u32> {
        self.with_conn(|conn| Self::applied_height_in(conn))
    }

    /// Number of names in the index
    pub fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM name_refs", [], |row| row.get(0))
                .map_err(db_err("len"))?;
            Ok(count as usize)
        })
    }

    /// True if no names are indexed
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Execute raw SQL for testing purposes only
    ///
    /// **WARNING**: This bypasses the index's invariants and exists only so
    /// tests can simulate storage failures.
    #[doc(hidden)]
    pub fn __test_execute_raw_sql(&self, sql: &str) -> Result<()> {
        self.with_conn(|conn| conn.execute_batch(sql).map_err(db_err("raw_sql")))
    }

    /// Drop every entry and reset the applied-height marker.
    ///
    /// Only used to rebuild the index from the ledger.
    pub(crate) fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction().map_err(db_err("clear"))?;
            tx.execute_batch("DELETE FROM name_refs; DELETE FROM index_meta;")
                .map_err(db_err("clear"))?;
            tx.commit().map_err(db_err("clear"))?;
            Ok(())
        })?;

        info!(path = %self.path.display(), "Name index cleared");
        Ok(())
    }
}
