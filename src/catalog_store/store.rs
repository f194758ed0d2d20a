//! SQLite-backed catalog store.
//!
//! Owns the single write connection to the catalog database. All mutation
//! goes through [`SqliteCatalogStore::write_unit`], which hands the caller an
//! explicit transaction scoped to one chunk of work.

use super::associations::AssociationKind;
use super::models::CatalogEntity;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::migrate_if_needed;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params_from_iter, Connection, OpenFlags, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

/// Upper bound on `?` placeholders in one statement (SQLite >= 3.32 default).
pub const MAX_BOUND_PARAMETERS: usize = 32_766;

/// Row counts of the catalog tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub artists: i64,
    pub labels: i64,
    pub masters: i64,
    pub releases: i64,
    pub genres: i64,
}

#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    /// Open (or create) the catalog database at `db_path`.
    ///
    /// `op_timeout` bounds how long a single statement waits on a locked
    /// database before failing.
    pub fn new<P: AsRef<Path>>(db_path: P, op_timeout: Duration) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open catalog database")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn, op_timeout)
    }

    /// In-memory catalog, for tests.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, Duration::from_secs(5))
    }

    fn init(mut conn: Connection, op_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(op_timeout)?;
        migrate_if_needed(&mut conn, CATALOG_VERSIONED_SCHEMAS, "catalog")?;

        let store = SqliteCatalogStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        let counts = store.get_counts()?;
        info!(
            "Opened catalog: {} artists, {} labels, {} masters, {} releases, {} genres",
            counts.artists, counts.labels, counts.masters, counts.releases, counts.genres
        );
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("catalog connection mutex poisoned"))
    }

    /// Run `work` inside one immediate transaction and commit it.
    ///
    /// If `work` fails the transaction is rolled back; nothing it wrote is
    /// kept.
    pub fn write_unit<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = work(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Stored content hashes for exactly the given identifiers.
    ///
    /// Identifiers without a row are absent from the returned map.
    pub fn fetch_content_hashes<T: CatalogEntity>(&self, ids: &[i64]) -> Result<HashMap<i64, String>> {
        let conn = self.lock()?;
        let mut hashes = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BOUND_PARAMETERS) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT id, content_hash FROM {} WHERE id IN ({})",
                T::TABLE,
                placeholders
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (id, hash) = row?;
                hashes.insert(id, hash);
            }
        }
        Ok(hashes)
    }

    pub fn get_counts(&self) -> Result<CatalogCounts> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
        };
        Ok(CatalogCounts {
            artists: count("artists")?,
            labels: count("labels")?,
            masters: count("masters")?,
            releases: count("releases")?,
            genres: count("genres")?,
        })
    }

    pub fn association_count(&self, kind: AssociationKind) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table()),
            [],
            |r| r.get(0),
        )?)
    }

    /// All pairs of one association table, ordered by (left, right).
    pub fn association_pairs(&self, kind: AssociationKind) -> Result<Vec<(i64, i64)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {left}, {right} FROM {table} ORDER BY {left}, {right}",
            left = kind.left_column(),
            right = kind.right_column(),
            table = kind.table()
        ))?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(i64, i64)>>>()?;
        Ok(pairs)
    }
}
