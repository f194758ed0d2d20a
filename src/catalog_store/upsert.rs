//! Generic conflict-aware bulk upsert.
//!
//! One statement per chunk:
//!
//! ```sql
//! INSERT INTO <table> (id, <columns>, content_hash, updated_at)
//! VALUES (...), (...)
//! ON CONFLICT(id) DO UPDATE SET <column> = excluded.<column>, ...
//! WHERE <table>.content_hash IS NOT excluded.content_hash
//! ```
//!
//! Rows whose stored hash already matches are left untouched, so replaying a
//! chunk affects zero rows.

use super::models::CatalogEntity;
use super::store::{SqliteCatalogStore, MAX_BOUND_PARAMETERS};
use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Transaction};
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 2000;

/// Writes entities in bounded chunks, one transaction per chunk.
#[derive(Debug, Clone, Copy)]
pub struct BatchUpsertWriter {
    chunk_size: usize,
}

impl Default for BatchUpsertWriter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl BatchUpsertWriter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Rows per statement for `T`, bounded by the configured chunk size and by
    /// the number of placeholders SQLite accepts.
    pub fn effective_chunk_size<T: CatalogEntity>(&self) -> usize {
        let per_row = params_per_row::<T>();
        self.chunk_size.min(MAX_BOUND_PARAMETERS / per_row).max(1)
    }

    /// Persist `rows`, returning the number of rows inserted or changed.
    ///
    /// A failing chunk is rolled back and its error returned; chunks committed
    /// before it stay committed.
    pub fn write<T: CatalogEntity>(&self, store: &SqliteCatalogStore, rows: &[T]) -> Result<usize> {
        let chunk_size = self.effective_chunk_size::<T>();
        let mut affected = 0;
        for (index, chunk) in rows.chunks(chunk_size).enumerate() {
            let written = store
                .write_unit(|tx| upsert_chunk(tx, chunk))
                .with_context(|| {
                    format!(
                        "Upsert of {} chunk {} ({} rows) failed",
                        T::TABLE,
                        index,
                        chunk.len()
                    )
                })?;
            affected += written;
        }
        if !rows.is_empty() {
            debug!(
                table = T::TABLE,
                submitted = rows.len(),
                affected,
                "Upserted batch"
            );
        }
        Ok(affected)
    }
}

fn params_per_row<T: CatalogEntity>() -> usize {
    // id + payload + content_hash
    T::COLUMNS.len() + 2
}

fn upsert_sql<T: CatalogEntity>(row_count: usize) -> String {
    let placeholders = vec!["?"; params_per_row::<T>()].join(", ");
    let row = format!("({}, cast(strftime('%s','now') as int))", placeholders);
    let values = vec![row.as_str(); row_count].join(", ");

    let assignments = T::COLUMNS
        .iter()
        .chain(["content_hash", "updated_at"].iter())
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {table} (id, {columns}, content_hash, updated_at) VALUES {values} \
         ON CONFLICT(id) DO UPDATE SET {assignments} \
         WHERE {table}.content_hash IS NOT excluded.content_hash",
        table = T::TABLE,
        columns = T::COLUMNS.join(", "),
    )
}

/// Upsert one chunk inside the caller's transaction.
///
/// Every row must already carry its current content hash.
pub fn upsert_chunk<T: CatalogEntity>(tx: &Transaction, rows: &[T]) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut values: Vec<Value> = Vec::with_capacity(rows.len() * params_per_row::<T>());
    for row in rows {
        values.push(Value::Integer(row.id()));
        values.extend(
            row.column_values()
                .with_context(|| format!("Failed to encode {} row {}", T::TABLE, row.id()))?,
        );
        values.push(Value::Text(row.content_hash().to_string()));
    }

    let mut stmt = tx.prepare_cached(&upsert_sql::<T>(rows.len()))?;
    Ok(stmt.execute(params_from_iter(values))?)
}
