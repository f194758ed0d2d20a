//! Schema of the sync state database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const IMPORT_RUNS_TABLE: Table = Table {
    name: "import_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("period", &SqlType::Text, non_null = true), // YYYY-MM
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true), // RFC 3339
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
        sqlite_column!("finished_at", &SqlType::Text),
        sqlite_column!("stats", &SqlType::Text), // JSON
    ],
    indices: &[
        ("idx_import_runs_period", "period"),
        ("idx_import_runs_status", "status"),
    ],
    unique_constraints: &[],
};

pub const SYNC_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[IMPORT_RUNS_TABLE],
    migration: None,
}];
