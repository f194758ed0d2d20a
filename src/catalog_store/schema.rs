//! SQLite schema definitions for the vinyl catalog database.
//!
//! Entity tables are keyed by the identifier assigned by the source catalog
//! and carry a `content_hash` column holding the fingerprint of the persisted
//! values. Association tables are pure pairs with a unique constraint.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

// =============================================================================
// Entity Tables
// =============================================================================

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("real_name", &SqlType::Text),
        sqlite_column!("profile", &SqlType::Text),
        sqlite_column!("data_quality", &SqlType::Text),
        sqlite_column!("name_variations", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("content_hash", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_artists_name", "name")],
    unique_constraints: &[],
};

const LABELS_TABLE: Table = Table {
    name: "labels",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("contact_info", &SqlType::Text),
        sqlite_column!("profile", &SqlType::Text),
        sqlite_column!("parent_label_id", &SqlType::Integer),
        sqlite_column!("data_quality", &SqlType::Text),
        sqlite_column!("content_hash", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_labels_name", "name")],
    unique_constraints: &[],
};

const MASTERS_TABLE: Table = Table {
    name: "masters",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("main_release_id", &SqlType::Integer),
        sqlite_column!("data_quality", &SqlType::Text),
        sqlite_column!("styles", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("content_hash", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_masters_title", "title")],
    unique_constraints: &[],
};

const RELEASES_TABLE: Table = Table {
    name: "releases",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("country", &SqlType::Text),
        sqlite_column!("released", &SqlType::Text),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("master_id", &SqlType::Integer),
        sqlite_column!("format", &SqlType::Text),
        sqlite_column!("formats", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("tracklist", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("styles", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("data_quality", &SqlType::Text),
        sqlite_column!("content_hash", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_releases_master", "master_id"),
        ("idx_releases_year", "year"),
    ],
    unique_constraints: &[],
};

const GENRES_TABLE: Table = Table {
    name: "genres",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("content_hash", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

// =============================================================================
// Association Tables
// =============================================================================

const MASTER_ARTISTS_TABLE: Table = Table {
    name: "master_artists",
    columns: &[
        sqlite_column!("master_id", &SqlType::Integer, non_null = true),
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_master_artists_artist", "artist_id")],
    unique_constraints: &[&["master_id", "artist_id"]],
};

const MASTER_GENRES_TABLE: Table = Table {
    name: "master_genres",
    columns: &[
        sqlite_column!("master_id", &SqlType::Integer, non_null = true),
        sqlite_column!("genre_id", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_master_genres_genre", "genre_id")],
    unique_constraints: &[&["master_id", "genre_id"]],
};

const RELEASE_ARTISTS_TABLE: Table = Table {
    name: "release_artists",
    columns: &[
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_release_artists_artist", "artist_id")],
    unique_constraints: &[&["release_id", "artist_id"]],
};

const RELEASE_LABELS_TABLE: Table = Table {
    name: "release_labels",
    columns: &[
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("label_id", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_release_labels_label", "label_id")],
    unique_constraints: &[&["release_id", "label_id"]],
};

const RELEASE_GENRES_TABLE: Table = Table {
    name: "release_genres",
    columns: &[
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("genre_id", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_release_genres_genre", "genre_id")],
    unique_constraints: &[&["release_id", "genre_id"]],
};

// =============================================================================
// Versioned Schema Definition
// =============================================================================

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        ARTISTS_TABLE,
        LABELS_TABLE,
        MASTERS_TABLE,
        RELEASES_TABLE,
        GENRES_TABLE,
        MASTER_ARTISTS_TABLE,
        MASTER_GENRES_TABLE,
        RELEASE_ARTISTS_TABLE,
        RELEASE_LABELS_TABLE,
        RELEASE_GENRES_TABLE,
    ],
    migration: None,
}];
