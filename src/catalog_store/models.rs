//! Catalog entity models.
//!
//! Every entity is keyed by the identifier assigned by the source catalog and
//! carries the content hash of its last persisted field values. The hash is
//! excluded from serialization so that serializing an entity yields exactly
//! the fields that contribute to its fingerprint.

use rusqlite::types::Value;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// A catalog table row that can be fingerprinted and bulk upserted.
pub trait CatalogEntity: Serialize {
    /// Table the entity is persisted to, keyed by `id`.
    const TABLE: &'static str;

    /// Payload columns, in the order produced by [`CatalogEntity::column_values`].
    /// `id`, `content_hash` and the bookkeeping timestamps are handled by the writer.
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> i64;

    fn content_hash(&self) -> &str;

    fn set_content_hash(&mut self, hash: String);

    fn column_values(&self) -> serde_json::Result<Vec<Value>>;
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn opt_text(value: &Option<String>) -> Value {
    match value {
        Some(v) => Value::Text(v.clone()),
        None => Value::Null,
    }
}

fn opt_int<T: Into<i64> + Copy>(value: Option<T>) -> Value {
    match value {
        Some(v) => Value::Integer(v.into()),
        None => Value::Null,
    }
}

fn json<T: Serialize>(value: &T) -> serde_json::Result<Value> {
    serde_json::to_string(value).map(Value::Text)
}

// =============================================================================
// Artist
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub real_name: Option<String>,
    pub profile: Option<String>,
    pub data_quality: Option<String>,
    /// Sorted, deduplicated.
    pub name_variations: Vec<String>,
    #[serde(skip)]
    pub content_hash: String,
}

impl CatalogEntity for Artist {
    const TABLE: &'static str = "artists";
    const COLUMNS: &'static [&'static str] =
        &["name", "real_name", "profile", "data_quality", "name_variations"];

    fn id(&self) -> i64 {
        self.id
    }

    fn content_hash(&self) -> &str {
        &self.content_hash
    }

    fn set_content_hash(&mut self, hash: String) {
        self.content_hash = hash;
    }

    fn column_values(&self) -> serde_json::Result<Vec<Value>> {
        Ok(vec![
            text(&self.name),
            opt_text(&self.real_name),
            opt_text(&self.profile),
            opt_text(&self.data_quality),
            json(&self.name_variations)?,
        ])
    }
}

// =============================================================================
// Label
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
    pub contact_info: Option<String>,
    pub profile: Option<String>,
    pub parent_label_id: Option<i64>,
    pub data_quality: Option<String>,
    #[serde(skip)]
    pub content_hash: String,
}

impl CatalogEntity for Label {
    const TABLE: &'static str = "labels";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "contact_info",
        "profile",
        "parent_label_id",
        "data_quality",
    ];

    fn id(&self) -> i64 {
        self.id
    }

    fn content_hash(&self) -> &str {
        &self.content_hash
    }

    fn set_content_hash(&mut self, hash: String) {
        self.content_hash = hash;
    }

    fn column_values(&self) -> serde_json::Result<Vec<Value>> {
        Ok(vec![
            text(&self.name),
            opt_text(&self.contact_info),
            opt_text(&self.profile),
            opt_int(self.parent_label_id),
            opt_text(&self.data_quality),
        ])
    }
}

// =============================================================================
// Master
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Master {
    pub id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub main_release_id: Option<i64>,
    pub data_quality: Option<String>,
    /// Sorted, deduplicated.
    pub genres: Vec<String>,
    /// Sorted, deduplicated.
    pub styles: Vec<String>,
    /// Artists credited on the master, sorted and deduplicated.
    pub artist_ids: Vec<i64>,
    #[serde(skip)]
    pub content_hash: String,
}

impl CatalogEntity for Master {
    const TABLE: &'static str = "masters";
    const COLUMNS: &'static [&'static str] =
        &["title", "year", "main_release_id", "data_quality", "styles"];

    fn id(&self) -> i64 {
        self.id
    }

    fn content_hash(&self) -> &str {
        &self.content_hash
    }

    fn set_content_hash(&mut self, hash: String) {
        self.content_hash = hash;
    }

    fn column_values(&self) -> serde_json::Result<Vec<Value>> {
        Ok(vec![
            text(&self.title),
            opt_int(self.year),
            opt_int(self.main_release_id),
            opt_text(&self.data_quality),
            json(&self.styles)?,
        ])
    }
}

// =============================================================================
// Release
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ReleaseFormat {
    pub name: String,
    pub quantity: Option<i32>,
    pub text: Option<String>,
    pub descriptions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Track {
    pub position: String,
    pub title: String,
    pub duration: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ReleaseLabel {
    pub label_id: i64,
    pub catalog_number: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Release {
    pub id: i64,
    pub title: String,
    pub country: Option<String>,
    /// Release date as published, e.g. `1977-02-04`, `1977-02-00` or `1977`.
    pub released: Option<String>,
    pub year: Option<i32>,
    pub master_id: Option<i64>,
    pub data_quality: Option<String>,
    /// In source order; the first entry is the primary format.
    pub formats: Vec<ReleaseFormat>,
    /// In source order.
    pub tracklist: Vec<Track>,
    /// Sorted, deduplicated.
    pub genres: Vec<String>,
    /// Sorted, deduplicated.
    pub styles: Vec<String>,
    /// Sorted, deduplicated.
    pub artist_ids: Vec<i64>,
    /// Sorted, deduplicated.
    pub labels: Vec<ReleaseLabel>,
    #[serde(skip)]
    pub content_hash: String,
}

impl Release {
    /// Name of the first listed format.
    pub fn primary_format(&self) -> Option<&str> {
        self.formats.first().map(|f| f.name.as_str())
    }
}

impl CatalogEntity for Release {
    const TABLE: &'static str = "releases";
    const COLUMNS: &'static [&'static str] = &[
        "title",
        "country",
        "released",
        "year",
        "master_id",
        "format",
        "formats",
        "tracklist",
        "styles",
        "data_quality",
    ];

    fn id(&self) -> i64 {
        self.id
    }

    fn content_hash(&self) -> &str {
        &self.content_hash
    }

    fn set_content_hash(&mut self, hash: String) {
        self.content_hash = hash;
    }

    fn column_values(&self) -> serde_json::Result<Vec<Value>> {
        Ok(vec![
            text(&self.title),
            opt_text(&self.country),
            opt_text(&self.released),
            opt_int(self.year),
            opt_int(self.master_id),
            self.primary_format().map(text).unwrap_or(Value::Null),
            json(&self.formats)?,
            json(&self.tracklist)?,
            json(&self.styles)?,
            opt_text(&self.data_quality),
        ])
    }
}

// =============================================================================
// Genre
// =============================================================================

/// A genre derived from the genre names listed on masters and releases.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
    #[serde(skip)]
    pub content_hash: String,
}

impl Genre {
    /// Keeps the spelling given; only the id is case-insensitive.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        Genre {
            id: genre_id(name),
            name: name.to_string(),
            content_hash: String::new(),
        }
    }
}

/// Stable identifier for a genre name.
///
/// The dumps only carry genre names, so the key is the first 63 bits of the
/// SHA-256 of the trimmed, lowercased name.
pub fn genre_id(name: &str) -> i64 {
    let digest = Sha256::digest(name.trim().to_lowercase().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) >> 1) as i64
}

impl CatalogEntity for Genre {
    const TABLE: &'static str = "genres";
    const COLUMNS: &'static [&'static str] = &["name"];

    fn id(&self) -> i64 {
        self.id
    }

    fn content_hash(&self) -> &str {
        &self.content_hash
    }

    fn set_content_hash(&mut self, hash: String) {
        self.content_hash = hash;
    }

    fn column_values(&self) -> serde_json::Result<Vec<Value>> {
        Ok(vec![text(&self.name)])
    }
}
