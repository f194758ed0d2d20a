mod associations;
mod models;
mod schema;
mod store;
mod upsert;

pub use associations::{AssociationBuilder, AssociationKind, AssociationReport};
pub use models::*;
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use store::{CatalogCounts, SqliteCatalogStore, MAX_BOUND_PARAMETERS};
pub use upsert::{upsert_chunk, BatchUpsertWriter, DEFAULT_CHUNK_SIZE};
