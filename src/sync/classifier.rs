//! Insert / Update / Skip classification of a decoded batch.

use super::fingerprint::content_hash;
use crate::catalog_store::CatalogEntity;
use std::collections::HashMap;

/// A batch split by what has to be written. Each partition keeps the input
/// order of its records.
#[derive(Debug)]
pub struct Classification<T> {
    pub inserts: Vec<T>,
    pub updates: Vec<T>,
    pub skipped: Vec<T>,
}

impl<T> Default for Classification<T> {
    fn default() -> Self {
        Self {
            inserts: Vec::new(),
            updates: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Fingerprint every record and classify it against `existing`, the stored
/// hashes of the batch's identifiers.
///
/// An identifier absent from `existing` is an insert regardless of its hash.
/// When an identifier occurs more than once in the batch, later occurrences
/// are compared with the first one.
pub fn classify<T: CatalogEntity>(
    records: Vec<T>,
    existing: &HashMap<i64, String>,
) -> Classification<T> {
    let mut result = Classification::default();
    let mut first_seen: HashMap<i64, String> = HashMap::new();

    for mut record in records {
        let hash = content_hash(&record);
        record.set_content_hash(hash.clone());

        let id = record.id();
        let changed = match first_seen.get(&id).map(|first| *first != hash) {
            Some(changed) => Some(changed),
            None => {
                let changed = existing.get(&id).map(|stored| *stored != hash);
                first_seen.insert(id, hash);
                changed
            }
        };

        match changed {
            None => result.inserts.push(record),
            Some(true) => result.updates.push(record),
            Some(false) => result.skipped.push(record),
        }
    }
    result
}
