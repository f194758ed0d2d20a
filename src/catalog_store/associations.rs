//! Bulk insertion of many-to-many relationship rows.
//!
//! Every association table goes through [`AssociationBuilder::persist`]. It
//! takes only the exact pairs a record mentions, sorts and deduplicates them,
//! and inserts them with a statement that joins both entity tables so a pair
//! whose member is not persisted is dropped inside the same statement.

use super::store::MAX_BOUND_PARAMETERS;
use anyhow::{Context, Result};
use rusqlite::{params_from_iter, Transaction};
use std::collections::BTreeSet;
use std::fmt;

/// The association tables of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssociationKind {
    MasterArtist,
    MasterGenre,
    ReleaseArtist,
    ReleaseLabel,
    ReleaseGenre,
}

impl AssociationKind {
    pub const ALL: [AssociationKind; 5] = [
        AssociationKind::MasterArtist,
        AssociationKind::MasterGenre,
        AssociationKind::ReleaseArtist,
        AssociationKind::ReleaseLabel,
        AssociationKind::ReleaseGenre,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            AssociationKind::MasterArtist => "master_artists",
            AssociationKind::MasterGenre => "master_genres",
            AssociationKind::ReleaseArtist => "release_artists",
            AssociationKind::ReleaseLabel => "release_labels",
            AssociationKind::ReleaseGenre => "release_genres",
        }
    }

    pub fn left_column(&self) -> &'static str {
        match self {
            AssociationKind::MasterArtist | AssociationKind::MasterGenre => "master_id",
            _ => "release_id",
        }
    }

    pub fn right_column(&self) -> &'static str {
        match self {
            AssociationKind::MasterArtist | AssociationKind::ReleaseArtist => "artist_id",
            AssociationKind::MasterGenre | AssociationKind::ReleaseGenre => "genre_id",
            AssociationKind::ReleaseLabel => "label_id",
        }
    }

    pub fn left_table(&self) -> &'static str {
        match self {
            AssociationKind::MasterArtist | AssociationKind::MasterGenre => "masters",
            _ => "releases",
        }
    }

    pub fn right_table(&self) -> &'static str {
        match self {
            AssociationKind::MasterArtist | AssociationKind::ReleaseArtist => "artists",
            AssociationKind::MasterGenre | AssociationKind::ReleaseGenre => "genres",
            AssociationKind::ReleaseLabel => "labels",
        }
    }

    fn insert_sql(&self, pair_count: usize) -> String {
        let values = vec!["(?, ?)"; pair_count].join(", ");
        format!(
            "INSERT INTO {table} ({left}, {right}) \
             SELECT p.column1, p.column2 FROM (VALUES {values}) AS p \
             JOIN {left_table} l ON l.id = p.column1 \
             JOIN {right_table} r ON r.id = p.column2 \
             WHERE true \
             ORDER BY p.column1, p.column2 \
             ON CONFLICT ({left}, {right}) DO NOTHING",
            table = self.table(),
            left = self.left_column(),
            right = self.right_column(),
            left_table = self.left_table(),
            right_table = self.right_table(),
        )
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Outcome of one [`AssociationBuilder::persist`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssociationReport {
    /// Distinct pairs submitted.
    pub submitted: usize,
    /// Rows actually added. Pairs that already existed or that reference an
    /// unknown entity are not counted.
    pub inserted: usize,
}

impl AssociationReport {
    pub fn merge(&mut self, other: AssociationReport) {
        self.submitted += other.submitted;
        self.inserted += other.inserted;
    }
}

pub struct AssociationBuilder;

impl AssociationBuilder {
    /// Pairs per statement.
    pub const CHUNK_PAIRS: usize = MAX_BOUND_PARAMETERS / 2;

    /// Insert `pairs` into the `kind` association table within `tx`.
    ///
    /// Pairs are `(left id, right id)`, e.g. `(master_id, artist_id)`. They
    /// are deduplicated and inserted in ascending order. If any statement
    /// fails the error is returned and the caller's transaction is expected
    /// to roll back, so no part of the call is kept.
    pub fn persist<I>(tx: &Transaction, kind: AssociationKind, pairs: I) -> Result<AssociationReport>
    where
        I: IntoIterator<Item = (i64, i64)>,
    {
        let ordered: Vec<(i64, i64)> = pairs.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let mut report = AssociationReport {
            submitted: ordered.len(),
            inserted: 0,
        };

        for chunk in ordered.chunks(Self::CHUNK_PAIRS) {
            let mut stmt = tx.prepare_cached(&kind.insert_sql(chunk.len()))?;
            let params = chunk.iter().flat_map(|(left, right)| [*left, *right]);
            report.inserted += stmt
                .execute(params_from_iter(params))
                .with_context(|| format!("Failed to insert {} pairs into {}", chunk.len(), kind))?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::store::SqliteCatalogStore;

    fn seed(store: &SqliteCatalogStore, sql: &[&str]) {
        store
            .write_unit(|tx| {
                for statement in sql {
                    tx.execute(statement, [])?;
                }
                Ok(())
            })
            .unwrap();
    }

    fn seeded_store() -> SqliteCatalogStore {
        let store = SqliteCatalogStore::in_memory().unwrap();
        seed(
            &store,
            &[
                "INSERT INTO artists (id, name, name_variations, content_hash, updated_at) VALUES (1, 'A1', '[]', 'h', 0)",
                "INSERT INTO artists (id, name, name_variations, content_hash, updated_at) VALUES (2, 'A2', '[]', 'h', 0)",
                "INSERT INTO artists (id, name, name_variations, content_hash, updated_at) VALUES (3, 'A3', '[]', 'h', 0)",
                "INSERT INTO masters (id, title, styles, content_hash, updated_at) VALUES (10, 'M10', '[]', 'h', 0)",
                "INSERT INTO masters (id, title, styles, content_hash, updated_at) VALUES (11, 'M11', '[]', 'h', 0)",
            ],
        );
        store
    }

    #[test]
    fn test_only_explicit_pairs_are_inserted() {
        let store = seeded_store();
        let report = store
            .write_unit(|tx| {
                AssociationBuilder::persist(tx, AssociationKind::MasterArtist, vec![(10, 1), (10, 2)])
            })
            .unwrap();

        assert_eq!(report, AssociationReport { submitted: 2, inserted: 2 });
        assert_eq!(
            store.association_pairs(AssociationKind::MasterArtist).unwrap(),
            vec![(10, 1), (10, 2)]
        );
    }

    #[test]
    fn test_unknown_ids_are_dropped() {
        let store = seeded_store();
        let report = store
            .write_unit(|tx| {
                AssociationBuilder::persist(
                    tx,
                    AssociationKind::MasterArtist,
                    vec![(10, 1), (10, 99), (77, 1)],
                )
            })
            .unwrap();

        assert_eq!(report.submitted, 3);
        assert_eq!(report.inserted, 1);
        assert_eq!(
            store.association_pairs(AssociationKind::MasterArtist).unwrap(),
            vec![(10, 1)]
        );
    }

    #[test]
    fn test_duplicates_and_replays_are_no_ops() {
        let store = seeded_store();
        let pairs = vec![(11, 3), (10, 2), (11, 3), (10, 2), (10, 1)];

        let first = store
            .write_unit(|tx| AssociationBuilder::persist(tx, AssociationKind::MasterArtist, pairs.clone()))
            .unwrap();
        assert_eq!(first, AssociationReport { submitted: 3, inserted: 3 });

        let second = store
            .write_unit(|tx| AssociationBuilder::persist(tx, AssociationKind::MasterArtist, pairs))
            .unwrap();
        assert_eq!(second, AssociationReport { submitted: 3, inserted: 0 });
        assert_eq!(store.association_count(AssociationKind::MasterArtist).unwrap(), 3);
    }

    #[test]
    fn test_no_cross_product_for_many_entities() {
        let store = SqliteCatalogStore::in_memory().unwrap();
        let mut statements = Vec::new();
        for id in 1..=20 {
            statements.push(format!(
                "INSERT INTO artists (id, name, name_variations, content_hash, updated_at) VALUES ({id}, 'A', '[]', 'h', 0)"
            ));
            statements.push(format!(
                "INSERT INTO masters (id, title, styles, content_hash, updated_at) VALUES ({}, 'M', '[]', 'h', 0)",
                100 + id
            ));
        }
        let refs: Vec<&str> = statements.iter().map(String::as_str).collect();
        seed(&store, &refs);

        // Each master mentions exactly one artist: 20 pairs, not 400
        let pairs: Vec<(i64, i64)> = (1..=20).map(|id| (100 + id, id)).collect();
        store
            .write_unit(|tx| AssociationBuilder::persist(tx, AssociationKind::MasterArtist, pairs))
            .unwrap();
        assert_eq!(store.association_count(AssociationKind::MasterArtist).unwrap(), 20);
    }

    #[test]
    fn test_failed_statement_rejects_whole_call() {
        let store = seeded_store();
        seed(&store, &["DROP TABLE genres"]);

        let result = store.write_unit(|tx| {
            AssociationBuilder::persist(tx, AssociationKind::MasterArtist, vec![(10, 1)])?;
            AssociationBuilder::persist(tx, AssociationKind::MasterGenre, vec![(10, 5)])
        });
        assert!(result.is_err());
        assert_eq!(store.association_count(AssociationKind::MasterArtist).unwrap(), 0);
    }

    #[test]
    fn test_empty_input() {
        let store = seeded_store();
        let report = store
            .write_unit(|tx| AssociationBuilder::persist(tx, AssociationKind::ReleaseLabel, Vec::new()))
            .unwrap();
        assert_eq!(report, AssociationReport::default());
    }
}
