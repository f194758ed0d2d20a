//! Relationships carried by decoded records.
//!
//! Pairs are built per record from exactly the ids that record mentions.
//! Nothing here ever combines ids across records.

use crate::catalog_store::{
    genre_id, Artist, AssociationKind, CatalogEntity, Genre, Label, Master, Release,
};
use crate::dump::DumpRecord;
use std::collections::{BTreeMap, BTreeSet};

/// A catalog entity the pipeline can import.
pub trait SyncEntity: DumpRecord + CatalogEntity {
    /// Association pairs stated by this record, as `(kind, left id, right id)`.
    fn association_pairs(&self) -> Vec<(AssociationKind, i64, i64)> {
        Vec::new()
    }

    /// Genre names listed on this record.
    fn genre_names(&self) -> &[String] {
        &[]
    }
}

impl SyncEntity for Label {}

impl SyncEntity for Artist {}

impl SyncEntity for Master {
    fn association_pairs(&self) -> Vec<(AssociationKind, i64, i64)> {
        let artists = self
            .artist_ids
            .iter()
            .map(|artist| (AssociationKind::MasterArtist, self.id, *artist));
        let genres = self
            .genres
            .iter()
            .map(|genre| (AssociationKind::MasterGenre, self.id, genre_id(genre)));
        artists.chain(genres).collect()
    }

    fn genre_names(&self) -> &[String] {
        &self.genres
    }
}

impl SyncEntity for Release {
    fn association_pairs(&self) -> Vec<(AssociationKind, i64, i64)> {
        let artists = self
            .artist_ids
            .iter()
            .map(|artist| (AssociationKind::ReleaseArtist, self.id, *artist));
        let labels = self
            .labels
            .iter()
            .map(|label| (AssociationKind::ReleaseLabel, self.id, label.label_id));
        let genres = self
            .genres
            .iter()
            .map(|genre| (AssociationKind::ReleaseGenre, self.id, genre_id(genre)));
        artists.chain(labels).chain(genres).collect()
    }

    fn genre_names(&self) -> &[String] {
        &self.genres
    }
}

/// Genres and association pairs gathered from one batch.
#[derive(Debug, Default)]
pub struct BatchRelations {
    genres: BTreeMap<i64, Genre>,
    pairs: BTreeMap<AssociationKind, BTreeSet<(i64, i64)>>,
}

impl BatchRelations {
    pub fn collect<T: SyncEntity>(records: &[T]) -> Self {
        let mut relations = BatchRelations::default();
        for record in records {
            for name in record.genre_names() {
                let genre = Genre::from_name(name);
                relations.genres.entry(genre.id).or_insert(genre);
            }
            for (kind, left, right) in record.association_pairs() {
                relations.pairs.entry(kind).or_default().insert((left, right));
            }
        }
        relations
    }

    /// Distinct genres, ordered by id.
    pub fn take_genres(&mut self) -> Vec<Genre> {
        std::mem::take(&mut self.genres).into_values().collect()
    }

    /// Pairs per association table, tables in a fixed order.
    pub fn pairs(&self) -> impl Iterator<Item = (AssociationKind, &BTreeSet<(i64, i64)>)> {
        self.pairs.iter().map(|(kind, pairs)| (*kind, pairs))
    }

    pub fn pair_count(&self, kind: AssociationKind) -> usize {
        self.pairs.get(&kind).map(BTreeSet::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::ReleaseLabel;

    #[test]
    fn test_master_pairs_are_exact() {
        let masters = vec![
            Master {
                id: 10,
                artist_ids: vec![1, 2],
                genres: vec!["Rock".to_string()],
                ..Default::default()
            },
            Master {
                id: 11,
                artist_ids: vec![3],
                ..Default::default()
            },
        ];
        let relations = BatchRelations::collect(&masters);

        let artist_pairs: Vec<(i64, i64)> = relations
            .pairs()
            .find(|(kind, _)| *kind == AssociationKind::MasterArtist)
            .map(|(_, pairs)| pairs.iter().copied().collect())
            .unwrap();
        // Two masters and three artists, but only the three stated pairs
        assert_eq!(artist_pairs, vec![(10, 1), (10, 2), (11, 3)]);
        assert_eq!(relations.pair_count(AssociationKind::MasterGenre), 1);
    }

    #[test]
    fn test_release_pairs_and_genres() {
        let release = Release {
            id: 7,
            artist_ids: vec![1],
            labels: vec![ReleaseLabel {
                label_id: 5,
                catalog_number: None,
            }],
            genres: vec!["Jazz".to_string(), "Rock".to_string()],
            ..Default::default()
        };
        let other = Release {
            id: 8,
            genres: vec!["Rock".to_string()],
            ..Default::default()
        };
        let mut relations = BatchRelations::collect(&[release, other]);

        assert_eq!(relations.pair_count(AssociationKind::ReleaseArtist), 1);
        assert_eq!(relations.pair_count(AssociationKind::ReleaseLabel), 1);
        assert_eq!(relations.pair_count(AssociationKind::ReleaseGenre), 3);

        let genres = relations.take_genres();
        assert_eq!(genres.len(), 2);
        assert!(relations.take_genres().is_empty());
    }

    #[test]
    fn test_plain_entities_have_no_relations() {
        let relations = BatchRelations::collect(&[Label::default(), Label::default()]);
        assert_eq!(relations.pairs().count(), 0);
    }
}
