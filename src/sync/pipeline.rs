//! The per-entity batch loop: decode, classify, upsert, associate.

use super::classifier::classify;
use super::error::SyncError;
use super::relations::{BatchRelations, SyncEntity};
use crate::catalog_store::{
    Artist, AssociationBuilder, BatchUpsertWriter, CatalogEntity, Genre, Label, Master, Release,
    SqliteCatalogStore, DEFAULT_CHUNK_SIZE,
};
use crate::dump::{
    DecodeStats, DumpDecoder, EarlyFilter, EntityKind, ReleaseFormatFilter,
    DEFAULT_RELEASE_FORMAT,
};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_BATCH_SIZE: usize = 2000;
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 50_000;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Records decoded before a batch is classified and written.
    pub batch_size: usize,
    /// Rows per upsert statement and transaction.
    pub chunk_size: usize,
    /// Format a release must list to be imported.
    pub release_format: String,
    /// Records between two progress log lines.
    pub progress_interval: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            release_format: DEFAULT_RELEASE_FORMAT.to_string(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// Counters for one entity kind of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStats {
    pub decoded: u64,
    pub filtered: u64,
    pub decode_errors: u64,
    pub batches: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    /// Rows the upserts actually changed.
    pub rows_written: u64,
    pub genres_written: u64,
    pub associations_submitted: u64,
    pub associations_inserted: u64,
}

impl EntityStats {
    fn apply_decode(&mut self, decode: DecodeStats) {
        self.decoded = decode.decoded;
        self.filtered = decode.filtered;
        self.decode_errors = decode.errors;
    }
}

/// Counters of a whole run, serialized into the import run record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub labels: EntityStats,
    pub artists: EntityStats,
    pub masters: EntityStats,
    pub releases: EntityStats,
}

impl RunStats {
    pub fn entity(&self, kind: EntityKind) -> &EntityStats {
        match kind {
            EntityKind::Label => &self.labels,
            EntityKind::Artist => &self.artists,
            EntityKind::Master => &self.masters,
            EntityKind::Release => &self.releases,
        }
    }

    pub fn entity_mut(&mut self, kind: EntityKind) -> &mut EntityStats {
        match kind {
            EntityKind::Label => &mut self.labels,
            EntityKind::Artist => &mut self.artists,
            EntityKind::Master => &mut self.masters,
            EntityKind::Release => &mut self.releases,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Drives the dumps of one run into the catalog.
///
/// All writes happen on the calling thread, one batch at a time, each chunk
/// and association call in its own transaction.
pub struct CatalogSync<'a> {
    store: &'a SqliteCatalogStore,
    settings: &'a SyncSettings,
    cancellation: &'a CancellationToken,
    writer: BatchUpsertWriter,
}

impl<'a> CatalogSync<'a> {
    pub fn new(
        store: &'a SqliteCatalogStore,
        settings: &'a SyncSettings,
        cancellation: &'a CancellationToken,
    ) -> Self {
        Self {
            store,
            settings,
            cancellation,
            writer: BatchUpsertWriter::new(settings.chunk_size),
        }
    }

    /// Import one dump. `stats` is updated as batches complete, so it holds
    /// the progress made even when an error is returned.
    pub fn sync_kind(
        &self,
        kind: EntityKind,
        stream: Box<dyn BufRead + Send>,
        stats: &mut EntityStats,
    ) -> Result<(), SyncError> {
        match kind {
            EntityKind::Label => self.sync_entity::<Label>(stream, None, stats),
            EntityKind::Artist => self.sync_entity::<Artist>(stream, None, stats),
            EntityKind::Master => self.sync_entity::<Master>(stream, None, stats),
            EntityKind::Release => {
                let filter = ReleaseFormatFilter::new(self.settings.release_format.clone());
                self.sync_entity::<Release>(stream, Some(Box::new(filter)), stats)
            }
        }
    }

    pub fn sync_entity<T: SyncEntity>(
        &self,
        stream: Box<dyn BufRead + Send>,
        filter: Option<Box<dyn EarlyFilter>>,
        stats: &mut EntityStats,
    ) -> Result<(), SyncError> {
        let kind = T::KIND;
        let mut decoder = DumpDecoder::<_, T>::new(stream);
        if let Some(filter) = filter {
            decoder = decoder.with_filter(filter);
        }

        let batch_size = self.settings.batch_size.max(1);
        let progress_interval = self.settings.progress_interval.max(1);
        let mut next_progress = progress_interval;
        let mut exhausted = false;

        while !exhausted {
            if self.cancellation.is_cancelled() {
                info!(kind = %kind, "Cancellation requested, stopping before next batch");
                return Err(SyncError::Cancelled);
            }

            let mut batch = Vec::with_capacity(batch_size);
            while batch.len() < batch_size {
                match decoder.next() {
                    Some(Ok(record)) => batch.push(record),
                    Some(Err(error)) => {
                        stats.apply_decode(decoder.stats());
                        return Err(SyncError::Stream { kind, error });
                    }
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }

            if !batch.is_empty() {
                self.process_batch(batch, stats)?;
                stats.batches += 1;
            }
            stats.apply_decode(decoder.stats());

            let seen = stats.decoded + stats.filtered + stats.decode_errors;
            if seen >= next_progress {
                info!(
                    kind = %kind,
                    decoded = stats.decoded,
                    filtered = stats.filtered,
                    errors = stats.decode_errors,
                    written = stats.rows_written,
                    "Import progress"
                );
                next_progress = (seen / progress_interval + 1) * progress_interval;
            }
        }

        info!(
            kind = %kind,
            decoded = stats.decoded,
            filtered = stats.filtered,
            errors = stats.decode_errors,
            inserted = stats.inserted,
            updated = stats.updated,
            skipped = stats.skipped,
            associations = stats.associations_inserted,
            "Finished dump"
        );
        Ok(())
    }

    /// Classify and write one decoded batch, then its genres and associations.
    pub fn process_batch<T: SyncEntity>(
        &self,
        records: Vec<T>,
        stats: &mut EntityStats,
    ) -> Result<(), SyncError> {
        let mut relations = BatchRelations::collect(&records);

        let genres: Vec<Genre> = relations.take_genres();
        if !genres.is_empty() {
            let ids: Vec<i64> = genres.iter().map(|g| g.id).collect();
            let existing = self.store.fetch_content_hashes::<Genre>(&ids)?;
            // Names differing only in case share an id; the first one stored stays
            let changed = classify(genres, &existing);
            stats.genres_written += self.writer.write(self.store, &changed.inserts)? as u64;
        }

        let ids: Vec<i64> = records.iter().map(CatalogEntity::id).collect();
        let existing = self.store.fetch_content_hashes::<T>(&ids)?;
        let classification = classify(records, &existing);
        stats.inserted += classification.inserts.len() as u64;
        stats.updated += classification.updates.len() as u64;
        stats.skipped += classification.skipped.len() as u64;

        stats.rows_written += self.writer.write(self.store, &classification.inserts)? as u64;
        stats.rows_written += self.writer.write(self.store, &classification.updates)? as u64;

        // Entities of this batch are committed now; pairs may reference them
        for (kind, pairs) in relations.pairs() {
            let report = self
                .store
                .write_unit(|tx| AssociationBuilder::persist(tx, kind, pairs.iter().copied()))?;
            stats.associations_submitted += report.submitted as u64;
            stats.associations_inserted += report.inserted as u64;
            if report.inserted < report.submitted {
                debug!(
                    table = %kind,
                    submitted = report.submitted,
                    inserted = report.inserted,
                    "Some pairs already existed or referenced unknown ids"
                );
            }
        }
        Ok(())
    }
}
