//! End-to-end tests of the monthly import over real files and databases.

mod common;

use common::{CancelOnRead, DumpSet, ReleaseFixture, TestEnv};
use std::io::BufRead;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vinyl_catalog_sync::catalog_store::AssociationKind;
use vinyl_catalog_sync::dump::{DirectoryDumpSource, EntityKind};
use vinyl_catalog_sync::import_runs::{BeginRun, ImportRunStatus};
use vinyl_catalog_sync::{DumpSource, ImportRunStore, Period, SyncError, SyncOutcome};

fn base_dumps(date: &str) -> DumpSet {
    DumpSet::new(date)
        .label(5, "Blue Note")
        .label(6, "Impulse!")
        .artist(1, "One")
        .artist(2, "Two")
        .artist(3, "Three")
        .master(10, "Ten", &[1, 2], &["Jazz"])
        .master(11, "Eleven", &[3], &["Rock", "Jazz"])
        .release(
            ReleaseFixture::new(100, "Ten on wax", "Vinyl")
                .artists(&[1, 2])
                .labels(&[5])
                .genres(&["Jazz"]),
        )
        .release(
            ReleaseFixture::new(101, "Ten on disc", "CD")
                .artists(&[1, 2])
                .labels(&[5]),
        )
        .release(
            ReleaseFixture::new(102, "Eleven", "Vinyl")
                .artists(&[3])
                .labels(&[6])
                .genres(&["Rock"]),
        )
}

fn completed_stats(outcome: SyncOutcome) -> vinyl_catalog_sync::sync::RunStats {
    match outcome {
        SyncOutcome::Completed { stats, .. } => stats,
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[test]
fn test_full_import_populates_catalog() {
    let env = TestEnv::new();
    base_dumps("20250101").write(env.dump_dir());

    let stats = completed_stats(env.run("2025-01").unwrap());

    let counts = env.catalog.get_counts().unwrap();
    assert_eq!(counts.labels, 2);
    assert_eq!(counts.artists, 3);
    assert_eq!(counts.masters, 2);
    assert_eq!(counts.releases, 2);
    assert_eq!(counts.genres, 2);
    assert_eq!(stats.releases.filtered, 1);
    assert_eq!(stats.artists.inserted, 3);

    let run = env
        .runs
        .latest_run_for_period("2025-01".parse().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(run.status, ImportRunStatus::Completed);
    assert!(run.error_message.is_none());
    assert_eq!(run.stats.unwrap()["labels"]["inserted"], 2);
}

#[test]
fn test_master_artist_pairs_are_exact() {
    let env = TestEnv::new();
    DumpSet::new("20250101")
        .artist(1, "One")
        .artist(2, "Two")
        .master(10, "Ten", &[1, 2], &[])
        .write(env.dump_dir());

    env.run("2025-01").unwrap();

    assert_eq!(
        env.catalog
            .association_pairs(AssociationKind::MasterArtist)
            .unwrap(),
        vec![(10, 1), (10, 2)]
    );
}

#[test]
fn test_associations_never_expand_across_records() {
    let env = TestEnv::new();
    let mut dumps = DumpSet::new("20250101");
    for artist in 1..=6 {
        dumps = dumps.artist(artist, &format!("Artist {}", artist));
    }
    // Each master credits one artist; a cross product would give 36 rows
    for master in 0..6 {
        dumps = dumps.master(100 + master, "Single", &[master + 1], &[]);
    }
    dumps.write(env.dump_dir());

    env.run("2025-01").unwrap();

    let pairs = env
        .catalog
        .association_pairs(AssociationKind::MasterArtist)
        .unwrap();
    assert_eq!(pairs.len(), 6);
    assert!(pairs.iter().all(|(master, artist)| master - 99 == *artist));
}

#[test]
fn test_reimport_of_unchanged_dump_writes_nothing() {
    let env = TestEnv::new();
    let dumps = base_dumps("20250101");
    dumps.write(env.dump_dir());
    env.run("2025-01").unwrap();
    let before = env.catalog.get_counts().unwrap();
    let pairs_before = env
        .catalog
        .association_count(AssociationKind::ReleaseArtist)
        .unwrap();

    dumps.republished("20250201").write(env.dump_dir());
    let stats = completed_stats(env.run("2025-02").unwrap());

    for kind in EntityKind::IMPORT_ORDER {
        let entity = stats.entity(kind);
        assert_eq!(entity.inserted + entity.updated, 0, "{} changed", kind);
        assert_eq!(entity.rows_written, 0, "{} written", kind);
        assert_eq!(entity.associations_inserted, 0, "{} associated", kind);
    }
    assert_eq!(env.catalog.get_counts().unwrap(), before);
    assert_eq!(
        env.catalog
            .association_count(AssociationKind::ReleaseArtist)
            .unwrap(),
        pairs_before
    );
}

#[test]
fn test_changed_record_is_updated_in_place() {
    let env = TestEnv::new();
    DumpSet::new("20250101")
        .artist(1, "One")
        .artist(2, "Two")
        .write(env.dump_dir());
    env.run("2025-01").unwrap();

    DumpSet::new("20250201")
        .artist(1, "One")
        .artist(2, "Two (remastered)")
        .artist(3, "Three")
        .write(env.dump_dir());
    let stats = completed_stats(env.run("2025-02").unwrap());

    assert_eq!(stats.artists.inserted, 1);
    assert_eq!(stats.artists.updated, 1);
    assert_eq!(stats.artists.skipped, 1);

    let name: String = env
        .catalog_conn()
        .query_row("SELECT name FROM artists WHERE id = 2", [], |r| r.get(0))
        .unwrap();
    assert_eq!(name, "Two (remastered)");
}

#[test]
fn test_vinyl_filter_keeps_only_vinyl_releases() {
    let env = TestEnv::new();
    DumpSet::new("20250101")
        .release(ReleaseFixture::new(1, "Wax", "Vinyl"))
        .release(ReleaseFixture::new(2, "Disc", "CD"))
        .release(ReleaseFixture::new(3, "Both", "CD").formats(&["CD", "Vinyl"]))
        .release(ReleaseFixture::new(4, "Lowercase", "vinyl"))
        .release(ReleaseFixture::new(5, "Tape", "Cassette"))
        .write(env.dump_dir());

    let stats = completed_stats(env.run("2025-01").unwrap());

    let ids: Vec<i64> = env
        .catalog_conn()
        .prepare("SELECT id FROM releases ORDER BY id")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(ids, vec![1, 3, 4]);
    assert_eq!(stats.releases.decoded, 3);
    assert_eq!(stats.releases.filtered, 2);
}

#[test]
fn test_associations_only_reference_existing_rows() {
    let env = TestEnv::new();
    DumpSet::new("20250101")
        .label(5, "Known")
        .artist(1, "Known")
        .master(10, "Ten", &[1, 404], &[])
        .release(
            ReleaseFixture::new(100, "Wax", "Vinyl")
                .artists(&[1, 405])
                .labels(&[5, 999]),
        )
        .write(env.dump_dir());

    env.run("2025-01").unwrap();

    assert_eq!(
        env.catalog
            .association_pairs(AssociationKind::MasterArtist)
            .unwrap(),
        vec![(10, 1)]
    );
    assert_eq!(
        env.catalog
            .association_pairs(AssociationKind::ReleaseArtist)
            .unwrap(),
        vec![(100, 1)]
    );
    assert_eq!(
        env.catalog
            .association_pairs(AssociationKind::ReleaseLabel)
            .unwrap(),
        vec![(100, 5)]
    );

    let conn = env.catalog_conn();
    for kind in AssociationKind::ALL {
        let orphans: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM {table} a
                     WHERE NOT EXISTS (SELECT 1 FROM {left} l WHERE l.id = a.{lcol})
                        OR NOT EXISTS (SELECT 1 FROM {right} r WHERE r.id = a.{rcol})",
                    table = kind.table(),
                    left = kind.left_table(),
                    right = kind.right_table(),
                    lcol = kind.left_column(),
                    rcol = kind.right_column(),
                ),
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0, "orphans in {}", kind);
    }
}

#[test]
fn test_completed_period_is_not_imported_again() {
    let env = TestEnv::new();
    base_dumps("20250101").write(env.dump_dir());

    let first = env.run("2025-01").unwrap();
    let second = env.run("2025-01").unwrap();

    assert_eq!(
        second,
        SyncOutcome::AlreadyCompleted {
            run_id: first.run_id()
        }
    );
    assert_eq!(env.runs.list_runs(10).unwrap().len(), 1);
}

#[test]
fn test_second_run_is_rejected_while_one_is_active() {
    let env = TestEnv::new();
    base_dumps("20250101").write(env.dump_dir());
    base_dumps("20250201").write(env.dump_dir());

    // Another process holds the gate for January
    let other = env.other_run_store();
    let BeginRun::Started(active) = other.begin_run("2025-01".parse().unwrap()).unwrap() else {
        panic!("expected a fresh run");
    };
    other
        .transition(active.id, ImportRunStatus::Downloading, None)
        .unwrap();

    let err = env.run("2025-02").unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {}", err);
    assert_eq!(env.catalog.get_counts().unwrap().labels, 0);
    assert!(env
        .runs
        .latest_run_for_period("2025-02".parse().unwrap())
        .unwrap()
        .is_none());

    // Once the holder finishes, the next run goes through
    other
        .transition(active.id, ImportRunStatus::Failed, Some("aborted"))
        .unwrap();
    env.run("2025-02").unwrap();
}

#[test]
fn test_pending_run_of_same_period_is_not_taken_over() {
    let env = TestEnv::new();
    base_dumps("20250101").write(env.dump_dir());

    let other = env.other_run_store();
    let BeginRun::Started(pending) = other.begin_run("2025-01".parse().unwrap()).unwrap() else {
        panic!("expected a fresh run");
    };

    let err = env.run("2025-01").unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {}", err);
    assert_eq!(env.catalog.get_counts().unwrap().labels, 0);

    // The creator still drives its run through every state
    for status in [
        ImportRunStatus::Downloading,
        ImportRunStatus::ReadyForProcessing,
        ImportRunStatus::Processing,
        ImportRunStatus::Completed,
    ] {
        other.transition(pending.id, status, None).unwrap();
    }
    assert_eq!(env.runs.list_runs(10).unwrap().len(), 1);
}

struct CancellingSource {
    inner: DirectoryDumpSource,
    cancel_on: EntityKind,
    token: CancellationToken,
}

impl DumpSource for CancellingSource {
    fn open(&self, period: Period, kind: EntityKind) -> anyhow::Result<Box<dyn BufRead + Send>> {
        let stream = self.inner.open(period, kind)?;
        if kind == self.cancel_on {
            return Ok(Box::new(CancelOnRead::new(stream, self.token.clone())));
        }
        Ok(stream)
    }

    fn available_periods(&self) -> anyhow::Result<Vec<Period>> {
        self.inner.available_periods()
    }
}

#[test]
fn test_cancellation_finishes_batch_and_fails_run() {
    let env = TestEnv::new();
    base_dumps("20250101").write(env.dump_dir());

    let token = CancellationToken::new();
    let source = Arc::new(CancellingSource {
        inner: DirectoryDumpSource::new(env.dump_dir()).unwrap(),
        cancel_on: EntityKind::Artist,
        token: token.clone(),
    });
    let ctx = env.context(token, source);

    let err = env.run_with(&ctx, "2025-01").unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));

    let run = env
        .runs
        .latest_run_for_period("2025-01".parse().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(run.status, ImportRunStatus::Failed);
    assert_eq!(run.error_message.as_deref(), Some("cancelled"));
    assert!(run.finished_at.is_some());

    // Labels were done and the batch in flight was committed
    let counts = env.catalog.get_counts().unwrap();
    assert_eq!(counts.labels, 2);
    assert_eq!(counts.artists, 2);
    assert_eq!(counts.masters, 0);
    assert!(env.runs.active_run().unwrap().is_none());
}

#[test]
fn test_failed_period_can_be_rerun() {
    let env = TestEnv::new();
    let dumps = base_dumps("20250101");
    dumps.write_without(env.dump_dir(), EntityKind::Release);

    // Period listing needs all four files; run the period explicitly
    let err = env.run("2025-01").unwrap_err();
    assert!(matches!(
        err,
        SyncError::Source {
            kind: EntityKind::Release,
            ..
        }
    ));
    let failed = env
        .runs
        .latest_run_for_period("2025-01".parse().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, ImportRunStatus::Failed);
    assert_eq!(env.catalog.get_counts().unwrap().labels, 0);

    dumps.write_kind(env.dump_dir(), EntityKind::Release);
    let outcome = env.run("2025-01").unwrap();

    assert_ne!(outcome.run_id(), failed.id);
    assert_eq!(env.runs.list_runs(10).unwrap().len(), 2);
    assert_eq!(env.catalog.get_counts().unwrap().releases, 2);
}

#[test]
fn test_malformed_records_are_skipped() {
    let env = TestEnv::new();
    DumpSet::new("20250101")
        .artist(1, "One")
        .raw_artist("<artist><name>No id</name></artist>")
        .raw_artist("<artist><id>abc</id><name>Bad id</name></artist>")
        .artist(2, "Two")
        .write(env.dump_dir());

    let stats = completed_stats(env.run("2025-01").unwrap());

    assert_eq!(stats.artists.decoded, 2);
    assert_eq!(stats.artists.decode_errors, 2);
    assert_eq!(env.catalog.get_counts().unwrap().artists, 2);
}

#[test]
fn test_truncated_dump_fails_run_but_keeps_batches() {
    let env = TestEnv::new();
    let dumps = DumpSet::new("20250101")
        .artist(1, "One")
        .artist(2, "Two")
        .artist(3, "Three");
    dumps.write(env.dump_dir());
    let artists = env
        .dump_dir()
        .join(DirectoryDumpSource::file_name("20250101", EntityKind::Artist));
    let xml = dumps.xml(EntityKind::Artist);
    let cut = xml.find("<artist><id>3").unwrap();
    std::fs::write(&artists, &xml[..cut + 10]).unwrap();

    let err = env.run("2025-01").unwrap_err();
    assert!(matches!(
        err,
        SyncError::Stream {
            kind: EntityKind::Artist,
            ..
        }
    ));
    assert_eq!(env.catalog.get_counts().unwrap().artists, 2);

    let run = env.runs.list_runs(1).unwrap().remove(0);
    assert_eq!(run.status, ImportRunStatus::Failed);
    assert_eq!(run.stats.unwrap()["artists"]["decoded"], 2);
}
