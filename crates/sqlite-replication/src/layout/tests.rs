// crates/sqlite-replication/src/layout/tests.rs
// ============================================================================
// Module: Layout Unit Tests
// Description: File naming, classification and publication helpers.
// Purpose: Keep on-disk names stable and temp-file handling atomic.
// Dependencies: tempfile
// ============================================================================

//! ## Overview
//! Unit tests for [`StoreLayout`] and the file helpers.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use super::BackupFileKind;
use super::Classified;
use super::StoreLayout;
use super::copy_database;
use super::displace_database;
use super::remove_database;
use super::remove_if_exists;
use super::wal_path;
use crate::period::Period;

fn period(year: u16, month: u8) -> Period {
    Period::new(year, month).expect("valid period")
}

fn layout_in(dir: &Path) -> StoreLayout {
    StoreLayout::new("ledger", dir.join("primary"), dir.join("backups"))
}

#[test]
fn computes_deterministic_paths() {
    let layout = StoreLayout::new("ledger", "/data/main", "/data/bak");
    assert_eq!(layout.primary_path(), Path::new("/data/main/ledger.db"));
    assert_eq!(layout.primary_reseed_path(), Path::new("/data/main/ledger.db.reseed"));
    assert_eq!(layout.backup_path(period(2024, 3)), Path::new("/data/bak/ledger-202403.db"));
    assert_eq!(layout.archive_path(period(2024, 3)), Path::new("/data/bak/ledger-202403.db.gz"));
    assert_eq!(
        layout.partial_archive_path(period(2024, 3)),
        Path::new("/data/bak/ledger-202403.db.gz.partial")
    );
    assert_eq!(
        layout.displaced_path(period(2024, 3)),
        Path::new("/data/bak/ledger-202403.db.displaced")
    );
    assert_eq!(layout.backup_directory(), Path::new("/data/bak"));
}

#[test]
fn classifies_backup_directory_entries() {
    let layout = StoreLayout::new("ledger", "/p", "/b");
    assert!(matches!(
        layout.classify("ledger-202403.db"),
        Classified::Recognized(p, BackupFileKind::Database) if p == period(2024, 3)
    ));
    assert!(matches!(
        layout.classify("ledger-202301.db.gz"),
        Classified::Recognized(p, BackupFileKind::Archive) if p == period(2023, 1)
    ));
    assert!(matches!(
        layout.classify("ledger-202301.db.gz.partial"),
        Classified::Recognized(_, BackupFileKind::PartialArchive)
    ));
    assert!(matches!(layout.classify("ledger-2024xx.db.gz"), Classified::Unrecognized));
    assert!(matches!(layout.classify("ledger-202413.db"), Classified::Unrecognized));
    assert!(matches!(layout.classify("ledger.db"), Classified::Foreign));
    assert!(matches!(layout.classify("ledger-202403.db-wal"), Classified::Foreign));
    assert!(matches!(layout.classify("other-202403.db"), Classified::Foreign));
    assert!(matches!(layout.classify("notes.txt"), Classified::Foreign));
    assert!(matches!(layout.classify("ledger-202406.db.displaced"), Classified::Foreign));
}

#[test]
fn scan_sorts_by_period_and_skips_unrecognized() {
    let dir = TempDir::new().expect("tempdir");
    let layout = layout_in(dir.path());
    layout.ensure_directories().expect("dirs");
    let backups = dir.path().join("backups");
    for name in [
        "ledger-202312.db.gz",
        "ledger-202301.db.gz",
        "ledger-202402.db",
        "ledger-bogus.db.gz",
        "unrelated.txt",
    ] {
        fs::write(backups.join(name), b"x").expect("write");
    }
    fs::create_dir(backups.join("ledger-202305.db")).expect("dir entry");

    let scanned = layout.scan_backups().expect("scan");
    let summary: Vec<(String, BackupFileKind)> =
        scanned.iter().map(|file| (file.period.to_string(), file.kind)).collect();
    assert_eq!(
        summary,
        vec![
            ("202301".to_string(), BackupFileKind::Archive),
            ("202312".to_string(), BackupFileKind::Archive),
            ("202402".to_string(), BackupFileKind::Database),
        ]
    );
}

#[test]
fn remove_database_takes_sidecars_along() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("ledger.db");
    fs::write(&db, b"db").expect("write");
    fs::write(wal_path(&db), b"wal").expect("write");
    fs::write(dir.path().join("ledger.db-shm"), b"shm").expect("write");

    remove_database(&db).expect("remove");
    assert!(!db.exists());
    assert!(!wal_path(&db).exists());
    assert!(!dir.path().join("ledger.db-shm").exists());
    remove_if_exists(&db).expect("missing file is fine");
}

#[test]
fn copy_database_publishes_by_rename_and_clears_stale_wal() {
    let dir = TempDir::new().expect("tempdir");
    let source = dir.path().join("ledger-202403.db");
    let temp = dir.path().join("ledger.db.reseed");
    let target = dir.path().join("ledger.db");
    fs::write(&source, b"closed period").expect("write");
    fs::write(&target, b"stale primary").expect("write");
    fs::write(wal_path(&target), b"stale wal").expect("write");

    copy_database(&source, &temp, &target).expect("copy");
    assert_eq!(fs::read(&target).expect("read"), b"closed period");
    assert!(!temp.exists());
    assert!(!wal_path(&target).exists());
    assert!(source.exists());
}

#[test]
fn displace_database_moves_sidecars_and_refuses_to_overwrite() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("ledger-202406.db");
    let aside = dir.path().join("ledger-202406.db.displaced");
    fs::write(&db, b"stale").expect("write");
    fs::write(wal_path(&db), b"stale wal").expect("write");

    displace_database(&db, &aside).expect("displace");
    assert!(!db.exists());
    assert!(!wal_path(&db).exists());
    assert_eq!(fs::read(&aside).expect("read"), b"stale");
    assert_eq!(fs::read(wal_path(&aside)).expect("read"), b"stale wal");

    fs::write(&db, b"second").expect("write");
    assert!(displace_database(&db, &aside).is_err());
    assert_eq!(fs::read(&db).expect("read"), b"second");
}
