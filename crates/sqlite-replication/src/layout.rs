// crates/sqlite-replication/src/layout.rs
// ============================================================================
// Module: Store Layout
// Description: Deterministic file naming for primary, backups and archives.
// Purpose: Map (name, period) to paths and classify backup-directory entries.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Every path the manager touches is computed here from the configured name
//! and a [`Period`]:
//!
//! - primary: `<primary_directory>/<name>.db`
//! - backup (open or closed): `<backup_directory>/<name>-<YYYYMM>.db`
//! - archive: `<backup_directory>/<name>-<YYYYMM>.db.gz`
//!
//! Temp files (`.reseed`, `.partial`) are published by rename so the
//! at-rest layout never shows a half-written file under a final name.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use tracing::warn;

use crate::error::ReplicationError;
use crate::period::Period;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Extension of every database file.
const DB_SUFFIX: &str = ".db";
/// Extension of compressed archives.
const ARCHIVE_SUFFIX: &str = ".db.gz";
/// Extension of in-progress archives.
const PARTIAL_SUFFIX: &str = ".db.gz.partial";
/// Extension of a stale backup moved out of a rotation's way.
const DISPLACED_SUFFIX: &str = ".db.displaced";
/// Extension of an in-progress primary re-seed.
const RESEED_SUFFIX: &str = ".db.reseed";
/// `SQLite` sidecar suffixes that travel with a database file.
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

// ============================================================================
// SECTION: Layout
// ============================================================================

/// Path calculator for one manager's files.
#[derive(Debug, Clone)]
pub(crate) struct StoreLayout {
    /// File stem.
    name: String,
    /// Directory of the primary store.
    primary_directory: PathBuf,
    /// Directory of backups and archives.
    backup_directory: PathBuf,
}

/// Kind of a recognized file in the backup directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BackupFileKind {
    /// Uncompressed `<name>-<tag>.db` (open or closed).
    Database,
    /// Compressed `<name>-<tag>.db.gz`.
    Archive,
    /// Leftover `<name>-<tag>.db.gz.partial` from an interrupted compression.
    PartialArchive,
}

/// A recognized file in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BackupFile {
    /// Period encoded in the file name.
    pub(crate) period: Period,
    /// File kind.
    pub(crate) kind: BackupFileKind,
    /// Full path.
    pub(crate) path: PathBuf,
}

/// Result of classifying one file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Classified {
    /// A recognized backup, archive, or partial archive.
    Recognized(Period, BackupFileKind),
    /// Carries our prefix and an archive-like suffix but an unparsable tag.
    Unrecognized,
    /// Not ours (other stems, sidecars, unrelated files).
    Foreign,
}

impl StoreLayout {
    /// Creates a layout for the given name and directories.
    pub(crate) fn new(
        name: impl Into<String>,
        primary_directory: impl Into<PathBuf>,
        backup_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            primary_directory: primary_directory.into(),
            backup_directory: backup_directory.into(),
        }
    }

    /// Returns the backup directory.
    pub(crate) fn backup_directory(&self) -> &Path {
        &self.backup_directory
    }

    /// Returns the primary store path.
    pub(crate) fn primary_path(&self) -> PathBuf {
        self.primary_directory.join(format!("{}{DB_SUFFIX}", self.name))
    }

    /// Returns the temp path used while re-seeding the primary.
    pub(crate) fn primary_reseed_path(&self) -> PathBuf {
        self.primary_directory.join(format!("{}{RESEED_SUFFIX}", self.name))
    }

    /// Returns the backup path for a period.
    pub(crate) fn backup_path(&self, period: Period) -> PathBuf {
        self.backup_directory.join(format!("{}-{period}{DB_SUFFIX}", self.name))
    }

    /// Returns the archive path for a period.
    pub(crate) fn archive_path(&self, period: Period) -> PathBuf {
        self.backup_directory.join(format!("{}-{period}{ARCHIVE_SUFFIX}", self.name))
    }

    /// Returns the in-progress archive path for a period.
    pub(crate) fn partial_archive_path(&self, period: Period) -> PathBuf {
        self.backup_directory.join(format!("{}-{period}{PARTIAL_SUFFIX}", self.name))
    }

    /// Returns the path a stale backup for `period` is moved to when a
    /// rotation needs a fresh file under its name.
    pub(crate) fn displaced_path(&self, period: Period) -> PathBuf {
        self.backup_directory.join(format!("{}-{period}{DISPLACED_SUFFIX}", self.name))
    }

    /// Creates both directories if they are absent.
    pub(crate) fn ensure_directories(&self) -> Result<(), ReplicationError> {
        fs::create_dir_all(&self.primary_directory)
            .map_err(|err| ReplicationError::io("create primary directory", &err))?;
        fs::create_dir_all(&self.backup_directory)
            .map_err(|err| ReplicationError::io("create backup directory", &err))
    }

    /// Classifies a file name found in the backup directory.
    pub(crate) fn classify(&self, file_name: &str) -> Classified {
        let Some(rest) =
            file_name.strip_prefix(self.name.as_str()).and_then(|rest| rest.strip_prefix('-'))
        else {
            return Classified::Foreign;
        };
        let (tag, kind) = if let Some(tag) = rest.strip_suffix(PARTIAL_SUFFIX) {
            (tag, BackupFileKind::PartialArchive)
        } else if let Some(tag) = rest.strip_suffix(ARCHIVE_SUFFIX) {
            (tag, BackupFileKind::Archive)
        } else if let Some(tag) = rest.strip_suffix(DB_SUFFIX) {
            (tag, BackupFileKind::Database)
        } else {
            return Classified::Foreign;
        };
        tag.parse::<Period>()
            .map_or(Classified::Unrecognized, |period| Classified::Recognized(period, kind))
    }

    /// Lists recognized files in the backup directory, oldest period first.
    ///
    /// Entries carrying our prefix and an archive-like suffix but a bad tag
    /// are logged and skipped.
    pub(crate) fn scan_backups(&self) -> Result<Vec<BackupFile>, ReplicationError> {
        let entries = fs::read_dir(&self.backup_directory)
            .map_err(|err| ReplicationError::io("read backup directory", &err))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| ReplicationError::io("read backup entry", &err))?;
            let file_type =
                entry.file_type().map_err(|err| ReplicationError::io("stat backup entry", &err))?;
            if !file_type.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            match self.classify(&file_name) {
                Classified::Recognized(period, kind) => files.push(BackupFile {
                    period,
                    kind,
                    path: entry.path(),
                }),
                Classified::Unrecognized => {
                    warn!(file = %file_name, "ignoring backup file with unrecognized period tag");
                }
                Classified::Foreign => {}
            }
        }
        files.sort_by(|left, right| left.period.cmp(&right.period).then(left.path.cmp(&right.path)));
        Ok(files)
    }
}

// ============================================================================
// SECTION: File Helpers
// ============================================================================

/// Returns the sidecar paths `SQLite` may create next to `path`.
fn sidecar_paths(path: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    SIDECAR_SUFFIXES.iter().map(move |suffix| {
        let mut raw = path.as_os_str().to_os_string();
        raw.push(suffix);
        PathBuf::from(raw)
    })
}

/// Returns the WAL sidecar path for a database file.
pub(crate) fn wal_path(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push("-wal");
    PathBuf::from(raw)
}

/// Removes a file if it exists.
pub(crate) fn remove_if_exists(path: &Path) -> Result<(), ReplicationError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ReplicationError::io(&format!("remove {}", path.display()), &err)),
    }
}

/// Removes a database file together with its `SQLite` sidecars.
pub(crate) fn remove_database(path: &Path) -> Result<(), ReplicationError> {
    for sidecar in sidecar_paths(path) {
        remove_if_exists(&sidecar)?;
    }
    remove_if_exists(path)
}

/// Moves a database file and its sidecars to `aside`.
///
/// Refuses to overwrite an existing file at `aside`.
pub(crate) fn displace_database(path: &Path, aside: &Path) -> Result<(), ReplicationError> {
    if aside.exists() {
        return Err(ReplicationError::Io(format!(
            "cannot displace {}: {} already exists",
            path.display(),
            aside.display()
        )));
    }
    for (from, to) in sidecar_paths(path).zip(sidecar_paths(aside)) {
        if from.exists() {
            fs::rename(&from, &to).map_err(|err| {
                ReplicationError::io(&format!("displace {}", from.display()), &err)
            })?;
        }
    }
    fs::rename(path, aside)
        .map_err(|err| ReplicationError::io(&format!("displace {}", path.display()), &err))
}

/// Copies a closed database file over `target` via a temp file and rename.
pub(crate) fn copy_database(
    source: &Path,
    temp: &Path,
    target: &Path,
) -> Result<(), ReplicationError> {
    remove_if_exists(temp)?;
    fs::copy(source, temp).map_err(|err| {
        ReplicationError::io(&format!("copy {} to {}", source.display(), temp.display()), &err)
    })?;
    fs::File::open(temp)
        .and_then(|file| file.sync_all())
        .map_err(|err| ReplicationError::io("sync copied database", &err))?;
    publish_database(temp, target)
}

/// Renames a fully written temp database over `target`.
///
/// `target`'s sidecars are removed first so `SQLite` does not replay a stale
/// WAL against the new content.
pub(crate) fn publish_database(temp: &Path, target: &Path) -> Result<(), ReplicationError> {
    for sidecar in sidecar_paths(target) {
        remove_if_exists(&sidecar)?;
    }
    fs::rename(temp, target).map_err(|err| {
        ReplicationError::io(&format!("rename {} to {}", temp.display(), target.display()), &err)
    })
}

#[cfg(test)]
mod tests;
