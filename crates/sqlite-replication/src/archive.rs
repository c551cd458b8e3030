// crates/sqlite-replication/src/archive.rs
// ============================================================================
// Module: Period Archives
// Description: Streaming gzip compaction of closed period files.
// Purpose: Produce `<name>-<YYYYMM>.db.gz` without exposing partial archives.
// Dependencies: flate2
// ============================================================================

//! ## Overview
//! A closed period file is immutable, so compression streams it through a
//! gzip encoder into a `.partial` sibling, syncs it, renames it to the final
//! `.db.gz` name and only then removes the uncompressed original. A crash at
//! any point leaves either the original alone, or both files with a complete
//! archive; startup recovery resolves both states.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::info;
use tracing::warn;

use crate::error::ReplicationError;
use crate::layout::StoreLayout;
use crate::layout::remove_database;
use crate::layout::remove_if_exists;
use crate::period::Period;

// ============================================================================
// SECTION: Compression
// ============================================================================

/// Compresses the closed backup for `period` and removes the original.
///
/// Returns the number of uncompressed bytes archived.
///
/// # Errors
///
/// Returns [`ReplicationError::Io`] when reading, writing, syncing or
/// renaming fails. The original is kept whenever an error is returned.
pub(crate) fn archive_period(layout: &StoreLayout, period: Period) -> Result<u64, ReplicationError> {
    let source = layout.backup_path(period);
    let partial = layout.partial_archive_path(period);
    let target = layout.archive_path(period);
    let bytes = gzip_file(&source, &partial).inspect_err(|_| {
        if let Err(cleanup) = remove_if_exists(&partial) {
            warn!(path = %partial.display(), error = %cleanup, "partial archive cleanup failed");
        }
    })?;
    std::fs::rename(&partial, &target)
        .map_err(|err| ReplicationError::io("publish archive", &err))?;
    remove_database(&source)?;
    info!(%period, path = %target.display(), bytes, "archived closed period");
    Ok(bytes)
}

/// Streams `source` through gzip into `target` and syncs the result.
fn gzip_file(source: &Path, target: &Path) -> Result<u64, ReplicationError> {
    let input =
        File::open(source).map_err(|err| ReplicationError::io("open closed period", &err))?;
    let output =
        File::create(target).map_err(|err| ReplicationError::io("create archive", &err))?;
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    let bytes = io::copy(&mut BufReader::new(input), &mut encoder)
        .map_err(|err| ReplicationError::io("compress closed period", &err))?;
    let mut writer =
        encoder.finish().map_err(|err| ReplicationError::io("finish archive", &err))?;
    writer.flush().map_err(|err| ReplicationError::io("flush archive", &err))?;
    let file = writer
        .into_inner()
        .map_err(|err| ReplicationError::io("flush archive", err.error()))?;
    file.sync_all().map_err(|err| ReplicationError::io("sync archive", &err))?;
    Ok(bytes)
}
