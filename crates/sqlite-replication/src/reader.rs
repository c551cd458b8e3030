// crates/sqlite-replication/src/reader.rs
// ============================================================================
// Module: Reader Path
// Description: Scoped shared-read handles on the primary store.
// Purpose: Let reads bypass the queue without racing rotation.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! A [`ReaderGuard`] holds the shared side of the store pair lock for as
//! long as it lives. Rows are buffered from a pooled primary connection
//! when the guard is created; iterating the guard yields them as
//! [`ReadRow`]s. While any guard is alive rotation cannot start, so the
//! primary file seen by the query stays the file on disk.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::RwLockReadGuard;

use rusqlite::types::FromSql;
use rusqlite::types::Value;
use rusqlite::types::ValueRef;

use crate::error::ReplicationError;
use crate::store_pair::QueryRows;
use crate::store_pair::StorePair;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One buffered result row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRow {
    /// Column values in select order.
    values: Vec<Value>,
}

impl ReadRow {
    /// Reads column `index` as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Db`] for an out-of-range index or a value
    /// that cannot convert to `T`.
    pub fn get<T: FromSql>(&self, index: usize) -> Result<T, ReplicationError> {
        let value = self
            .values
            .get(index)
            .ok_or(ReplicationError::Db(rusqlite::Error::InvalidColumnIndex(index)))?;
        T::column_result(ValueRef::from(value)).map_err(|err| {
            ReplicationError::Db(rusqlite::Error::FromSqlConversionFailure(
                index,
                value.data_type(),
                Box::new(err),
            ))
        })
    }

    /// Returns the raw column values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row into its values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Scoped read handle: a shared lease on the store pair plus buffered rows.
///
/// # Invariants
/// - Rotation and connection recycling cannot begin until the guard drops.
#[must_use = "dropping the guard releases the read lease immediately"]
pub struct ReaderGuard<'a> {
    /// Shared lease on the store pair.
    _lease: RwLockReadGuard<'a, StorePair>,
    /// Result column names.
    columns: Vec<String>,
    /// Remaining buffered rows.
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl<'a> ReaderGuard<'a> {
    /// Wraps a lease and the rows it protected.
    pub(crate) fn new(lease: RwLockReadGuard<'a, StorePair>, (columns, rows): QueryRows) -> Self {
        Self {
            _lease: lease,
            columns,
            rows: rows.into_iter(),
        }
    }

    /// Returns the result column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of rows not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for ReaderGuard<'_> {
    type Item = ReadRow;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(|values| ReadRow {
            values,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}
