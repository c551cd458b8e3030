// crates/sqlite-replication/src/period.rs
// ============================================================================
// Module: Periods and Clocks
// Description: Calendar-month periods and the wall clock that selects them.
// Purpose: Keep month arithmetic in integers; render `YYYYMM` only at I/O.
// Dependencies: time
// ============================================================================

//! ## Overview
//! A [`Period`] is one calendar month. Its canonical tag is exactly six
//! digits, `YYYYMM`, used in backup and archive file names. The current
//! period is always derived from a [`Clock`] so rotation can be driven by a
//! [`ManualClock`] in tests and embeddings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::PoisonError;

use time::Date;
use time::Month;
use time::OffsetDateTime;

use crate::error::ReplicationError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of characters in a period tag.
pub const PERIOD_TAG_LEN: usize = 6;
/// Largest year representable in a four-digit tag.
const MAX_TAG_YEAR: u16 = 9_999;

// ============================================================================
// SECTION: Period
// ============================================================================

/// A calendar month identified by year and month.
///
/// # Invariants
/// - `month` is within `1 ..= 12`.
/// - `year` is within `0 ..= 9999` so the tag is always six digits.
/// - Ordering is chronological (field order is year, then month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    /// Calendar year.
    year: u16,
    /// Calendar month, one-based.
    month: u8,
}

impl Period {
    /// Builds a period from a year and one-based month.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Invalid`] when the month is outside
    /// `1 ..= 12` or the year does not fit in four digits.
    pub fn new(year: u16, month: u8) -> Result<Self, ReplicationError> {
        if !(1 ..= 12).contains(&month) {
            return Err(ReplicationError::Invalid(format!("period month out of range: {month}")));
        }
        if year > MAX_TAG_YEAR {
            return Err(ReplicationError::Invalid(format!("period year out of range: {year}")));
        }
        Ok(Self {
            year,
            month,
        })
    }

    /// Returns the period containing a calendar date.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Invalid`] for dates outside years `0 ..= 9999`.
    pub fn containing(date: Date) -> Result<Self, ReplicationError> {
        let year = u16::try_from(date.year()).map_err(|_| {
            ReplicationError::Invalid(format!("date year out of range: {}", date.year()))
        })?;
        Self::new(year, u8::from(date.month()))
    }

    /// Returns the calendar year.
    #[must_use]
    pub const fn year(self) -> u16 {
        self.year
    }

    /// Returns the one-based calendar month.
    #[must_use]
    pub const fn month(self) -> u8 {
        self.month
    }

    /// Returns the month count since year zero, used for age arithmetic.
    const fn ordinal(self) -> i64 {
        (self.year as i64) * 12 + (self.month as i64 - 1)
    }

    /// Returns the number of whole months from `earlier` to `self`.
    ///
    /// Negative when `earlier` is actually later.
    #[must_use]
    pub const fn months_since(self, earlier: Self) -> i64 {
        self.ordinal() - earlier.ordinal()
    }

    /// Returns the following month, or `None` past December 9999.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        if self.month == 12 {
            if self.year >= MAX_TAG_YEAR {
                return None;
            }
            Some(Self {
                year: self.year + 1,
                month: 1,
            })
        } else {
            Some(Self {
                year: self.year,
                month: self.month + 1,
            })
        }
    }

    /// Returns the first day of the period as a calendar date.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Invalid`] if the date cannot be represented.
    pub fn first_day(self) -> Result<Date, ReplicationError> {
        let month = Month::try_from(self.month)
            .map_err(|err| ReplicationError::Invalid(format!("period month: {err}")))?;
        Date::from_calendar_date(i32::from(self.year), month, 1)
            .map_err(|err| ReplicationError::Invalid(format!("period date: {err}")))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = ReplicationError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        if tag.len() != PERIOD_TAG_LEN || !tag.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(ReplicationError::Invalid(format!("malformed period tag: '{tag}'")));
        }
        let (year, month) = tag.split_at(4);
        let year = year
            .parse::<u16>()
            .map_err(|err| ReplicationError::Invalid(format!("period tag year: {err}")))?;
        let month = month
            .parse::<u8>()
            .map_err(|err| ReplicationError::Invalid(format!("period tag month: {err}")))?;
        Self::new(year, month)
    }
}

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Source of the local calendar date.
pub trait Clock: Send + Sync {
    /// Returns today's date in the local calendar.
    fn today(&self) -> Date;

    /// Returns the period containing today.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Invalid`] when today falls outside the
    /// representable tag range.
    fn current_period(&self) -> Result<Period, ReplicationError> {
        Period::containing(self.today())
    }
}

/// Wall clock using the host's local offset.
///
/// Falls back to UTC when the local offset cannot be determined soundly
/// (for example in multi-threaded processes on some Unix platforms).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> Date {
        OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()).date()
    }
}

/// Settable clock for tests and hosts that drive rotation explicitly.
#[derive(Debug)]
pub struct ManualClock {
    /// Date reported by the clock.
    today: Mutex<Date>,
}

impl ManualClock {
    /// Creates a clock that reports `today` until changed.
    #[must_use]
    pub const fn new(today: Date) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    /// Creates a clock set to the first day of `period`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Invalid`] if the period has no valid first day.
    pub fn at_period(period: Period) -> Result<Self, ReplicationError> {
        Ok(Self::new(period.first_day()?))
    }

    /// Changes the reported date.
    pub fn set(&self, today: Date) {
        *self.today.lock().unwrap_or_else(PoisonError::into_inner) = today;
    }

    /// Changes the reported date to the first day of `period`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Invalid`] if the period has no valid first day.
    pub fn set_period(&self, period: Period) -> Result<(), ReplicationError> {
        self.set(period.first_day()?);
        Ok(())
    }
}

impl Clock for ManualClock {
    fn today(&self) -> Date {
        *self.today.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
