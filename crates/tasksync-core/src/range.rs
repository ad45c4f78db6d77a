//! Prefetch windowing and the set of date ranges already pulled from the store.
//!
//! A visible month is served from a three month window (previous, current,
//! next). Ranges are compared by identity: a window is considered fetched only
//! if exactly the same `start_end` pair was marked before. A window that is a
//! subset of an earlier, larger fetch still triggers a new fetch.

use chrono::{Datelike, Duration, NaiveDate};
use std::collections::HashSet;
use std::fmt;

use crate::error::CoreError;

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchedRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchedRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// `start_end`, both ends as `YYYY-MM-DD`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FetchedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

fn first_of_month(year: i32, month_index: i32) -> Result<NaiveDate, CoreError> {
    let year = year
        .checked_add(month_index.div_euclid(12))
        .ok_or_else(|| CoreError::InvalidInput(format!("Year out of range: {}", year)))?;
    let month = u32::try_from(month_index.rem_euclid(12) + 1)
        .map_err(|_| CoreError::InvalidInput(format!("Invalid month index: {}", month_index)))?;
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| CoreError::InvalidInput(format!("Date out of range: {}-{:02}", year, month)))
}

/// Fetch window for a visible month: first day of the previous month through
/// the last day of the next month. `month_index` is zero based and may lie
/// outside `0..12`; the year is adjusted accordingly.
pub fn window_for(year: i32, month_index: i32) -> Result<(NaiveDate, NaiveDate), CoreError> {
    let out_of_range =
        || CoreError::InvalidInput(format!("Invalid month index: {}", month_index));
    let previous = month_index.checked_sub(1).ok_or_else(out_of_range)?;
    let after_next = month_index.checked_add(2).ok_or_else(out_of_range)?;

    let start = first_of_month(year, previous)?;
    let end = first_of_month(year, after_next)? - Duration::days(1);
    Ok((start, end))
}

/// Window containing `date`'s month.
pub fn window_around(date: NaiveDate) -> Result<(NaiveDate, NaiveDate), CoreError> {
    let month_index = i32::try_from(date.month0())
        .map_err(|_| CoreError::InvalidInput(format!("Invalid date: {}", date)))?;
    window_for(date.year(), month_index)
}

/// Parts of `window` not covered by `covered`, in ascending order.
pub fn uncovered(
    window: (NaiveDate, NaiveDate),
    covered: (NaiveDate, NaiveDate),
) -> Vec<(NaiveDate, NaiveDate)> {
    let (start, end) = window;
    let (covered_start, covered_end) = covered;

    if covered_end < start || covered_start > end {
        return vec![window];
    }

    let mut parts = Vec::with_capacity(2);
    if covered_start > start {
        if let Some(before) = covered_start.pred_opt() {
            parts.push((start, before));
        }
    }
    if covered_end < end {
        if let Some(after) = covered_end.succ_opt() {
            parts.push((after, end));
        }
    }
    parts
}

/// Overlap of two inclusive ranges.
pub fn intersect(
    a: (NaiveDate, NaiveDate),
    b: (NaiveDate, NaiveDate),
) -> Option<(NaiveDate, NaiveDate)> {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    (start <= end).then_some((start, end))
}

#[derive(Debug, Default, Clone)]
pub struct RangeCache {
    fetched: HashSet<FetchedRange>,
}

impl RangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_fetched(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.fetched.contains(&FetchedRange::new(start, end))
    }

    pub fn mark_fetched(&mut self, start: NaiveDate, end: NaiveDate) {
        self.fetched.insert(FetchedRange::new(start, end));
    }

    pub fn clear(&mut self) {
        self.fetched.clear();
    }

    pub fn len(&self) -> usize {
        self.fetched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetched.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.fetched.iter().map(FetchedRange::key).collect();
        keys.sort();
        keys
    }
}
