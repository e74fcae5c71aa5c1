use chrono::{NaiveDateTime, Timelike};

use crate::quartiles::{ColoredInterval, ColoredSeries};

pub const BUCKET_MINUTES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Located<'a> {
    pub index: usize,
    pub interval: &'a ColoredInterval,
}

/// Snaps to the nearest 10-minute mark within the same hour (`:55` and later stay at `:50`).
pub fn round_to_bucket(when: NaiveDateTime) -> NaiveDateTime {
    let last_bucket = 60 / BUCKET_MINUTES - 1;
    let bucket = ((when.minute() + BUCKET_MINUTES / 2) / BUCKET_MINUTES).min(last_bucket);
    when.date()
        .and_hms_opt(when.hour(), bucket * BUCKET_MINUTES, 0)
        .unwrap_or(when)
}

/// Lookup of the rounded instant against the intervals as recorded.
pub fn locate_direct(series: &ColoredSeries, when: NaiveDateTime) -> Option<Located<'_>> {
    let rounded = round_to_bucket(when);
    let intervals = &series.intervals;
    // First interval whose end is past the instant; sorted and contiguous, so it is the only candidate.
    let idx = intervals.partition_point(|item| item.interval.end <= rounded);
    let candidate = intervals.get(idx)?;
    candidate.interval.contains(rounded).then_some(Located {
        index: idx,
        interval: candidate,
    })
}

/// Moves the time-of-day of `when` onto the date of the earliest sample (after sorting), then rounds.
pub fn align_to_series_day(series: &ColoredSeries, when: NaiveDateTime) -> Option<NaiveDateTime> {
    let first = series.intervals.first()?;
    let aligned = first
        .interval
        .start
        .date()
        .and_hms_opt(when.hour(), when.minute(), 0)?;
    Some(round_to_bucket(aligned))
}

/// Direct lookup, then a single retry on the series' own day. `None` means outside coverage.
pub fn locate(series: &ColoredSeries, when: NaiveDateTime) -> Option<Located<'_>> {
    if let Some(found) = locate_direct(series, when) {
        return Some(found);
    }
    let aligned = align_to_series_day(series, when)?;
    let found = locate_direct(series, aligned);
    if found.is_none() {
        tracing::debug!(%when, %aligned, "instant outside all intervals after alignment");
    }
    found
}
