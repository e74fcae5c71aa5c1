use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::series::{parse_score, parse_timestamp, RawRecord};

pub const DEFAULT_CADENCE_SECONDS: f64 = 600.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: NaiveDateTime,
    /// NaN when the source value was not numeric.
    pub score: f64,
}

/// Half-open `[start, end)` span carrying one score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub score: f64,
}

impl Interval {
    pub fn contains(&self, when: NaiveDateTime) -> bool {
        self.start <= when && when < self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSeries {
    pub intervals: Vec<Interval>,
    pub cadence_seconds: f64,
}

impl IntervalSeries {
    pub fn cadence(&self) -> Duration {
        cadence_duration(self.cadence_seconds)
    }
}

/// Parses timestamps and scores, drops rows with unusable timestamps, and sorts ascending.
pub fn samples_from_records(records: &[RawRecord]) -> Vec<Sample> {
    let mut samples: Vec<Sample> = records
        .iter()
        .filter_map(|record| {
            let timestamp = parse_timestamp(&record.timestamp)?;
            Some(Sample {
                timestamp,
                score: parse_score(&record.score),
            })
        })
        .collect();
    let dropped = records.len() - samples.len();
    if dropped > 0 {
        tracing::debug!(dropped, "dropped series rows with unparseable timestamps");
    }
    // Stable so duplicate timestamps keep source order.
    samples.sort_by_key(|sample| sample.timestamp);
    samples
}

/// Median of consecutive deltas in seconds, falling back to ten minutes.
pub fn infer_cadence_seconds(samples: &[Sample]) -> f64 {
    if samples.len() < 2 {
        return DEFAULT_CADENCE_SECONDS;
    }
    let mut deltas: Vec<f64> = samples
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 1000.0)
        .collect();
    deltas.sort_by(|a, b| a.total_cmp(b));
    let mid = deltas.len() / 2;
    let median = if deltas.len() % 2 == 1 {
        deltas[mid]
    } else {
        (deltas[mid - 1] + deltas[mid]) / 2.0
    };
    if median.is_finite() && median > 0.0 {
        median
    } else {
        DEFAULT_CADENCE_SECONDS
    }
}

pub fn build_from_samples(samples: &[Sample]) -> IntervalSeries {
    let cadence_seconds = infer_cadence_seconds(samples);
    let cadence = cadence_duration(cadence_seconds);
    let intervals = samples
        .iter()
        .enumerate()
        .map(|(idx, sample)| {
            let end = match samples.get(idx + 1) {
                Some(next) => next.timestamp,
                None => sample.timestamp + cadence,
            };
            Interval {
                start: sample.timestamp,
                end,
                score: sample.score,
            }
        })
        .collect();
    IntervalSeries {
        intervals,
        cadence_seconds,
    }
}

pub fn build_intervals(records: &[RawRecord]) -> IntervalSeries {
    build_from_samples(&samples_from_records(records))
}

fn cadence_duration(seconds: f64) -> Duration {
    Duration::milliseconds((seconds * 1000.0).round() as i64)
}
