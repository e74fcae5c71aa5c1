use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::quartiles::{ColoredInterval, ColoredSeries};

pub const TOP_WINDOWS: usize = 3;

const HIGH_STABILITY_MAX_SPREAD: f64 = 5.0;
const MEDIUM_STABILITY_MAX_SPREAD: f64 = 10.0;
const TREND_THRESHOLD: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    High,
    Medium,
    Low,
}

impl Stability {
    pub fn from_spread(spread: f64) -> Self {
        if spread <= HIGH_STABILITY_MAX_SPREAD {
            Stability::High
        } else if spread <= MEDIUM_STABILITY_MAX_SPREAD {
            Stability::Medium
        } else {
            Stability::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Steady,
    Falling,
}

impl Trend {
    /// Second-half mean against first-half mean.
    fn of(scores: &[f64]) -> Self {
        if scores.len() < 2 {
            return Trend::Steady;
        }
        let (first, second) = scores.split_at(scores.len() / 2);
        let diff = mean(second) - mean(first);
        if diff > TREND_THRESHOLD {
            Trend::Rising
        } else if diff < -TREND_THRESHOLD {
            Trend::Falling
        } else {
            Trend::Steady
        }
    }
}

/// Optional planner limits, compared on the `HH:MM` of a window's first and last interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowConstraints {
    pub earliest_after: Option<NaiveTime>,
    pub latest_before: Option<NaiveTime>,
    pub deadline: Option<NaiveTime>,
}

impl WindowConstraints {
    fn admits(&self, first_start: NaiveTime, last_start: NaiveTime) -> bool {
        if self.earliest_after.is_some_and(|limit| first_start < limit) {
            return false;
        }
        if self.latest_before.is_some_and(|limit| first_start > limit) {
            return false;
        }
        if self.deadline.is_some_and(|limit| last_start > limit) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedWindow {
    /// `HH:MM` of the first interval's start.
    pub start: String,
    /// `HH:MM` of the last interval's start.
    pub end: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub average_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub percentile: u32,
    pub delta_vs_now: f64,
    pub stability: Stability,
    pub stability_value: f64,
    pub trend: Trend,
}

/// Interval count covering `duration_minutes`, never less than one.
pub fn window_length(duration_minutes: u32, cadence_minutes: f64) -> usize {
    if !(cadence_minutes.is_finite() && cadence_minutes > 0.0) {
        return 1;
    }
    let raw = (f64::from(duration_minutes) / cadence_minutes - 1e-9).ceil();
    (raw.max(1.0)) as usize
}

/// Count of `sorted` scores strictly below `value` over `total` series points, as a
/// rounded percentage. `total` includes intervals with invalid scores.
pub fn percentile_of(sorted: &[f64], value: f64, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let idx = sorted.partition_point(|score| *score < value);
    ((idx as f64 / total as f64) * 100.0).round() as u32
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn summarize(
    window: &[ColoredInterval],
    sorted_scores: &[f64],
    total: usize,
    reference_score: f64,
) -> Option<RankedWindow> {
    let first = window.first()?;
    let last = window.last()?;
    let scores: Vec<f64> = window.iter().map(|item| item.interval.score).collect();
    if scores.iter().any(|score| !score.is_finite()) {
        return None;
    }

    let average_score = mean(&scores);
    let min_score = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let stability_value = max_score - min_score;

    Some(RankedWindow {
        start: first.interval.start.format("%H:%M").to_string(),
        end: last.interval.start.format("%H:%M").to_string(),
        start_at: first.interval.start,
        end_at: last.interval.end,
        average_score,
        min_score,
        max_score,
        percentile: percentile_of(sorted_scores, average_score, total),
        delta_vs_now: round2(average_score - reference_score),
        stability: Stability::from_spread(stability_value),
        stability_value,
        trend: Trend::of(&scores),
    })
}

/// Every stride-1 window of the requested duration, in chronological order.
pub fn candidate_windows(
    series: &ColoredSeries,
    duration_minutes: u32,
    reference_score: f64,
    constraints: &WindowConstraints,
) -> Vec<RankedWindow> {
    let length = window_length(duration_minutes, series.cadence_minutes());
    if series.len() < length {
        return Vec::new();
    }

    let mut sorted_scores: Vec<f64> = series
        .scores()
        .into_iter()
        .filter(|score| score.is_finite())
        .collect();
    sorted_scores.sort_by(|a, b| a.total_cmp(b));

    series
        .intervals
        .windows(length)
        .filter(|window| {
            let first = window[0].interval.start.time();
            let last = window[window.len() - 1].interval.start.time();
            constraints.admits(first, last)
        })
        .filter_map(|window| summarize(window, &sorted_scores, series.len(), reference_score))
        .collect()
}

/// Best windows first: higher mean, then tighter spread; earlier windows win remaining ties.
pub fn rank_windows(
    series: &ColoredSeries,
    duration_minutes: u32,
    reference_score: f64,
    constraints: &WindowConstraints,
) -> Vec<RankedWindow> {
    let mut windows = candidate_windows(series, duration_minutes, reference_score, constraints);
    windows.sort_by(|a, b| {
        b.average_score
            .total_cmp(&a.average_score)
            .then_with(|| a.stability_value.total_cmp(&b.stability_value))
    });
    windows.truncate(TOP_WINDOWS);
    tracing::debug!(
        duration_minutes,
        returned = windows.len(),
        "ranked candidate windows"
    );
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intervals::build_intervals;
    use crate::quartiles::color_series;
    use crate::series::RawRecord;

    fn series_from(scores: &[f64]) -> ColoredSeries {
        let records: Vec<RawRecord> = scores
            .iter()
            .enumerate()
            .map(|(i, score)| {
                let minutes = 10 * i;
                RawRecord::new(
                    format!("2025-10-18 {:02}:{:02}:00", minutes / 60, minutes % 60),
                    score.to_string(),
                )
            })
            .collect();
        color_series(build_intervals(&records))
    }

    fn hhmm(raw: &str) -> NaiveTime {
        NaiveTime::parse_from_str(raw, "%H:%M").unwrap()
    }

    #[test]
    fn window_length_rounds_up_with_floor_of_one() {
        assert_eq!(window_length(20, 10.0), 2);
        assert_eq!(window_length(25, 10.0), 3);
        assert_eq!(window_length(0, 10.0), 1);
        assert_eq!(window_length(5, 10.0), 1);
        assert_eq!(window_length(90, 15.0), 6);
    }

    #[test]
    fn stability_bands() {
        assert_eq!(Stability::from_spread(5.0), Stability::High);
        assert_eq!(Stability::from_spread(5.01), Stability::Medium);
        assert_eq!(Stability::from_spread(10.0), Stability::Medium);
        assert_eq!(Stability::from_spread(10.5), Stability::Low);
    }

    #[test]
    fn percentile_counts_scores_below_value() {
        let sorted = [5.0, 10.0, 15.0, 20.0];
        assert_eq!(percentile_of(&sorted, 15.0, 4), 50);
        assert_eq!(percentile_of(&sorted, 12.0, 4), 50);
        assert_eq!(percentile_of(&sorted, 1.0, 4), 0);
        assert_eq!(percentile_of(&sorted, 99.0, 4), 100);
        assert_eq!(percentile_of(&[], 3.0, 0), 0);
        assert_eq!(percentile_of(&sorted, 15.0, 5), 40);
    }

    #[test]
    fn ranks_by_mean_then_stability() {
        let series = series_from(&[10.0, 20.0, 90.0, 95.0, 15.0, 5.0]);
        let all = candidate_windows(&series, 20, 0.0, &WindowConstraints::default());
        let means: Vec<f64> = all.iter().map(|w| w.average_score).collect();
        assert_eq!(means, vec![15.0, 55.0, 92.5, 55.0, 10.0]);

        let top = rank_windows(&series, 20, 20.0, &WindowConstraints::default());
        assert_eq!(top.len(), 3);
        assert_eq!((top[0].start.as_str(), top[0].end.as_str()), ("00:20", "00:30"));
        assert_eq!(top[0].average_score, 92.5);
        assert_eq!(top[0].stability, Stability::High);
        assert_eq!(top[0].delta_vs_now, 72.5);
        assert_eq!(top[1].start, "00:10");
        assert_eq!(top[1].stability_value, 70.0);
        assert_eq!(top[2].start, "00:30");
        assert_eq!(top[2].stability_value, 80.0);
        assert_eq!(top[1].percentile, 67);
    }

    #[test]
    fn too_short_series_has_no_windows() {
        let series = series_from(&[50.0, 60.0]);
        assert!(rank_windows(&series, 30, 0.0, &WindowConstraints::default()).is_empty());
    }

    #[test]
    fn trend_follows_half_means() {
        assert_eq!(Trend::of(&[10.0, 10.0, 20.0, 20.0]), Trend::Rising);
        assert_eq!(Trend::of(&[20.0, 20.0, 10.0, 10.0]), Trend::Falling);
        assert_eq!(Trend::of(&[10.0, 12.0]), Trend::Steady);
        assert_eq!(Trend::of(&[10.0]), Trend::Steady);
    }

    #[test]
    fn constraints_filter_on_window_labels() {
        let series = series_from(&[10.0, 20.0, 90.0, 95.0, 15.0, 5.0]);
        let constraints = WindowConstraints {
            earliest_after: Some(hhmm("00:10")),
            latest_before: None,
            deadline: Some(hhmm("00:30")),
        };
        let windows = candidate_windows(&series, 20, 0.0, &constraints);
        let starts: Vec<&str> = windows.iter().map(|w| w.start.as_str()).collect();
        assert_eq!(starts, vec!["00:10", "00:20"]);

        let constraints = WindowConstraints {
            latest_before: Some(hhmm("00:00")),
            ..WindowConstraints::default()
        };
        assert_eq!(candidate_windows(&series, 20, 0.0, &constraints).len(), 1);
    }

    #[test]
    fn windows_with_invalid_scores_are_skipped() {
        let mut series = series_from(&[10.0, 20.0, 30.0]);
        series.intervals[1].interval.score = f64::NAN;
        let windows = candidate_windows(&series, 10, 0.0, &WindowConstraints::default());
        let starts: Vec<&str> = windows.iter().map(|w| w.start.as_str()).collect();
        assert_eq!(starts, vec!["00:00", "00:20"]);
    }

    #[test]
    fn percentile_counts_invalid_points_in_the_denominator() {
        let mut series = series_from(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        series.intervals[0].interval.score = f64::NAN;
        let windows = candidate_windows(&series, 10, 0.0, &WindowConstraints::default());
        let percentiles: Vec<u32> = windows.iter().map(|w| w.percentile).collect();
        // Valid scores below each mean, over all five points.
        assert_eq!(percentiles, vec![0, 20, 40, 60]);
    }
}
