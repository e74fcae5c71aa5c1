//! The query surface over one snapshot of a score series.

use chrono::NaiveDateTime;

use crate::device::{DeviceState, Trigger};
use crate::intervals::build_intervals;
use crate::locator::{self, Located};
use crate::policy::{self, Decision, PolicyConfig};
use crate::quartiles::{color_series, ColoredSeries};
use crate::series::RawRecord;
use crate::windows::{self, RankedWindow, WindowConstraints};

/// Builds intervals from raw rows and attaches quartile colors.
pub fn classify(records: &[RawRecord]) -> ColoredSeries {
    color_series(build_intervals(records))
}

pub fn locate(series: &ColoredSeries, when: NaiveDateTime) -> Option<Located<'_>> {
    locator::locate(series, when)
}

pub fn decide(
    series: &ColoredSeries,
    when: NaiveDateTime,
    device: &DeviceState,
    trigger: &dyn Trigger,
    config: &PolicyConfig,
) -> Decision {
    policy::evaluate(series, locator::locate(series, when), device, trigger, config)
}

pub fn rank_windows(
    series: &ColoredSeries,
    duration_minutes: u32,
    reference_score: f64,
    constraints: &WindowConstraints,
) -> Vec<RankedWindow> {
    windows::rank_windows(series, duration_minutes, reference_score, constraints)
}

/// Score of the interval containing `when`, the usual reference for window deltas.
pub fn current_score(series: &ColoredSeries, when: NaiveDateTime) -> Option<f64> {
    locator::locate(series, when)
        .map(|found| found.interval.interval.score)
        .filter(|score| score.is_finite())
}
