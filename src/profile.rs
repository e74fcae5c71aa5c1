use chrono::Timelike;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::quartiles::{classify_scores, ColorBand, ColoredSeries};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourlyScore {
    pub hour: u32,
    pub mean_score: f64,
    pub color: ColorBand,
}

/// Mean score per hour of day, colored against the quartiles of the hourly means.
/// Hours without a single valid score are left out.
pub fn hourly_profile(series: &ColoredSeries) -> Vec<HourlyScore> {
    let mut buckets: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for item in &series.intervals {
        let score = item.interval.score;
        if !score.is_finite() {
            continue;
        }
        let entry = buckets.entry(item.interval.start.hour()).or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }

    let hourly: Vec<(u32, f64)> = buckets
        .into_iter()
        .map(|(hour, (sum, count))| (hour, sum / count as f64))
        .collect();
    let means: Vec<f64> = hourly.iter().map(|(_, mean)| *mean).collect();
    let (_, colors) = classify_scores(&means);

    hourly
        .into_iter()
        .zip(colors)
        .map(|((hour, mean_score), color)| HourlyScore {
            hour,
            mean_score,
            color,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intervals::build_intervals;
    use crate::quartiles::color_series;
    use crate::series::RawRecord;

    #[test]
    fn averages_per_hour_and_colors_the_means() {
        let rows = [
            ("2025-10-18 00:00:00", "10"),
            ("2025-10-18 00:30:00", "20"),
            ("2025-10-18 01:00:00", "30"),
            ("2025-10-18 02:00:00", "x"),
            ("2025-10-18 03:00:00", "50"),
            ("2025-10-18 04:10:00", "70"),
        ];
        let records: Vec<RawRecord> = rows.iter().map(|(ts, s)| RawRecord::new(*ts, *s)).collect();
        let series = color_series(build_intervals(&records));
        let profile = hourly_profile(&series);

        let hours: Vec<u32> = profile.iter().map(|h| h.hour).collect();
        assert_eq!(hours, vec![0, 1, 3, 4]);
        assert_eq!(profile[0].mean_score, 15.0);
        assert_eq!(profile[0].color, ColorBand::Red);
        assert_eq!(profile[3].color, ColorBand::Green);
    }
}
