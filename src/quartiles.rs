use serde::Serialize;
use std::fmt;

use crate::intervals::{Interval, IntervalSeries};

/// Ordered worst to best, so `Ord` follows goodness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorBand {
    Red,
    Orange,
    Yellow,
    Green,
}

impl ColorBand {
    pub fn as_str(self) -> &'static str {
        match self {
            ColorBand::Red => "red",
            ColorBand::Orange => "orange",
            ColorBand::Yellow => "yellow",
            ColorBand::Green => "green",
        }
    }

    /// Bands that count as a quiet stretch before a yellow activation.
    pub fn is_low(self) -> bool {
        matches!(self, ColorBand::Orange | ColorBand::Red)
    }
}

impl fmt::Display for ColorBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quartiles {
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
}

/// Linear-interpolation quantile over the finite values only.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.len() == 1 {
        return Some(sorted[0]);
    }
    let pos = q * (sorted.len() as f64 - 1.0);
    let idx = pos.floor() as usize;
    let frac = pos - idx as f64;
    let a = sorted[idx];
    let b = sorted[(idx + 1).min(sorted.len() - 1)];
    Some(a + (b - a) * frac)
}

/// Q1/Q2/Q3 at the 25th/50th/75th percentiles; `None` when no value is numeric.
pub fn describe_quartiles(values: &[f64]) -> Option<Quartiles> {
    Some(Quartiles {
        q1: quantile(values, 0.25)?,
        q2: quantile(values, 0.50)?,
        q3: quantile(values, 0.75)?,
    })
}

pub fn classify_score(score: f64, quartiles: Option<&Quartiles>) -> ColorBand {
    let Some(q) = quartiles else {
        return ColorBand::Red;
    };
    if !score.is_finite() {
        return ColorBand::Red;
    }
    if score >= q.q3 {
        ColorBand::Green
    } else if score >= q.q2 {
        ColorBand::Yellow
    } else if score >= q.q1 {
        ColorBand::Orange
    } else {
        ColorBand::Red
    }
}

/// Colors every score against the quartiles of the column. Scores are read, never changed.
pub fn classify_scores(scores: &[f64]) -> (Option<Quartiles>, Vec<ColorBand>) {
    let quartiles = describe_quartiles(scores);
    let colors = scores
        .iter()
        .map(|score| classify_score(*score, quartiles.as_ref()))
        .collect();
    (quartiles, colors)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColoredInterval {
    #[serde(flatten)]
    pub interval: Interval,
    pub color: ColorBand,
}

/// Read-only snapshot of one series: colored intervals, cadence and thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct ColoredSeries {
    pub intervals: Vec<ColoredInterval>,
    pub cadence_seconds: f64,
    pub quartiles: Option<Quartiles>,
}

impl ColoredSeries {
    pub fn cadence_minutes(&self) -> f64 {
        self.cadence_seconds / 60.0
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.intervals.iter().map(|i| i.interval.score).collect()
    }
}

pub fn color_series(series: IntervalSeries) -> ColoredSeries {
    let scores: Vec<f64> = series.intervals.iter().map(|i| i.score).collect();
    let (quartiles, colors) = classify_scores(&scores);
    let intervals = series
        .intervals
        .into_iter()
        .zip(colors)
        .map(|(interval, color)| ColoredInterval { interval, color })
        .collect();
    ColoredSeries {
        intervals,
        cadence_seconds: series.cadence_seconds,
        quartiles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartiles_match_linear_interpolation() {
        let q = describe_quartiles(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!((q.q1, q.q2, q.q3), (2.0, 3.0, 4.0));

        let q = describe_quartiles(&[10.0, 20.0, 30.0, 40.0]).unwrap();
        assert!((q.q1 - 17.5).abs() < 1e-9);
        assert!((q.q2 - 25.0).abs() < 1e-9);
        assert!((q.q3 - 32.5).abs() < 1e-9);
    }

    #[test]
    fn invalid_values_are_ignored_for_thresholds_but_colored_red() {
        let scores = [4.0, f64::NAN, 1.0, 3.0, 2.0, 5.0];
        let (quartiles, colors) = classify_scores(&scores);
        let q = quartiles.unwrap();
        assert_eq!((q.q1, q.q2, q.q3), (2.0, 3.0, 4.0));
        assert_eq!(
            colors,
            vec![
                ColorBand::Green,
                ColorBand::Red,
                ColorBand::Red,
                ColorBand::Yellow,
                ColorBand::Orange,
                ColorBand::Green,
            ]
        );
    }

    #[test]
    fn boundaries_belong_to_the_upper_band() {
        let q = Quartiles {
            q1: 10.0,
            q2: 20.0,
            q3: 30.0,
        };
        assert_eq!(classify_score(30.0, Some(&q)), ColorBand::Green);
        assert_eq!(classify_score(20.0, Some(&q)), ColorBand::Yellow);
        assert_eq!(classify_score(10.0, Some(&q)), ColorBand::Orange);
        assert_eq!(classify_score(9.999, Some(&q)), ColorBand::Red);
    }

    #[test]
    fn degenerate_columns_degrade_to_red() {
        let (quartiles, colors) = classify_scores(&[]);
        assert!(quartiles.is_none());
        assert!(colors.is_empty());

        let (quartiles, colors) = classify_scores(&[f64::NAN, f64::NAN]);
        assert!(quartiles.is_none());
        assert_eq!(colors, vec![ColorBand::Red, ColorBand::Red]);
    }

    #[test]
    fn classification_is_monotonic_in_score() {
        let scores: Vec<f64> = (0..40).map(|i| ((i * 37) % 23) as f64 * 1.5).collect();
        let (quartiles, _) = classify_scores(&scores);
        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let colors: Vec<ColorBand> = sorted
            .iter()
            .map(|s| classify_score(*s, quartiles.as_ref()))
            .collect();
        for pair in colors.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn reclassifying_is_idempotent_and_leaves_scores_alone() {
        let scores = vec![5.0, 1.0, 9.0, 3.0, 7.0];
        let before = scores.clone();
        let first = classify_scores(&scores);
        let second = classify_scores(&scores);
        assert_eq!(first, second);
        assert_eq!(scores, before);
    }
}
