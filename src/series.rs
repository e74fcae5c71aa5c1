use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_TIME_COLUMN: &str = "Data";
pub const DEFAULT_SCORE_COLUMN: &str = "Scor_pred";

const COLORED_FILE_PREFIX: &str = "next_day_predictions_colored_";
const COLORED_FILE_SUFFIX: &str = ".csv";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("failed to read series file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed series csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("column '{0}' not found in series header")]
    MissingColumn(String),
    #[error("no colored prediction csv found in {0}")]
    NoSeriesFile(PathBuf),
}

/// One row as supplied by the series source, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub timestamp: String,
    pub score: String,
}

impl RawRecord {
    pub fn new(timestamp: impl Into<String>, score: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            score: score.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesColumns {
    pub time: String,
    pub score: String,
}

impl Default for SeriesColumns {
    fn default() -> Self {
        Self {
            time: DEFAULT_TIME_COLUMN.to_string(),
            score: DEFAULT_SCORE_COLUMN.to_string(),
        }
    }
}

/// Parses ISO-8601-like date-times. Offsets are dropped and the wall-clock time kept.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_local());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Numeric coercion of a score cell; anything unparseable or non-finite becomes NaN.
pub fn parse_score(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => f64::NAN,
    }
}

pub fn read_csv<R: Read>(reader: R, columns: &SeriesColumns) -> Result<Vec<RawRecord>, SeriesError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let time_idx = column_index(&headers, &columns.time)?;
    let score_idx = column_index(&headers, &columns.score)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push(RawRecord {
            timestamp: row.get(time_idx).unwrap_or("").to_string(),
            score: row.get(score_idx).unwrap_or("").to_string(),
        });
    }
    Ok(records)
}

pub fn load_csv(path: &Path, columns: &SeriesColumns) -> Result<Vec<RawRecord>, SeriesError> {
    let file = fs::File::open(path).map_err(|source| SeriesError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_csv(file, columns)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, SeriesError> {
    headers
        .iter()
        .position(|header| header == name)
        .ok_or_else(|| SeriesError::MissingColumn(name.to_string()))
}

/// Newest `next_day_predictions_colored_YYYY-MM-DD.csv` in `dir`, by the date in the name.
pub fn latest_colored_csv(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let date = colored_file_date(&name)?;
            Some((date, entry.path()))
        })
        .max_by_key(|(date, _)| *date)
        .map(|(_, path)| path)
}

fn colored_file_date(name: &str) -> Option<NaiveDate> {
    let raw = name
        .strip_prefix(COLORED_FILE_PREFIX)?
        .strip_suffix(COLORED_FILE_SUFFIX)?;
    if raw.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub path: PathBuf,
    pub records: Vec<RawRecord>,
}

impl LoadedSeries {
    pub fn source_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Where the series comes from: an explicit file, or the newest colored file in a directory.
#[derive(Debug, Clone)]
pub struct SeriesSource {
    pub path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub columns: SeriesColumns,
}

impl SeriesSource {
    pub fn resolve_path(&self) -> Result<PathBuf, SeriesError> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        latest_colored_csv(&self.data_dir)
            .ok_or_else(|| SeriesError::NoSeriesFile(self.data_dir.clone()))
    }

    pub fn load(&self) -> Result<LoadedSeries, SeriesError> {
        let path = self.resolve_path()?;
        let records = load_csv(&path, &self.columns)?;
        tracing::debug!(path = %path.display(), rows = records.len(), "loaded score series");
        Ok(LoadedSeries { path, records })
    }
}
