use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::policy::{PolicyConfig, DEFAULT_YELLOW_LOOKBACK};
use crate::series::{SeriesColumns, SeriesSource, DEFAULT_SCORE_COLUMN, DEFAULT_TIME_COLUMN};

#[derive(Debug, Clone)]
pub struct Config {
    pub series_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub columns: SeriesColumns,

    pub device_url: Url,
    pub device_timeout: Duration,

    pub http_bind: String,
    /// `None` disables the background decision loop.
    pub poll_interval: Option<Duration>,

    pub policy: PolicyConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // A missing .env is fine; real env vars still apply.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let series_path = env_optional(&lookup, "WASH_SERIES_PATH").map(PathBuf::from);
        let data_dir = PathBuf::from(env_string(
            &lookup,
            "WASH_DATA_DIR",
            Some("./data".to_string()),
        )?);
        let columns = SeriesColumns {
            time: env_string(
                &lookup,
                "WASH_TIME_COLUMN",
                Some(DEFAULT_TIME_COLUMN.to_string()),
            )?,
            score: env_string(
                &lookup,
                "WASH_SCORE_COLUMN",
                Some(DEFAULT_SCORE_COLUMN.to_string()),
            )?,
        };

        let device_raw = env_string(
            &lookup,
            "WASH_DEVICE_URL",
            Some("http://127.0.0.1:5000".to_string()),
        )?;
        let device_url = parse_device_url(&device_raw)?;
        let device_timeout =
            Duration::from_millis(env_u64(&lookup, "WASH_DEVICE_TIMEOUT_MS", Some(5000))?);

        let http_bind = env_string(
            &lookup,
            "WASH_HTTP_BIND",
            Some("127.0.0.1:8090".to_string()),
        )?;

        let poll_seconds = env_u64(&lookup, "WASH_POLL_INTERVAL_SECONDS", Some(60))?;
        let poll_interval = (poll_seconds > 0).then(|| Duration::from_secs(poll_seconds));

        let yellow_lookback = env_u64(
            &lookup,
            "WASH_YELLOW_LOOKBACK",
            Some(DEFAULT_YELLOW_LOOKBACK as u64),
        )? as usize;

        Ok(Self {
            series_path,
            data_dir,
            columns,
            device_url,
            device_timeout,
            http_bind,
            poll_interval,
            policy: PolicyConfig { yellow_lookback },
        })
    }

    pub fn series_source(&self) -> SeriesSource {
        SeriesSource {
            path: self.series_path.clone(),
            data_dir: self.data_dir.clone(),
            columns: self.columns.clone(),
        }
    }
}

/// Endpoints are joined relative to the base, so the path must end with `/`.
fn parse_device_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).context("invalid WASH_DEVICE_URL")?;
    if url.cannot_be_a_base() {
        return Err(anyhow!("WASH_DEVICE_URL must be an http(s) base url"));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn env_string<F>(lookup: &F, key: &str, default: Option<String>) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => Ok(value.trim().to_string()),
        None => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64<F>(lookup: &F, key: &str, default: Option<u64>) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        None => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_with(&[]).unwrap();
        assert!(config.series_path.is_none());
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.columns, SeriesColumns::default());
        assert_eq!(config.device_url.as_str(), "http://127.0.0.1:5000/");
        assert_eq!(config.http_bind, "127.0.0.1:8090");
        assert_eq!(config.poll_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.policy.yellow_lookback, 12);
    }

    #[test]
    fn overrides_are_trimmed_and_parsed() {
        let config = config_with(&[
            ("WASH_SERIES_PATH", " /tmp/series.csv "),
            ("WASH_SCORE_COLUMN", "Scor"),
            ("WASH_DEVICE_URL", "http://washer.local:8000/api"),
            ("WASH_POLL_INTERVAL_SECONDS", "0"),
            ("WASH_YELLOW_LOOKBACK", "6"),
        ])
        .unwrap();
        assert_eq!(config.series_path, Some(PathBuf::from("/tmp/series.csv")));
        assert_eq!(config.columns.score, "Scor");
        assert_eq!(config.device_url.as_str(), "http://washer.local:8000/api/");
        assert!(config.poll_interval.is_none());
        assert_eq!(config.policy.yellow_lookback, 6);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(config_with(&[("WASH_YELLOW_LOOKBACK", "twelve")]).is_err());
        assert!(config_with(&[("WASH_DEVICE_URL", "not a url")]).is_err());
    }
}
