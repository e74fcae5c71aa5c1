use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::device::{DeviceState, Trigger};
use crate::engine;
use crate::policy::{Decision, PolicyConfig};
use crate::quartiles::ColoredSeries;
use crate::series::{SeriesError, SeriesSource};

/// Shared by the HTTP routes and the poller. The device flag is the only mutable part.
#[derive(Clone)]
pub struct AppState {
    pub source: SeriesSource,
    pub policy: PolicyConfig,
    pub device: Arc<DeviceState>,
    pub trigger: Arc<dyn Trigger>,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub source: String,
    pub series: ColoredSeries,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionReport {
    pub source: String,
    pub when: NaiveDateTime,
    #[serde(flatten)]
    pub decision: Decision,
}

impl AppState {
    pub fn new(config: &Config, trigger: Arc<dyn Trigger>) -> Self {
        Self {
            source: config.series_source(),
            policy: config.policy,
            device: Arc::new(DeviceState::new()),
            trigger,
        }
    }

    /// Reads and classifies the series afresh; nothing is cached between requests.
    pub fn snapshot(&self) -> Result<Snapshot, SeriesError> {
        let loaded = self.source.load()?;
        let series = engine::classify(&loaded.records);
        Ok(Snapshot {
            source: loaded.source_name(),
            series,
        })
    }

    /// Blocking: may call the device trigger.
    pub fn decide_at(&self, when: NaiveDateTime) -> Result<DecisionReport, SeriesError> {
        let snapshot = self.snapshot()?;
        let decision = engine::decide(
            &snapshot.series,
            when,
            &self.device,
            self.trigger.as_ref(),
            &self.policy,
        );
        Ok(DecisionReport {
            source: snapshot.source,
            when,
            decision,
        })
    }
}
