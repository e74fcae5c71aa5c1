use chrono::Local;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::state::{AppState, DecisionReport};

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Re-evaluates the decision for the current wall-clock time on a fixed cadence.
#[derive(Clone)]
pub struct DecisionPoller {
    state: AppState,
    interval: Duration,
}

impl DecisionPoller {
    pub fn new(state: AppState, interval: Duration) -> Self {
        Self {
            state,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub fn start(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(interval_seconds = self.interval.as_secs(), "decision poller started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => self.tick().await,
                }
            }
            tracing::info!("decision poller stopped");
        })
    }

    async fn tick(&self) {
        let state = self.state.clone();
        let when = Local::now().naive_local();
        match tokio::task::spawn_blocking(move || state.decide_at(when)).await {
            Ok(Ok(report)) => log_report(&report),
            Ok(Err(err)) => tracing::warn!(error = %err, "decision tick skipped"),
            Err(err) => tracing::error!(error = %err, "decision tick panicked"),
        }
    }
}

fn log_report(report: &DecisionReport) {
    let decision = &report.decision;
    let color = decision.interval.map(|item| item.color.as_str());
    if decision.triggered {
        tracing::info!(
            source = %report.source,
            when = %report.when,
            reason = decision.reason.as_str(),
            color,
            "washer powered on"
        );
    } else if let Some(error) = decision.error.as_deref() {
        tracing::warn!(
            source = %report.source,
            when = %report.when,
            error,
            "washer trigger failed"
        );
    } else {
        tracing::debug!(
            source = %report.source,
            when = %report.when,
            reason = decision.reason.as_str(),
            color,
            "no trigger"
        );
    }
}
