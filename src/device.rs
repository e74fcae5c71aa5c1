use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{LockResult, Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    #[default]
    Off,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The device flag shared by every decision evaluation. Starts `off`.
///
/// `power` is only ever locked for a read or a write. Activations serialize on a
/// separate lock that is held across the trigger call, so readers and resets never
/// wait on device I/O.
#[derive(Debug, Default)]
pub struct DeviceState {
    power: Mutex<PowerState>,
    activation: Mutex<()>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn power(&self) -> PowerState {
        *recover(self.power.lock())
    }

    /// External reset back to `off`; the decision policy itself never turns the device off.
    pub fn reset(&self) -> PowerState {
        let mut guard = recover(self.power.lock());
        let previous = *guard;
        *guard = PowerState::Off;
        previous
    }

    pub(crate) fn set_power(&self, next: PowerState) {
        *recover(self.power.lock()) = next;
    }

    /// Blocks until no other activation is in flight.
    pub(crate) fn begin_activation(&self) -> MutexGuard<'_, ()> {
        recover(self.activation.lock())
    }
}

// A panicking trigger must not wedge the device flag.
fn recover<T>(result: LockResult<MutexGuard<'_, T>>) -> MutexGuard<'_, T> {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The action that powers the device on.
pub trait Trigger: Send + Sync {
    fn power_on(&self) -> Result<()>;

    /// Best-effort follow-up after a successful power-on; runs outside any device lock.
    fn report_status(&self) {}
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    power: String,
}

/// Drives a device exposing `GET /power?state=on` and `GET /status`.
#[derive(Debug, Clone)]
pub struct HttpTrigger {
    base_url: Url,
    client: reqwest::blocking::Client,
}

impl HttpTrigger {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build device http client")?;
        Ok(Self { base_url, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid device endpoint {path}"))
    }

    /// Power state as reported by `GET status`.
    pub fn status(&self) -> Result<String> {
        let response = self
            .client
            .get(self.endpoint("status")?)
            .send()
            .with_context(|| format!("device at {} unreachable", self.base_url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("device status request failed: {status}");
        }
        let body: StatusResponse = response
            .json()
            .context("device status was not valid json")?;
        Ok(body.power)
    }
}

impl Trigger for HttpTrigger {
    fn power_on(&self) -> Result<()> {
        let url = self.endpoint("power")?;
        let response = self
            .client
            .get(url)
            .query(&[("state", "on")])
            .send()
            .with_context(|| format!("device at {} unreachable", self.base_url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("device rejected power-on command: {status}");
        }
        tracing::info!(device = %self.base_url, "power-on command accepted");
        Ok(())
    }

    fn report_status(&self) {
        match self.status() {
            Ok(power) => tracing::info!(power = %power, "device reported power state"),
            Err(err) => {
                let error = format!("{err:#}");
                tracing::warn!(error = %error, "device status unavailable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    /// Serves `app` on an ephemeral loopback port; the blocking client runs on the test thread.
    fn serve_stub(app: Router) -> (tokio::runtime::Runtime, Url) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let addr = listener.local_addr().unwrap();
        runtime.spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (runtime, Url::parse(&format!("http://{addr}/")).unwrap())
    }

    #[test]
    fn starts_off_and_resets_to_off() {
        let device = DeviceState::new();
        assert_eq!(device.power(), PowerState::Off);
        device.set_power(PowerState::On);
        assert_eq!(device.power(), PowerState::On);
        assert_eq!(device.reset(), PowerState::On);
        assert_eq!(device.power(), PowerState::Off);
    }

    #[test]
    fn power_state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PowerState::On).unwrap(), "\"on\"");
        assert_eq!(PowerState::Off.to_string(), "off");
    }

    #[test]
    fn unreachable_device_is_an_error_not_a_panic() {
        // Port 9 (discard) on loopback is expected to refuse connections.
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let trigger = HttpTrigger::new(url, Duration::from_millis(500)).unwrap();
        assert!(trigger.power_on().is_err());
    }

    #[test]
    fn endpoints_join_under_base_path() {
        let url = Url::parse("http://127.0.0.1:5000/washer/").unwrap();
        let trigger = HttpTrigger::new(url, Duration::from_secs(1)).unwrap();
        assert_eq!(
            trigger.endpoint("power").unwrap().as_str(),
            "http://127.0.0.1:5000/washer/power"
        );
    }

    #[test]
    fn rejected_power_on_is_an_error() {
        let app = Router::new()
            .route("/power", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/status", get(|| async { Json(json!({ "power": "off" })) }));
        let (runtime, url) = serve_stub(app);

        let trigger = HttpTrigger::new(url, Duration::from_secs(2)).unwrap();
        let err = trigger.power_on().unwrap_err();
        assert!(err.to_string().contains("device rejected power-on command"));
        assert!(err.to_string().contains("500"));
        drop(trigger);
        drop(runtime);
    }

    #[test]
    fn accepted_power_on_then_status_is_read() {
        let app = Router::new()
            .route(
                "/power",
                get(|| async { Json(json!({ "status": "success", "power": "on" })) }),
            )
            .route("/status", get(|| async { Json(json!({ "power": "on" })) }));
        let (runtime, url) = serve_stub(app);

        let trigger = HttpTrigger::new(url, Duration::from_secs(2)).unwrap();
        trigger.power_on().unwrap();
        assert_eq!(trigger.status().unwrap(), "on");
        trigger.report_status();
        drop(trigger);
        drop(runtime);
    }

    #[test]
    fn malformed_status_is_reported_not_raised() {
        let app = Router::new()
            .route("/power", get(|| async { StatusCode::OK }))
            .route("/status", get(|| async { "not json" }));
        let (runtime, url) = serve_stub(app);

        let trigger = HttpTrigger::new(url, Duration::from_secs(2)).unwrap();
        trigger.power_on().unwrap();
        let err = trigger.status().unwrap_err();
        assert!(format!("{err:#}").contains("not valid json"));
        // Best-effort path only logs.
        trigger.report_status();
        drop(trigger);
        drop(runtime);
    }
}
