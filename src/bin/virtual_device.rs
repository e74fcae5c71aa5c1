//! Stand-in washer for local runs: answers `/power?state=on|off` and `/status`.

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, Mutex};

use wash_advisor::device::PowerState;

#[derive(Clone, Default)]
struct VirtualDevice {
    power: Arc<Mutex<PowerState>>,
}

impl VirtualDevice {
    fn get(&self) -> PowerState {
        *self.power.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set(&self, next: PowerState) {
        *self.power.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
    }
}

#[derive(Debug, Deserialize)]
struct PowerQuery {
    state: Option<String>,
}

async fn power(
    State(device): State<VirtualDevice>,
    Query(query): Query<PowerQuery>,
) -> (StatusCode, Json<JsonValue>) {
    let next = match query.state.as_deref() {
        Some("on") => PowerState::On,
        Some("off") => PowerState::Off,
        other => {
            tracing::warn!(state = ?other, "rejected power command");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid state. Use ?state=on or ?state=off" })),
            );
        }
    };
    device.set(next);
    tracing::info!(power = %next, "power state changed");
    (
        StatusCode::OK,
        Json(json!({ "status": "success", "power": next })),
    )
}

async fn status(State(device): State<VirtualDevice>) -> Json<JsonValue> {
    Json(json!({ "power": device.get() }))
}

fn router(device: VirtualDevice) -> Router {
    Router::new()
        .route("/power", get(power))
        .route("/status", get(status))
        .with_state(device)
}

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,virtual_device=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing()?;

    let bind = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("VIRTUAL_DEVICE_BIND").ok())
        .unwrap_or_else(|| "127.0.0.1:5000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, "virtual device listening");

    axum::serve(listener, router(VirtualDevice::default()))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, JsonValue) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn power_commands_update_status() {
        let device = VirtualDevice::default();
        let app = router(device.clone());

        let (_, body) = get_json(app.clone(), "/status").await;
        assert_eq!(body["power"], "off");

        let (status, body) = get_json(app.clone(), "/power?state=on").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(device.get(), PowerState::On);

        let (_, body) = get_json(app, "/status").await;
        assert_eq!(body["power"], "on");
    }

    #[tokio::test]
    async fn rejects_unknown_states() {
        let device = VirtualDevice::default();
        let (status, body) = get_json(router(device.clone()), "/power?state=maybe").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Invalid state"));
        assert_eq!(device.get(), PowerState::Off);

        let (status, _) = get_json(router(device), "/power").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
