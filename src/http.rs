use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Local, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::device::PowerState;
use crate::engine;
use crate::locator;
use crate::profile::{hourly_profile, HourlyScore};
use crate::quartiles::{ColorBand, Quartiles};
use crate::series::{parse_timestamp, SeriesError};
use crate::state::{AppState, DecisionReport, Snapshot};
use crate::windows::{RankedWindow, WindowConstraints};

const DEFAULT_DURATION_MINUTES: u32 = 60;

type HttpResult<T> = Result<Json<T>, (StatusCode, String)>;

fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

fn map_series_error(err: SeriesError) -> (StatusCode, String) {
    let status = match &err {
        SeriesError::NoSeriesFile(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(error = %err, status = %status, "score series unavailable");
    (status, err.to_string())
}

fn parse_when(raw: Option<&str>) -> Result<NaiveDateTime, (StatusCode, String)> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(now_local()),
        Some(value) => parse_timestamp(value)
            .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("invalid timestamp '{value}'"))),
    }
}

fn parse_hhmm(name: &str, raw: Option<&str>) -> Result<Option<NaiveTime>, (StatusCode, String)> {
    let Some(value) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    NaiveTime::parse_from_str(value, "%H:%M")
        .map(Some)
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("{name} must be HH:MM")))
}

/// Runs series I/O (and possibly the blocking device call) off the async workers.
async fn run_blocking<T, F>(state: AppState, work: F) -> Result<T, (StatusCode, String)>
where
    T: Send + 'static,
    F: FnOnce(AppState) -> Result<T, SeriesError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(state))
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "blocking task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
        })?
        .map_err(map_series_error)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct TimelineRow {
    time: String,
    timestamp: NaiveDateTime,
    score: Option<f64>,
    color: ColorBand,
}

#[derive(Debug, Serialize)]
struct ScoreResponse {
    source: String,
    data: Vec<TimelineRow>,
    quartiles: Option<Quartiles>,
    cadence_seconds: f64,
    current_score: Option<f64>,
    current_color: Option<ColorBand>,
    current_time: Option<NaiveDateTime>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn score_response(snapshot: Snapshot, when: NaiveDateTime) -> ScoreResponse {
    let series = &snapshot.series;
    let current = locator::locate(series, when);
    let data = series
        .intervals
        .iter()
        .map(|item| TimelineRow {
            time: item.interval.start.format("%H:%M").to_string(),
            timestamp: item.interval.start,
            score: Some(item.interval.score)
                .filter(|score| score.is_finite())
                .map(round2),
            color: item.color,
        })
        .collect();
    ScoreResponse {
        source: snapshot.source.clone(),
        data,
        quartiles: series.quartiles,
        cadence_seconds: series.cadence_seconds,
        current_score: current
            .map(|found| found.interval.interval.score)
            .filter(|score| score.is_finite())
            .map(round2),
        current_color: current.map(|found| found.interval.color),
        current_time: current.map(|_| locator::round_to_bucket(when)),
    }
}

async fn get_score(State(state): State<AppState>) -> HttpResult<ScoreResponse> {
    let when = now_local();
    let snapshot = run_blocking(state, |state| state.snapshot()).await?;
    Ok(Json(score_response(snapshot, when)))
}

#[derive(Debug, Default, Deserialize)]
struct DecisionRequest {
    when: Option<String>,
}

async fn decide(state: AppState, when: NaiveDateTime) -> HttpResult<DecisionReport> {
    let report = run_blocking(state, move |state| state.decide_at(when)).await?;
    Ok(Json(report))
}

async fn get_decision(
    State(state): State<AppState>,
    Query(query): Query<DecisionRequest>,
) -> HttpResult<DecisionReport> {
    let when = parse_when(query.when.as_deref())?;
    decide(state, when).await
}

/// An empty body means "now".
async fn post_decision(State(state): State<AppState>, body: Bytes) -> HttpResult<DecisionReport> {
    let request: DecisionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DecisionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| (StatusCode::BAD_REQUEST, format!("invalid request body: {err}")))?
    };
    let when = parse_when(request.when.as_deref())?;
    decide(state, when).await
}

#[derive(Debug, Deserialize)]
struct WindowsQuery {
    duration_minutes: Option<u32>,
    reference_score: Option<f64>,
    earliest_after: Option<String>,
    latest_before: Option<String>,
    deadline: Option<String>,
}

#[derive(Debug, Serialize)]
struct WindowsResponse {
    source: String,
    duration_minutes: u32,
    reference_score: Option<f64>,
    windows: Vec<RankedWindow>,
}

async fn get_windows(
    State(state): State<AppState>,
    Query(query): Query<WindowsQuery>,
) -> HttpResult<WindowsResponse> {
    let duration_minutes = query.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
    let constraints = WindowConstraints {
        earliest_after: parse_hhmm("earliest_after", query.earliest_after.as_deref())?,
        latest_before: parse_hhmm("latest_before", query.latest_before.as_deref())?,
        deadline: parse_hhmm("deadline", query.deadline.as_deref())?,
    };
    let when = now_local();
    let snapshot = run_blocking(state, |state| state.snapshot()).await?;

    let reference_score = query
        .reference_score
        .or_else(|| engine::current_score(&snapshot.series, when));
    let windows = engine::rank_windows(
        &snapshot.series,
        duration_minutes,
        reference_score.unwrap_or(0.0),
        &constraints,
    );
    Ok(Json(WindowsResponse {
        source: snapshot.source,
        duration_minutes,
        reference_score,
        windows,
    }))
}

async fn get_hourly(State(state): State<AppState>) -> HttpResult<Vec<HourlyScore>> {
    let snapshot = run_blocking(state, |state| state.snapshot()).await?;
    Ok(Json(hourly_profile(&snapshot.series)))
}

#[derive(Debug, Serialize)]
struct DeviceResponse {
    power: PowerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous: Option<PowerState>,
}

async fn get_device(State(state): State<AppState>) -> Json<DeviceResponse> {
    Json(DeviceResponse {
        power: state.device.power(),
        previous: None,
    })
}

async fn reset_device(State(state): State<AppState>) -> Json<DeviceResponse> {
    let previous = state.device.reset();
    tracing::info!(previous = %previous, "device state reset");
    Json(DeviceResponse {
        power: state.device.power(),
        previous: Some(previous),
    })
}

pub fn router(state: AppState) -> Router {
    // The dashboard frontend runs on its own dev port.
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://localhost:3000"),
        ])
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/score", get(get_score))
        .route("/v1/decision", get(get_decision).post(post_decision))
        .route("/v1/windows", get(get_windows))
        .route("/v1/hourly", get(get_hourly))
        .route("/v1/device", get(get_device))
        .route("/v1/device/reset", post(reset_device))
        .layer(cors)
        .with_state(state)
}
