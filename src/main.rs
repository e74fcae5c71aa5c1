mod cli;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDateTime, NaiveTime};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use wash_advisor::config::Config;
use wash_advisor::device::{HttpTrigger, Trigger};
use wash_advisor::engine;
use wash_advisor::http;
use wash_advisor::poller::DecisionPoller;
use wash_advisor::series::parse_timestamp;
use wash_advisor::state::AppState;
use wash_advisor::windows::WindowConstraints;

use crate::cli::{Cli, Commands, DecideArgs, WindowsArgs};

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,wash_advisor=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    init_tracing()?;
    if let Some(series) = cli.series {
        config.series_path = Some(series);
    }

    // The blocking client must be built (and dropped) outside the async runtime.
    let trigger: Arc<dyn Trigger> = Arc::new(
        HttpTrigger::new(config.device_url.clone(), config.device_timeout)
            .context("failed to build device client")?,
    );
    let state = AppState::new(&config, trigger.clone());

    match cli.command {
        Commands::Serve => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let result = runtime.block_on(serve(&config, state));
            drop(runtime);
            drop(trigger);
            result
        }
        Commands::Decide(args) => decide(&state, args),
        Commands::Windows(args) => windows(&state, args),
        Commands::Timeline => {
            let snapshot = state.snapshot()?;
            print_json(&snapshot.series.intervals)
        }
    }
}

async fn serve(config: &Config, state: AppState) -> Result<()> {
    let cancel = CancellationToken::new();
    let poller_handle = config
        .poll_interval
        .map(|interval| DecisionPoller::new(state.clone(), interval).start(cancel.clone()));
    if poller_handle.is_none() {
        tracing::info!("decision poller disabled");
    }

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&config.http_bind)
        .await
        .with_context(|| format!("failed to bind {}", config.http_bind))?;
    tracing::info!(
        bind = %config.http_bind,
        device = %config.device_url,
        "wash-advisor HTTP listening"
    );
    let http_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "http server exited");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = http_handle => {}
    }

    cancel.cancel();
    if let Some(handle) = poller_handle {
        handle.await.ok();
    }
    Ok(())
}

fn decide(state: &AppState, args: DecideArgs) -> Result<()> {
    let when = match args.at.as_deref() {
        Some(raw) => parse_timestamp(raw).ok_or_else(|| anyhow!("invalid --at timestamp '{raw}'"))?,
        None => Local::now().naive_local(),
    };
    let report = state.decide_at(when)?;
    print_json(&report)
}

fn windows(state: &AppState, args: WindowsArgs) -> Result<()> {
    let constraints = WindowConstraints {
        earliest_after: parse_hhmm("--earliest-after", args.earliest_after.as_deref())?,
        latest_before: parse_hhmm("--latest-before", args.latest_before.as_deref())?,
        deadline: parse_hhmm("--deadline", args.deadline.as_deref())?,
    };
    let snapshot = state.snapshot()?;
    let now: NaiveDateTime = Local::now().naive_local();
    let reference = args
        .reference_score
        .or_else(|| engine::current_score(&snapshot.series, now))
        .unwrap_or(0.0);
    let ranked = engine::rank_windows(&snapshot.series, args.duration, reference, &constraints);
    if ranked.is_empty() {
        tracing::warn!(
            source = %snapshot.source,
            duration_minutes = args.duration,
            "no window fits the series"
        );
    }
    print_json(&ranked)
}

fn parse_hhmm(flag: &str, raw: Option<&str>) -> Result<Option<NaiveTime>> {
    raw.map(|value| {
        NaiveTime::parse_from_str(value.trim(), "%H:%M")
            .with_context(|| format!("{flag} must be HH:MM, got '{value}'"))
    })
    .transpose()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
