//! Invest Stream Binary
//!
//! Opens one market data stream, subscribes to candles, order books, trades,
//! last prices and trading status for a list of instruments, and logs every
//! update as JSON until interrupted.
//!
//! # Usage
//!
//! ```bash
//! TINKOFF_TOKEN=t.xxx cargo run --bin invest-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TINKOFF_TOKEN`: API token
//!
//! ## Optional
//! - `TINKOFF_DEMO`: "true" to use the sandbox (default: false)
//! - `INVEST_ENDPOINT`: Override the server `host:port`
//! - `INVEST_APP_NAME`: Application name sent as `x-app-name`
//! - `INVEST_STREAM_INSTRUMENTS`: Comma-separated instrument ids
//! - `INVEST_STREAM_*`: Reconnect, idle timeout, and candle settings
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use invest_stream::infrastructure::{metrics, telemetry};
use invest_stream::{
    CandleInterval, ClientConfig, GrpcChannelFactory, MarketPayload, SessionConfig, SessionState,
    StreamingSession,
};
use tokio::signal;

/// Instruments streamed when `INVEST_STREAM_INSTRUMENTS` is unset.
const DEFAULT_INSTRUMENTS: &[&str] = &["BBG004730N88", "BBG004731032", "BBG004730RP0"];

/// Order book depth requested by the demo.
const ORDER_BOOK_DEPTH: u32 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP export)
    let telemetry_guard = telemetry::init();
    metrics::describe_metrics();

    tracing::info!(span_export = telemetry_guard.exporting(), "Starting Invest Stream");

    let config = ClientConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let instruments = instruments_from_env();
    let factory = Arc::new(GrpcChannelFactory::new(&config)?);
    let session =
        StreamingSession::open(factory, SessionConfig::from_stream_settings(&config.stream))
            .await
            .context("failed to open market data stream")?;

    session
        .subscribe_candles(&instruments, CandleInterval::OneMinute, |c| {
            log_payload(&MarketPayload::Candle(c.clone()));
        })
        .await?;
    session
        .subscribe_order_book(&instruments, ORDER_BOOK_DEPTH, |b| {
            log_payload(&MarketPayload::OrderBook(b.clone()));
        })
        .await?;
    session
        .subscribe_trades(&instruments, |t| {
            log_payload(&MarketPayload::Trade(t.clone()));
        })
        .await?;
    session
        .subscribe_last_prices(&instruments, |p| {
            log_payload(&MarketPayload::LastPrice(p.clone()));
        })
        .await?;
    session
        .subscribe_trading_status(&instruments, |s| {
            log_payload(&MarketPayload::TradingStatus(s.clone()));
        })
        .await?;

    tracing::info!(instruments = ?instruments, "Streaming");

    let mut state_changes = session.state_changes();
    tokio::select! {
        () = await_shutdown() => {}
        _ = state_changes.wait_for(|s| *s == SessionState::Closed) => {
            tracing::error!(reason = ?session.closed_reason(), "Session closed on its own");
        }
    }

    session.close().await;

    let stats = session.stats();
    tracing::info!(
        generation = stats.generation,
        reconnects = stats.reconnect_attempts,
        malformed_frames = stats.malformed_frames,
        dropped_frames = stats.subscriptions.dropped_frames,
        "Invest Stream stopped"
    );
    Ok(())
}

/// Log one update as a JSON line.
fn log_payload(payload: &MarketPayload) {
    match serde_json::to_string(payload) {
        Ok(json) => tracing::info!(kind = %payload.kind(), payload = %json, "Market data"),
        Err(e) => tracing::warn!(error = %e, kind = %payload.kind(), "Failed to encode update"),
    }
}

/// Instrument ids from `INVEST_STREAM_INSTRUMENTS`, or the defaults.
fn instruments_from_env() -> Vec<String> {
    let configured: Vec<String> = std::env::var("INVEST_STREAM_INSTRUMENTS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();

    if configured.is_empty() {
        DEFAULT_INSTRUMENTS.iter().map(|id| (*id).to_string()).collect()
    } else {
        configured
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        environment = config.environment.as_str(),
        endpoint = %config.endpoint,
        app_name = %config.app_name,
        "Configuration loaded"
    );
    tracing::debug!(
        reconnect_delay_initial = ?config.stream.reconnect_delay_initial,
        reconnect_delay_max = ?config.stream.reconnect_delay_max,
        max_reconnect_attempts = config.stream.max_reconnect_attempts,
        idle_timeout = ?config.stream.idle_timeout,
        candles_waiting_close = config.stream.candles_waiting_close,
        "Stream settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
