//! Quote Stream Binary
//!
//! Connects to the market-data gateway, subscribes to the configured symbols
//! and logs everything that arrives until SIGINT/SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! QUOTE_STREAM_SYMBOLS=AAPL,MSFT cargo run --bin quote-stream
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTE_STREAM_GATEWAY_URL`: Gateway endpoint (default: ws://localhost:8000/ws)
//! - `QUOTE_STREAM_SYMBOLS`: Comma-separated symbols to follow
//! - `QUOTE_STREAM_MAX_RECONNECT_ATTEMPTS`: Reconnect budget, 0 = unlimited (default: 5)
//! - `QUOTE_STREAM_RECONNECT_DELAY_MS`: First reconnect delay (default: 3000)
//! - `QUOTE_STREAM_RECONNECT_DELAY_MAX_SECS`: Reconnect delay cap (default: 60)
//! - `QUOTE_STREAM_RECONNECT_MULTIPLIER`: Backoff growth factor (default: 2.0)
//! - `QUOTE_STREAM_CONNECT_TIMEOUT_SECS`: Handshake timeout (default: 10)
//! - `QUOTE_STREAM_PING_INTERVAL_SECS`: Keepalive interval, 0 = off (default: 30)
//! - `QUOTE_STREAM_HISTORY_WINDOW_SECS`: Rolling window (default: 60)
//! - `QUOTE_STREAM_METRICS_PORT`: Prometheus port, 0 = no listener (default: 0)
//! - `OTEL_ENABLED`: Export traces over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use quote_stream::application::adapters::{
    ConnectionStatusAdapter, MultiQuoteAdapter, PriceTrendAdapter,
};
use quote_stream::application::events::{EventKind, StreamEvent};
use quote_stream::infrastructure::gateway::WebSocketTransport;
use quote_stream::infrastructure::telemetry;
use quote_stream::{ClientConfig, MarketDataClient, init_metrics};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting quote stream");

    let config = ClientConfig::from_env().context("invalid quote stream configuration")?;
    log_config(&config);

    init_metrics(config.metrics_port).context("failed to install metrics exporter")?;

    let client = MarketDataClient::from_config(Arc::new(WebSocketTransport::new()), &config);

    let status = ConnectionStatusAdapter::activate(&client);
    let _status_log = client.listen(EventKind::StatusChanged, |event| {
        if let StreamEvent::StatusChanged(state) = event {
            tracing::info!(state = %state, "Connection state changed");
        }
    });
    let _error_log = client.listen(EventKind::Error, |event| {
        if let StreamEvent::Error(error) = event {
            tracing::warn!(kind = ?error.kind, error = %error, "Stream error");
        }
    });

    let board = MultiQuoteAdapter::activate(&client, &config.symbols)?;
    let trends = config
        .symbols
        .iter()
        .map(|symbol| PriceTrendAdapter::activate(&client, symbol, config.history_window))
        .collect::<Result<Vec<_>, _>>()?;

    let trend_view = trends.iter().map(|t| t.symbol().clone()).collect::<Vec<_>>();
    let _quote_log = client.listen(EventKind::Quote, move |event| {
        if let StreamEvent::Quote(quote) = event
            && trend_view.contains(&quote.symbol)
        {
            tracing::info!(
                symbol = %quote.symbol,
                price = %quote.price,
                change = %quote.change,
                direction = quote.direction().as_str(),
                "Quote"
            );
        }
    });

    client.connect()?;
    tracing::info!(symbols = config.symbols.len(), "Quote stream ready");

    await_shutdown().await;

    for trend in &trends {
        tracing::info!(
            symbol = %trend.symbol(),
            direction = trend.direction().as_str(),
            delta = %trend.windowed_delta(config.history_window),
            "Final trend"
        );
    }
    tracing::info!(quotes = board.quotes().len(), errors = board.errors().len(), "Final board");

    client.disconnect();

    let stats = status.stats();
    tracing::info!(
        connections = stats.connections,
        disconnections = stats.disconnections,
        errors = stats.errors,
        reconnect_attempts = stats.reconnect_attempts,
        "Quote stream stopped"
    );
    Ok(())
}

/// Load .env file from current or ancestor directories.
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

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        gateway_url = %config.gateway_url,
        max_reconnect_attempts = config.max_reconnect_attempts,
        reconnect_delay_ms = u64::try_from(config.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        symbols = ?config.symbols,
        ping_interval_secs = config.ping_interval.as_secs(),
        history_window_secs = config.history_window.as_secs(),
        "Stream settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
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
