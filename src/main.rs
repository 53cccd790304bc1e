//! feed-relay binary entrypoint.
//! Loads configuration, wires strategies/webhook client/state, and runs the poll loop
//! until SIGINT or SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_relay::metrics::Metrics;
use feed_relay::shutdown::{listen_for_signals, Shutdown};
use feed_relay::{config, strategies_from_config, Poller, RelayError, StateStore, WebhookClient};

#[derive(Debug, Parser)]
#[command(name = "feed-relay", version, about = "Forward new feed and forum entries to webhooks")]
struct Cli {
    /// Configuration file (TOML or JSON). Defaults to $CONFIG_PATH, then config.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// State file; overrides `state_path` from the configuration.
    #[arg(long)]
    state: Option<PathBuf>,

    /// Run a single polling cycle and exit.
    #[arg(long)]
    once: bool,
}

/// Compact logs by default, JSON lines with LOG_FORMAT=json.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feed_relay=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let path = config::resolve_path(cli.config.as_deref());

    let mut cfg = match config::load_from(&path) {
        Ok(cfg) => {
            tracing::info!(path = %path.display(), "loaded configuration");
            cfg
        }
        Err(e) => {
            let err = RelayError::Config(format!("{e:#}"));
            tracing::error!(error = %err, "cannot start");
            return ExitCode::SUCCESS;
        }
    };
    if let Some(state) = cli.state {
        cfg.state_path = state;
    }
    if cfg.feeds.is_empty() {
        tracing::warn!("no feeds configured");
        return ExitCode::SUCCESS;
    }

    if let Some(addr) = cfg.metrics_addr.clone() {
        match Metrics::init() {
            Ok(metrics) => {
                if let Err(e) = metrics.serve(&addr).await {
                    tracing::warn!(error = %format!("{e:#}"), "metrics endpoint disabled");
                }
            }
            Err(e) => tracing::warn!(error = %format!("{e:#}"), "metrics recorder not installed"),
        }
    }

    let shutdown = Shutdown::new();
    listen_for_signals(shutdown.clone());

    let store = StateStore::load(cfg.state_path.clone()).await;
    let strategies = strategies_from_config(&cfg);
    let mut poller =
        Poller::new(cfg, strategies, WebhookClient::new(), store, shutdown).with_config_path(path);

    if cli.once {
        match poller.run_cycle().await {
            Ok(report) => tracing::info!(
                delivered = report.delivered,
                failed = report.failed,
                skipped_old = report.skipped_old,
                errors = report.source_errors,
                "single cycle finished"
            ),
            Err(e) => tracing::error!(error = %format!("{e:#}"), "cycle failed"),
        }
    } else {
        poller.run().await;
    }

    ExitCode::SUCCESS
}
