// src/poller.rs
//! Run loop: poll every source, forward new entries, persist, sleep, repeat.

use anyhow::Result;
use chrono::Utc;
use metrics::{counter, gauge};
use std::path::PathBuf;
use std::time::Duration;

use crate::classify::classify;
use crate::config::{self, RelayConfig, SourceConfig};
use crate::error::RelayError;
use crate::metrics as m;
use crate::notify::WebhookClient;
use crate::shutdown::Shutdown;
use crate::sources::{SourceStrategy, Strategies};
use crate::state::{StateStore, DELIVERED_CAP};

const ERROR_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Sleeping,
    ShuttingDown,
    Stopped,
}

/// Outcome of one source pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub fetched: usize,
    pub new: usize,
    pub delivered: usize,
    pub failed: usize,
    pub skipped_old: usize,
    /// Entries left undelivered because shutdown was requested.
    pub interrupted: usize,
}

/// Totals over one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sources: usize,
    pub source_errors: usize,
    pub delivered: usize,
    pub failed: usize,
    pub skipped_old: usize,
}

/// Per-source knobs resolved from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct PassSettings {
    pub max_age_days: i64,
    pub delay_between_posts: Duration,
}

/// Fetch, classify and deliver one source, then persist if anything changed.
///
/// Only identifiers of successfully delivered entries are recorded, so a
/// failed delivery is retried on the next cycle.
pub async fn process_source<S: SourceStrategy>(
    strategy: &S,
    source: &SourceConfig,
    settings: PassSettings,
    store: &mut StateStore,
    client: &WebhookClient,
    shutdown: &Shutdown,
) -> Result<SourceReport, RelayError> {
    let name = source.display_name();
    let (raw, source_title) = strategy.fetch_entries(&source.url).await?;

    let now = Utc::now();
    let seen = store.document_mut().seen_mut(&source.url);
    let classified = classify(strategy, &raw, seen, settings.max_age_days, now);

    let mut report = SourceReport {
        fetched: raw.len(),
        new: classified.new_entries.len(),
        skipped_old: classified.skipped_old,
        ..Default::default()
    };
    if classified.skipped_old > 0 {
        tracing::info!(source = %name, count = classified.skipped_old, "skipped entries older than the age limit");
        counter!(m::TOO_OLD).increment(classified.skipped_old as u64);
    }
    if report.new == 0 {
        tracing::debug!(source = %name, "no new entries");
    } else {
        tracing::info!(source = %name, count = report.new, "found new entries");
    }

    let overrides = source.overrides();
    let total = classified.new_entries.len();
    for (i, (id, entry)) in classified.new_entries.into_iter().enumerate() {
        if shutdown.is_triggered() {
            report.interrupted = total - i;
            break;
        }
        if client
            .send(&source.webhook, &entry, &source_title, &overrides, shutdown)
            .await
        {
            store
                .document_mut()
                .seen_mut(&source.url)
                .push_capped(id, DELIVERED_CAP);
            report.delivered += 1;
            counter!(m::DELIVERED).increment(1);

            let more = i + 1 < total;
            if more && !shutdown.sleep(settings.delay_between_posts).await {
                report.interrupted = total - i - 1;
                break;
            }
        } else {
            report.failed += 1;
            counter!(m::DELIVERY_FAILURES).increment(1);
        }
    }

    if report.interrupted > 0 {
        tracing::info!(source = %name, remaining = report.interrupted, "batch interrupted by shutdown");
    }
    if report.delivered > 0 || report.skipped_old > 0 {
        if let Err(e) = store.save().await {
            tracing::error!(source = %name, error = %e, "could not persist state");
        }
    }
    Ok(report)
}

pub struct Poller {
    config: RelayConfig,
    config_path: Option<PathBuf>,
    strategies: Strategies,
    client: WebhookClient,
    store: StateStore,
    shutdown: Shutdown,
    state: RunState,
    error_backoff: Duration,
}

impl Poller {
    pub fn new(
        config: RelayConfig,
        strategies: Strategies,
        client: WebhookClient,
        store: StateStore,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            config,
            config_path: None,
            strategies,
            client,
            store,
            shutdown,
            state: RunState::Running,
            error_backoff: ERROR_BACKOFF,
        }
    }

    /// Re-read sources and settings from `path` at the start of every cycle.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn reload_config(&mut self) -> Result<()> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };
        let mut fresh = config::load_from(path)?;
        // the store is already open; its path is fixed for the process lifetime
        fresh.state_path = self.config.state_path.clone();
        self.config = fresh;
        Ok(())
    }

    /// One pass over every configured source.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.reload_config()?;
        m::ensure_described();

        let mut cycle = CycleReport::default();
        let sources = self.config.feeds.clone();
        for source in &sources {
            if self.shutdown.is_triggered() {
                break;
            }
            let name = source.display_name();
            if !source.is_routable() {
                tracing::warn!(source = %name, "skipping source: missing url or webhook");
                continue;
            }
            cycle.sources += 1;
            tracing::info!(source = %name, "processing source");

            let settings = PassSettings {
                max_age_days: source.max_age_days(self.config.max_post_age_days),
                delay_between_posts: Duration::try_from_secs_f64(self.config.delay_between_posts)
                    .unwrap_or_default(),
            };
            let strategy = self.strategies.select(source.kind());
            match process_source(
                &strategy,
                source,
                settings,
                &mut self.store,
                &self.client,
                &self.shutdown,
            )
            .await
            {
                Ok(r) => {
                    cycle.delivered += r.delivered;
                    cycle.failed += r.failed;
                    cycle.skipped_old += r.skipped_old;
                }
                Err(e) => {
                    tracing::error!(source = %name, error = %e, "error processing source");
                    counter!(m::SOURCE_ERRORS).increment(1);
                    cycle.source_errors += 1;
                }
            }
        }

        counter!(m::CYCLES).increment(1);
        gauge!(m::LAST_CYCLE_TS).set(Utc::now().timestamp() as f64);
        Ok(cycle)
    }

    /// Loop until shutdown is requested.
    pub async fn run(&mut self) {
        tracing::info!(
            sources = self.config.feeds.len(),
            refresh_interval = self.config.refresh_interval,
            "starting relay"
        );

        while !self.shutdown.is_triggered() {
            self.state = RunState::Running;
            match self.run_cycle().await {
                Ok(report) => tracing::info!(
                    sources = report.sources,
                    delivered = report.delivered,
                    failed = report.failed,
                    skipped_old = report.skipped_old,
                    errors = report.source_errors,
                    "cycle finished"
                ),
                Err(e) => {
                    tracing::error!(error = %format!("{e:#}"), backoff = ?self.error_backoff, "unexpected error in main loop");
                    if !self.shutdown.sleep(self.error_backoff).await {
                        break;
                    }
                    continue;
                }
            }

            if self.shutdown.is_triggered() {
                break;
            }
            self.state = RunState::Sleeping;
            tracing::info!(seconds = self.config.refresh_interval, "waiting until next refresh");
            if !self.shutdown.sleep(Duration::from_secs(self.config.refresh_interval)).await {
                break;
            }
        }

        self.state = RunState::ShuttingDown;
        tracing::info!("shutting down");
        self.state = RunState::Stopped;
    }
}
