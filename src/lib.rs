// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod classify;
pub mod config;
pub mod entry;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod poller;
pub mod sanitize;
pub mod shutdown;
pub mod sources;
pub mod state;

// ---- Re-exports for stable public API ----
pub use crate::classify::{classify, Classified};
pub use crate::config::{RelayConfig, SourceConfig};
pub use crate::entry::NormalizedEntry;
pub use crate::error::RelayError;
pub use crate::notify::{WebhookClient, WebhookOverrides, WebhookPayload};
pub use crate::poller::{process_source, Poller, RunState};
pub use crate::shutdown::Shutdown;
pub use crate::sources::{SourceStrategy, Strategies, StrategyKind};
pub use crate::state::{SeenIds, StateStore};

use std::sync::Arc;

/// Strategies wired to the forum scraper configured in `cfg`.
pub fn strategies_from_config(cfg: &RelayConfig) -> Strategies {
    let scraper = sources::CommandScraper::new(cfg.forum.command.clone(), cfg.forum.args.clone())
        .with_timeout(cfg.forum.timeout_secs);
    Strategies::with_scraper(Arc::new(scraper))
}
