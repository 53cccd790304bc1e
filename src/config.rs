// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::notify::WebhookOverrides;
use crate::sources::StrategyKind;

pub const ENV_CONFIG_PATH: &str = "CONFIG_PATH";
pub const ENV_STATE_PATH: &str = "STATE_PATH";

fn default_refresh_interval() -> u64 {
    300
}
fn default_max_post_age_days() -> i64 {
    7
}
fn default_delay_between_posts() -> f64 {
    2.0
}
fn default_state_path() -> PathBuf {
    PathBuf::from("state.json")
}
fn default_strategy() -> String {
    "rss".to_string()
}
fn default_scraper_command() -> String {
    "forumscraper".to_string()
}
fn default_scraper_timeout() -> u64 {
    120
}

/// Whole configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Seconds between polling cycles.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Global age limit; `<= 0` disables age filtering.
    #[serde(default = "default_max_post_age_days")]
    pub max_post_age_days: i64,
    /// Seconds to wait after each delivered entry.
    #[serde(default = "default_delay_between_posts")]
    pub delay_between_posts: f64,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// `host:port` for the Prometheus endpoint; disabled when absent.
    #[serde(default)]
    pub metrics_addr: Option<String>,
    #[serde(default)]
    pub forum: ForumSettings,
    #[serde(default, alias = "sources")]
    pub feeds: Vec<SourceConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            max_post_age_days: default_max_post_age_days(),
            delay_between_posts: default_delay_between_posts(),
            state_path: default_state_path(),
            metrics_addr: None,
            forum: ForumSettings::default(),
            feeds: Vec::new(),
        }
    }
}

/// External forum scraper invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct ForumSettings {
    #[serde(default = "default_scraper_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_scraper_timeout")]
    pub timeout_secs: u64,
}

impl Default for ForumSettings {
    fn default() -> Self {
        Self {
            command: default_scraper_command(),
            args: Vec::new(),
            timeout_secs: default_scraper_timeout(),
        }
    }
}

/// Embed color as an integer or a `#rrggbb` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedColor(pub u32);

impl<'de> Deserialize<'de> for EmbedColor {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u32),
            Str(String),
        }
        match Raw::deserialize(d)? {
            Raw::Int(v) => Ok(EmbedColor(v)),
            Raw::Str(s) => {
                let hex = s.trim().trim_start_matches('#').trim_start_matches("0x");
                u32::from_str_radix(hex, 16)
                    .map(EmbedColor)
                    .map_err(|_| serde::de::Error::custom(format!("invalid embed color {s:?}")))
            }
        }
    }
}

/// One polled source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub webhook: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub webhook_name: Option<String>,
    #[serde(default)]
    pub webhook_avatar: Option<String>,
    #[serde(default)]
    pub embed_color: Option<EmbedColor>,
    /// Overrides the global age limit for this source.
    #[serde(default)]
    pub max_post_age_days: Option<i64>,
}

impl SourceConfig {
    pub fn new(url: impl Into<String>, webhook: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            webhook: webhook.into(),
            name: None,
            strategy: default_strategy(),
            webhook_name: None,
            webhook_avatar: None,
            embed_color: None,
            max_post_age_days: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.url)
    }

    pub fn kind(&self) -> StrategyKind {
        StrategyKind::from_tag(&self.strategy)
    }

    pub fn overrides(&self) -> WebhookOverrides {
        WebhookOverrides {
            username: self.webhook_name.clone(),
            avatar_url: self.webhook_avatar.clone(),
            color: self.embed_color.map(|c| c.0),
        }
    }

    pub fn max_age_days(&self, global: i64) -> i64 {
        self.max_post_age_days.unwrap_or(global)
    }

    /// Both `url` and `webhook` are set.
    pub fn is_routable(&self) -> bool {
        !self.url.trim().is_empty() && !self.webhook.trim().is_empty()
    }
}

/// Load configuration from an explicit path. Supports TOML or JSON.
pub fn load_from(path: &Path) -> Result<RelayConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mut cfg = parse_config(&content, &ext)
        .with_context(|| format!("parsing config {}", path.display()))?;

    if let Ok(p) = std::env::var(ENV_STATE_PATH) {
        if !p.trim().is_empty() {
            cfg.state_path = PathBuf::from(p);
        }
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Config path resolution:
/// 1) explicit path
/// 2) $CONFIG_PATH
/// 3) config.toml
/// 4) config.json
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        if !p.trim().is_empty() {
            return PathBuf::from(p);
        }
    }
    let json_p = PathBuf::from("config.json");
    let toml_p = PathBuf::from("config.toml");
    if !toml_p.exists() && json_p.exists() {
        return json_p;
    }
    toml_p
}

fn parse_config(s: &str, hint_ext: &str) -> Result<RelayConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).map_err(|e| anyhow!("invalid JSON config: {e}"));
    }
    match toml::from_str::<RelayConfig>(s) {
        Ok(cfg) => Ok(cfg),
        // unknown extension holding JSON
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!("invalid TOML config: {toml_err}")),
    }
}

fn validate(cfg: &RelayConfig) -> Result<()> {
    if cfg.refresh_interval == 0 {
        bail!("refresh_interval must be at least 1 second");
    }
    if !cfg.delay_between_posts.is_finite() || cfg.delay_between_posts < 0.0 {
        bail!("delay_between_posts must be a non-negative number");
    }
    Ok(())
}
