// src/sources/mod.rs
//! Per-source fetch + identify + normalize strategies.

pub mod forum;
pub mod rss;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::entry::NormalizedEntry;
use crate::error::Result;

pub use forum::{CommandScraper, ForumPost, ForumStrategy, ThreadScraper};
pub use rss::{FeedItem, RssStrategy};

#[async_trait]
pub trait SourceStrategy: Send + Sync {
    type Entry: Send + Sync;

    /// Fetch raw entries, oldest first, together with the source's own title.
    async fn fetch_entries(&self, url: &str) -> Result<(Vec<Self::Entry>, String)>;

    /// Identifier that stays stable across polls for the same logical entry.
    fn entry_id(&self, entry: &Self::Entry) -> String;

    /// Build the normalized record. `now` stands in for a missing timestamp.
    fn entry_data(&self, entry: &Self::Entry, now: DateTime<Utc>) -> NormalizedEntry;
}

/// Configured strategy tag. Unknown tags fall back to [`StrategyKind::Rss`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    Rss,
    Forum,
}

impl StrategyKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "rss" | "atom" | "feed" => Self::Rss,
            "forum" | "xenforo" => Self::Forum,
            other => {
                tracing::warn!(strategy = other, "unknown strategy, falling back to rss");
                Self::Rss
            }
        }
    }
}

/// Raw entry of whichever strategy produced it.
#[derive(Debug, Clone)]
pub enum RawEntry {
    Feed(FeedItem),
    Post(ForumPost),
}

/// Closed set of strategies, selected by [`StrategyKind`].
#[derive(Clone)]
pub enum Strategy {
    Rss(RssStrategy),
    Forum(ForumStrategy),
}

#[async_trait]
impl SourceStrategy for Strategy {
    type Entry = RawEntry;

    async fn fetch_entries(&self, url: &str) -> Result<(Vec<RawEntry>, String)> {
        match self {
            Strategy::Rss(s) => {
                let (items, title) = s.fetch_entries(url).await?;
                Ok((items.into_iter().map(RawEntry::Feed).collect(), title))
            }
            Strategy::Forum(s) => {
                let (posts, title) = s.fetch_entries(url).await?;
                Ok((posts.into_iter().map(RawEntry::Post).collect(), title))
            }
        }
    }

    fn entry_id(&self, entry: &RawEntry) -> String {
        match entry {
            RawEntry::Feed(item) => item.entry_id(),
            RawEntry::Post(post) => post.entry_id(),
        }
    }

    fn entry_data(&self, entry: &RawEntry, now: DateTime<Utc>) -> NormalizedEntry {
        match entry {
            RawEntry::Feed(item) => item.normalize(now),
            RawEntry::Post(post) => post.normalize(now),
        }
    }
}

/// One instance of each strategy, shared across cycles.
#[derive(Clone)]
pub struct Strategies {
    rss: RssStrategy,
    forum: ForumStrategy,
}

impl Strategies {
    pub fn new(rss: RssStrategy, forum: ForumStrategy) -> Self {
        Self { rss, forum }
    }

    pub fn with_scraper(scraper: Arc<dyn ThreadScraper>) -> Self {
        Self::new(RssStrategy::new(), ForumStrategy::new(scraper))
    }

    pub fn select(&self, kind: StrategyKind) -> Strategy {
        match kind {
            StrategyKind::Rss => Strategy::Rss(self.rss.clone()),
            StrategyKind::Forum => Strategy::Forum(self.forum.clone()),
        }
    }
}
