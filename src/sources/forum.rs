// src/sources/forum.rs
use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::SourceStrategy;
use crate::entry::{content_hash, NormalizedEntry};
use crate::error::{RelayError, Result};
use crate::sanitize::{self, Flavor};

const DEFAULT_THREAD_TITLE: &str = "Forum Thread";
const UNKNOWN_AUTHOR: &str = "Unknown";

/// Post fields probed for a timestamp, in order. The first one present wins.
const TIMESTAMP_FIELDS: [&str; 5] = ["timestamp", "created_at", "date", "posted_at", "time"];

/// External capability that scrapes a single forum thread.
///
/// `workdir` is a scratch directory the scraper may write side files into;
/// it is removed once the call returns.
#[async_trait]
pub trait ThreadScraper: Send + Sync {
    async fn scrape_thread(&self, url: &str, workdir: &Path) -> anyhow::Result<Value>;
}

/// Runs an external scraper program and reads its JSON from stdout.
/// The thread URL is passed as the last argument.
#[derive(Debug, Clone)]
pub struct CommandScraper {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandScraper {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl ThreadScraper for CommandScraper {
    async fn scrape_thread(&self, url: &str, workdir: &Path) -> anyhow::Result<Value> {
        let run = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .current_dir(workdir)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .with_context(|| format!("{} timed out after {:?}", self.program, self.timeout))?
            .with_context(|| format!("spawning {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            // last ~300 chars only
            let start = stderr.char_indices().rev().nth(299).map_or(0, |(i, _)| i);
            bail!("{} exited with {}: {}", self.program, output.status, &stderr[start..]);
        }

        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("parsing JSON output of {}", self.program))
    }
}

/// One post, tagged with its parent thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ForumPost {
    pub thread_title: String,
    pub thread_url: Option<String>,
    pub fields: Map<String, Value>,
}

impl ForumPost {
    fn id(&self) -> Option<String> {
        match self.fields.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Explicit post id, else a hash of the post body.
    pub fn entry_id(&self) -> String {
        self.id().unwrap_or_else(|| {
            content_hash(&Value::Object(self.fields.clone()).to_string())
        })
    }

    /// `{thread_url}post-{id}` when both are known.
    pub fn link(&self) -> String {
        match (self.thread_url.as_deref(), self.id()) {
            (Some(base), Some(id)) if !base.is_empty() => format!("{base}post-{id}"),
            _ => String::new(),
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let value = TIMESTAMP_FIELDS
            .iter()
            .find_map(|field| self.fields.get(*field))?;
        let parsed = parse_post_time(value);
        if parsed.is_none() {
            tracing::debug!(value = %value, "unrecognized post timestamp");
        }
        parsed
    }

    fn text_field(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.fields.get(*k))
            .find_map(value_text)
    }

    pub fn normalize(&self, now: DateTime<Utc>) -> NormalizedEntry {
        let body = self.text_field(&["content", "text"]).unwrap_or_default();
        NormalizedEntry {
            title: self.thread_title.clone(),
            link: self.link(),
            description: sanitize::description(&body, Flavor::Forum),
            author: self
                .text_field(&["author", "user"])
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            published: self.timestamp(),
            timestamp: String::new(),
        }
        .stamp(now)
    }
}

/// Plain string, number, or `{name|username}` object as display text.
fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(o) => ["name", "username"]
            .iter()
            .filter_map(|k| o.get(*k))
            .find_map(value_text),
        _ => None,
    }
}

/// ISO string (offset optional, UTC assumed) or epoch seconds.
pub fn parse_post_time(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() {
                return None;
            }
            let floor = secs.floor();
            if floor < i64::MIN as f64 || floor >= i64::MAX as f64 {
                return None;
            }
            let (mut whole, mut nanos) = (floor as i64, ((secs - floor) * 1e9).round() as u32);
            if nanos >= 1_000_000_000 {
                whole = whole.checked_add(1)?;
                nanos = 0;
            }
            DateTime::from_timestamp(whole, nanos)
        }
        Value::String(s) => parse_iso(s.trim()),
        _ => None,
    }
}

fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Deserialize)]
struct ScrapedThread {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    posts: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ThreadList {
    #[serde(default)]
    threads: Vec<ScrapedThread>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScrapeOutput {
    Wrapped { data: ThreadList },
    Bare(ThreadList),
}

/// Pull the first thread's posts out of a scraper result.
pub fn posts_from_output(url: &str, output: Value) -> Result<(Vec<ForumPost>, String)> {
    if !output.is_object() || output.as_object().is_some_and(Map::is_empty) {
        return Err(RelayError::fetch(url, "scraper returned no thread data"));
    }
    let list = match serde_json::from_value::<ScrapeOutput>(output) {
        Ok(ScrapeOutput::Wrapped { data }) | Ok(ScrapeOutput::Bare(data)) => data,
        Err(e) => return Err(RelayError::fetch(url, format!("malformed scraper output: {e}"))),
    };

    let Some(thread) = list.threads.into_iter().next() else {
        return Ok((Vec::new(), DEFAULT_THREAD_TITLE.to_string()));
    };
    let title = thread
        .title
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_THREAD_TITLE.to_string());
    let thread_url = thread.url.filter(|u| !u.is_empty());

    let posts = thread
        .posts
        .into_iter()
        .map(|p| {
            let fields = match p {
                Value::Object(map) => map,
                other => {
                    let mut map = Map::new();
                    let text = match other {
                        Value::String(s) => s,
                        v => v.to_string(),
                    };
                    map.insert("content".into(), Value::String(text));
                    map
                }
            };
            ForumPost {
                thread_title: title.clone(),
                thread_url: thread_url.clone(),
                fields,
            }
        })
        .collect();
    Ok((posts, title))
}

/// Strategy for forum threads, driven through a [`ThreadScraper`].
#[derive(Clone)]
pub struct ForumStrategy {
    scraper: Arc<dyn ThreadScraper>,
}

impl ForumStrategy {
    pub fn new(scraper: Arc<dyn ThreadScraper>) -> Self {
        Self { scraper }
    }
}

#[async_trait]
impl SourceStrategy for ForumStrategy {
    type Entry = ForumPost;

    async fn fetch_entries(&self, url: &str) -> Result<(Vec<ForumPost>, String)> {
        let workdir = tempfile::tempdir().map_err(|e| RelayError::fetch(url, e))?;
        let scraped = self.scraper.scrape_thread(url, workdir.path()).await;
        if let Err(e) = workdir.close() {
            tracing::debug!(error = %e, "could not remove scraper workdir");
        }
        let output = scraped.map_err(|e| RelayError::fetch(url, format!("{e:#}")))?;
        posts_from_output(url, output)
    }

    fn entry_id(&self, entry: &ForumPost) -> String {
        entry.entry_id()
    }

    fn entry_data(&self, entry: &ForumPost, now: DateTime<Utc>) -> NormalizedEntry {
        entry.normalize(now)
    }
}
