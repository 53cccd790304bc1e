// src/sources/rss.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use super::SourceStrategy;
use crate::entry::{content_hash, NormalizedEntry};
use crate::error::{RelayError, Result};
use crate::sanitize::{self, Flavor};

const USER_AGENT: &str = concat!("feed-relay/", env!("CARGO_PKG_VERSION"), " (+rss reader)");
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_FEED_TITLE: &str = "RSS Feed";
const DEFAULT_ENTRY_TITLE: &str = "No Title";

/// One `<item>` / `<entry>` as found in the document. Fields are raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub id: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
}

impl FeedItem {
    /// Explicit id, then link, then title, then a hash of the whole item.
    pub fn entry_id(&self) -> String {
        [&self.id, &self.link, &self.title]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| {
                content_hash(&serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}")))
            })
    }

    /// Published time, then updated time.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.published
            .as_deref()
            .and_then(parse_feed_date)
            .or_else(|| self.updated.as_deref().and_then(parse_feed_date))
    }

    pub fn normalize(&self, now: DateTime<Utc>) -> NormalizedEntry {
        let title = self
            .title
            .as_deref()
            .map(|t| html_escape::decode_html_entities(t).trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_ENTRY_TITLE.to_string());
        let body = self
            .summary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.content.as_deref())
            .unwrap_or_default();

        NormalizedEntry {
            title,
            link: self.link.clone().unwrap_or_default(),
            description: sanitize::description(body, Flavor::Feed),
            author: self.author.clone().unwrap_or_default(),
            published: self.timestamp(),
            timestamp: String::new(),
        }
        .stamp(now)
    }
}

/// Result of reading a feed document.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    /// Document order (newest first for most feeds).
    pub items: Vec<FeedItem>,
    /// Reader error that cut parsing short, if any.
    pub error: Option<String>,
}

/// RFC 3339 (Atom) or RFC 2822 (RSS) to UTC.
pub fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = OffsetDateTime::parse(raw, &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond()))
    {
        return Some(dt);
    }
    // chrono is more lenient with obsolete zone names
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Elements whose text we capture, keyed by local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Link,
    Title,
    Summary,
    Content,
    Author,
    AuthorName,
    Published,
    Updated,
}

fn item_field(name: &[u8], parent: Option<&[u8]>) -> Option<Field> {
    Some(match name {
        b"guid" | b"id" => Field::Id,
        b"link" => Field::Link,
        b"title" => Field::Title,
        b"description" | b"summary" => Field::Summary,
        b"encoded" | b"content" => Field::Content,
        b"author" | b"creator" => Field::Author,
        b"name" if parent == Some(b"author".as_slice()) => Field::AuthorName,
        b"pubDate" | b"published" | b"issued" | b"date" => Field::Published,
        b"updated" | b"modified" => Field::Updated,
        _ => return None,
    })
}

fn is_item(name: &[u8]) -> bool {
    matches!(name, b"item" | b"entry")
}

fn is_feed_root(name: &[u8]) -> bool {
    matches!(name, b"rss" | b"feed" | b"RDF" | b"channel")
}

/// Atom `<link href=".." rel="..">`. Only `alternate` (or unlabelled) links count.
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel_ok = true;
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().ok()?.into_owned();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"rel" => rel_ok = value == "alternate",
            _ => {}
        }
    }
    href.filter(|_| rel_ok)
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value.to_string());
    }
}

/// Event-driven read of an RSS 2.0 / RSS 1.0 / Atom document.
///
/// Stops at the first reader error but keeps every item completed before it.
pub fn parse_feed(xml: &str) -> ParsedFeed {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = ParsedFeed::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut text = String::new();
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                saw_root |= is_feed_root(&name);
                text.clear();
                if is_item(&name) && current.is_none() {
                    current = Some(FeedItem::default());
                } else if let (Some(item), b"link") = (current.as_mut(), name.as_slice()) {
                    if let Some(href) = atom_href(&e) {
                        set_once(&mut item.link, &href);
                    }
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                if let (Some(item), b"link") = (current.as_mut(), e.local_name().as_ref()) {
                    if let Some(href) = atom_href(&e) {
                        set_once(&mut item.link, &href);
                    }
                }
            }
            Ok(Event::Text(t)) => match t.unescape() {
                Ok(s) => text.push_str(&s),
                Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
            },
            Ok(Event::CData(c)) => text.push_str(&String::from_utf8_lossy(&c)),
            Ok(Event::End(_)) => {
                let Some(name) = path.pop() else { continue };
                let parent = path.last().map(Vec::as_slice);
                let value = text.trim();

                if is_item(&name) && parent.map_or(true, |p| !is_item(p)) {
                    if let Some(item) = current.take() {
                        out.items.push(item);
                    }
                } else if let Some(item) = current.as_mut() {
                    match item_field(&name, parent) {
                        Some(Field::Id) => set_once(&mut item.id, value),
                        Some(Field::Link) => set_once(&mut item.link, value),
                        Some(Field::Title) => set_once(&mut item.title, value),
                        Some(Field::Summary) => set_once(&mut item.summary, value),
                        Some(Field::Content) => set_once(&mut item.content, value),
                        Some(Field::Author) | Some(Field::AuthorName) => {
                            set_once(&mut item.author, value)
                        }
                        Some(Field::Published) => set_once(&mut item.published, value),
                        Some(Field::Updated) => set_once(&mut item.updated, value),
                        None => {}
                    }
                } else if name == b"title" && parent.is_some_and(is_feed_root) {
                    set_once(&mut out.title, value);
                }
                text.clear();
            }
            Ok(Event::Eof) => {
                if let Some(open) = path.last() {
                    out.error = Some(format!(
                        "unexpected end of document inside <{}>",
                        String::from_utf8_lossy(open)
                    ));
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                out.error = Some(format!(
                    "xml error at byte {}: {e}",
                    reader.buffer_position()
                ));
                break;
            }
        }
    }

    if out.error.is_none() && !saw_root && out.items.is_empty() {
        out.error = Some("document is not an RSS or Atom feed".to_string());
    }
    out
}

/// Strategy for RSS/Atom documents fetched over HTTP.
#[derive(Clone)]
pub struct RssStrategy {
    client: Client,
}

impl Default for RssStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RssStrategy {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default http client");
                Client::new()
            });
        Self { client }
    }

    /// Turn a document into oldest-first items plus a title.
    pub fn entries_from_document(url: &str, xml: &str) -> Result<(Vec<FeedItem>, String)> {
        let parsed = parse_feed(xml);
        if let Some(err) = &parsed.error {
            if parsed.items.is_empty() {
                tracing::error!(%url, error = %err, "feed unparseable");
                return Err(RelayError::parse(url, err));
            }
            tracing::warn!(
                %url,
                error = %err,
                recovered = parsed.items.len(),
                "feed partially parsed"
            );
        }
        let title = parsed
            .title
            .unwrap_or_else(|| DEFAULT_FEED_TITLE.to_string());
        let mut items = parsed.items;
        items.reverse();
        Ok((items, title))
    }
}

#[async_trait]
impl SourceStrategy for RssStrategy {
    type Entry = FeedItem;

    async fn fetch_entries(&self, url: &str) -> Result<(Vec<FeedItem>, String)> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::fetch(url, e))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| RelayError::fetch(url, e))?;
        let body = resp.text().await.map_err(|e| RelayError::fetch(url, e))?;
        Self::entries_from_document(url, &body)
    }

    fn entry_id(&self, entry: &FeedItem) -> String {
        entry.entry_id()
    }

    fn entry_data(&self, entry: &FeedItem, now: DateTime<Utc>) -> NormalizedEntry {
        entry.normalize(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rfc2822_and_rfc3339_dates_parse_to_utc() {
        let a = parse_feed_date("Tue, 10 Jun 2025 14:00:00 +0200").unwrap();
        assert_eq!(a, Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap());
        let b = parse_feed_date("2025-06-10T12:00:00Z").unwrap();
        assert_eq!(a, b);
        assert!(parse_feed_date("yesterday").is_none());
        assert!(parse_feed_date("  ").is_none());
    }

    #[test]
    fn id_preference_order() {
        let mut item = FeedItem {
            id: Some("guid-1".into()),
            link: Some("https://x/1".into()),
            title: Some("One".into()),
            ..Default::default()
        };
        assert_eq!(item.entry_id(), "guid-1");
        item.id = None;
        assert_eq!(item.entry_id(), "https://x/1");
        item.link = None;
        assert_eq!(item.entry_id(), "One");
        item.title = None;
        item.summary = Some("only a body".into());
        let hashed = item.entry_id();
        assert_eq!(hashed.len(), 32);
        assert_eq!(hashed, item.clone().entry_id());
    }

    #[test]
    fn updated_used_when_published_missing() {
        let item = FeedItem {
            updated: Some("2025-01-01T00:00:00+00:00".into()),
            ..Default::default()
        };
        assert_eq!(
            item.timestamp(),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn atom_link_prefers_alternate() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>A</title>
            <entry><id>e1</id><title>T</title>
              <link rel="self" href="https://x/self"/>
              <link rel="alternate" href="https://x/post"/>
              <author><name>Ann</name></author>
              <updated>2025-02-02T00:00:00Z</updated>
            </entry></feed>"#;
        let parsed = parse_feed(xml);
        assert!(parsed.error.is_none());
        assert_eq!(parsed.title.as_deref(), Some("A"));
        let item = &parsed.items[0];
        assert_eq!(item.link.as_deref(), Some("https://x/post"));
        assert_eq!(item.author.as_deref(), Some("Ann"));
        assert_eq!(item.id.as_deref(), Some("e1"));
    }

    #[test]
    fn eof_with_open_elements_is_reported() {
        let parsed = parse_feed("<rss><channel><title>T</title><item><title>A");
        assert!(parsed.items.is_empty());
        assert!(parsed.error.as_deref().is_some_and(|e| e.contains("end of document")));

        let parsed = parse_feed("<rss><channel><item><guid>a</guid></item><item><title>B");
        assert_eq!(parsed.items.len(), 1);
        assert!(parsed.error.is_some());
    }

    #[test]
    fn non_feed_document_is_an_error() {
        let parsed = parse_feed("<html><body>nope</body></html>");
        assert!(parsed.error.is_some());
        assert!(RssStrategy::entries_from_document("u", "<html></html>").is_err());
    }

    #[test]
    fn normalize_decodes_title_and_falls_back_to_content() {
        let item = FeedItem {
            title: Some("Fish &amp; Chips".into()),
            content: Some("<p>Body</p>".into()),
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2025, 5, 5, 5, 5, 5).unwrap();
        let e = item.normalize(now);
        assert_eq!(e.title, "Fish & Chips");
        assert_eq!(e.description, "Body");
        assert_eq!(e.link, "");
        assert!(e.published.is_none());
        assert_eq!(e.timestamp, "2025-05-05T05:05:05+00:00");
    }
}
