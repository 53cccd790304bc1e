// src/entry.rs
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Source-independent view of one entry, built once at the strategy boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEntry {
    pub title: String,
    /// May be empty.
    pub link: String,
    /// Sanitized, at most 2000 chars.
    pub description: String,
    /// May be empty.
    pub author: String,
    /// When the source stated one; `None` means the age is unknown.
    pub published: Option<DateTime<Utc>>,
    /// ISO-8601 with explicit UTC offset; falls back to normalization time.
    pub timestamp: String,
}

impl NormalizedEntry {
    /// Fill `timestamp` from `published`, or from `now` when the source gave none.
    pub fn stamp(mut self, now: DateTime<Utc>) -> Self {
        self.timestamp = iso_utc(self.published.unwrap_or(now));
        self
    }
}

pub fn iso_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Stable fallback identifier: short SHA-256 hex over a canonical rendering.
pub fn content_hash(canonical: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
