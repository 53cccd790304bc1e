// src/notify/mod.rs
pub mod webhook;

use serde::Serialize;

use crate::entry::NormalizedEntry;

pub use webhook::{backoff_delay, WebhookClient};

/// Embed color used when a source does not set one.
pub const DEFAULT_EMBED_COLOR: u32 = 5_814_783;

/// Per-source presentation overrides for the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookOverrides {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub color: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmbedAuthor {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub description: String,
    pub color: u32,
    pub timestamp: String,
    pub footer: EmbedFooter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl WebhookPayload {
    pub fn for_entry(entry: &NormalizedEntry, source_title: &str, ov: &WebhookOverrides) -> Self {
        let author = (!entry.author.is_empty()).then(|| EmbedAuthor {
            name: entry.author.clone(),
        });
        Self {
            embeds: vec![Embed {
                title: entry.title.clone(),
                url: entry.link.clone(),
                description: entry.description.clone(),
                color: ov.color.unwrap_or(DEFAULT_EMBED_COLOR),
                timestamp: entry.timestamp.clone(),
                footer: EmbedFooter {
                    text: source_title.to_string(),
                },
                author,
            }],
            username: ov.username.clone().filter(|s| !s.is_empty()),
            avatar_url: ov.avatar_url.clone().filter(|s| !s.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(author: &str) -> NormalizedEntry {
        NormalizedEntry {
            title: "Title".into(),
            link: "https://x/1".into(),
            description: "Body".into(),
            author: author.into(),
            published: None,
            timestamp: "2025-01-01T00:00:00+00:00".into(),
        }
    }

    #[test]
    fn minimal_payload_omits_optional_fields() {
        let p = WebhookPayload::for_entry(&entry(""), "My Feed", &WebhookOverrides::default());
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({"embeds": [{
                "title": "Title",
                "url": "https://x/1",
                "description": "Body",
                "color": 5814783,
                "timestamp": "2025-01-01T00:00:00+00:00",
                "footer": {"text": "My Feed"}
            }]})
        );
    }

    #[test]
    fn overrides_and_author_are_included() {
        let ov = WebhookOverrides {
            username: Some("Relay".into()),
            avatar_url: Some("https://x/a.png".into()),
            color: Some(0xff0000),
        };
        let v = serde_json::to_value(WebhookPayload::for_entry(&entry("ann"), "F", &ov)).unwrap();
        assert_eq!(v["username"], "Relay");
        assert_eq!(v["avatar_url"], "https://x/a.png");
        assert_eq!(v["embeds"][0]["color"], 0xff0000);
        assert_eq!(v["embeds"][0]["author"]["name"], "ann");
    }
}
