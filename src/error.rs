// src/error.rs
use thiserror::Error;

/// Failure taxonomy of the relay pipeline.
///
/// Only `Config` is fatal (and only at startup). Everything else is logged
/// and recovered from at the level where it occurs.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("could not parse {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("webhook delivery failed: {0}")]
    Delivery(String),

    #[error("state file {path}: {source}")]
    StateIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl RelayError {
    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(url: &str, reason: impl ToString) -> Self {
        Self::Parse {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
