// src/state.rs
//! Per-source memory of processed entry ids, persisted as one JSON document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{RelayError, Result};

/// Cap applied when recording a delivered entry.
pub const DELIVERED_CAP: usize = 1000;
/// Cap applied when absorbing a too-old entry.
pub const TOO_OLD_CAP: usize = 5000;

/// Ordered, bounded list of processed ids (oldest first).
///
/// Not a set: membership is a linear scan and the same id may be appended
/// twice if a source emits it twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeenIds(Vec<String>);

impl SeenIds {
    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|s| s == id)
    }

    /// Append `id`, then evict from the front until at most `cap` remain.
    pub fn push_capped(&mut self, id: String, cap: usize) {
        self.0.push(id);
        if self.0.len() > cap {
            let excess = self.0.len() - cap;
            self.0.drain(0..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for SeenIds {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceState {
    #[serde(default)]
    pub processed_ids: SeenIds,
}

/// `{"feeds": {<source_url>: {"processed_ids": [...]}}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub feeds: BTreeMap<String, SourceState>,
}

impl StateDocument {
    /// Seen list for `url`, created empty on first use.
    pub fn seen_mut(&mut self, url: &str) -> &mut SeenIds {
        &mut self.feeds.entry(url.to_string()).or_default().processed_ids
    }

    pub fn seen(&self, url: &str) -> Option<&SeenIds> {
        self.feeds.get(url).map(|s| &s.processed_ids)
    }
}

/// Owns the state document and the file it lives in.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    doc: StateDocument,
}

impl StateStore {
    /// Load from `path`. A missing or unreadable file starts an empty document.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match fs::read_to_string(&path).await {
            Ok(s) => match serde_json::from_str::<StateDocument>(&s) {
                Ok(doc) => {
                    tracing::info!(path = %path.display(), sources = doc.feeds.len(), "loaded state");
                    doc
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "state file corrupt, starting fresh");
                    StateDocument::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no state file yet");
                StateDocument::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "state file unreadable, starting fresh");
                StateDocument::default()
            }
        };
        Self { path, doc }
    }

    pub fn in_memory(path: impl Into<PathBuf>, doc: StateDocument) -> Self {
        Self {
            path: path.into(),
            doc,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &StateDocument {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut StateDocument {
        &mut self.doc
    }

    /// Write the full document to a sibling temp file, then rename it over the target.
    pub async fn save(&self) -> Result<()> {
        let io_err = |source| RelayError::StateIo {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(io_err)?;
        }
        let body = serde_json::to_vec_pretty(&self.doc)
            .map_err(|e| io_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, body).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        tracing::debug!(path = %self.path.display(), "state saved");
        Ok(())
    }
}
