// src/classify.rs
//! new / too-old / already-seen partitioning of fetched entries.

use chrono::{DateTime, Utc};

use crate::entry::NormalizedEntry;
use crate::sources::SourceStrategy;
use crate::state::{SeenIds, TOO_OLD_CAP};

#[derive(Debug, Default)]
pub struct Classified {
    /// `(id, entry)` in source order, oldest first.
    pub new_entries: Vec<(String, NormalizedEntry)>,
    pub skipped_old: usize,
    pub already_seen: usize,
}

/// Whether an entry published at `published` is past the age limit at `now`.
///
/// `max_age_days <= 0` disables the check. With the check enabled, an
/// unknown timestamp counts as too old.
pub fn is_too_old(published: Option<DateTime<Utc>>, max_age_days: i64, now: DateTime<Utc>) -> bool {
    if max_age_days <= 0 {
        return false;
    }
    match published {
        Some(ts) => now.signed_duration_since(ts).num_days() > max_age_days,
        None => true,
    }
}

/// Partition `raw` (oldest first) against `seen`.
///
/// Too-old entries are appended to `seen` right away so later polls skip
/// them without re-evaluating their age.
pub fn classify<S: SourceStrategy>(
    strategy: &S,
    raw: &[S::Entry],
    seen: &mut SeenIds,
    max_age_days: i64,
    now: DateTime<Utc>,
) -> Classified {
    let mut out = Classified::default();

    for entry in raw {
        let id = strategy.entry_id(entry);
        if seen.contains(&id) {
            out.already_seen += 1;
            continue;
        }

        let data = strategy.entry_data(entry, now);
        if is_too_old(data.published, max_age_days, now) {
            tracing::debug!(entry_id = %id, title = %data.title, "skipping too-old entry");
            seen.push_capped(id, TOO_OLD_CAP);
            out.skipped_old += 1;
            continue;
        }

        out.new_entries.push((id, data));
    }

    out
}
