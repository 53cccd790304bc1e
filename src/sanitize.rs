// src/sanitize.rs
//! Markup and noise stripping for entry descriptions.

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum description length (in chars) accepted by the webhook embed.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
const ELLIPSIS: &str = "...";

/// Localized "click to expand" residue left behind by XenForo quote blocks.
const FORUM_EXPAND_ARTIFACT: &str = "Кликни за повеќе...";

static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RE_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static RE_P_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<p>").unwrap());
static RE_P_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</p>").unwrap());
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_SUBMITTED_BY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)\s*submitted by\s*/u/\S+.*$").unwrap());
static RE_BRACKET_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[link\]|\[comments\]").unwrap());
static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Which source-specific noise rules to apply on top of the common ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Feed items (strips aggregator "submitted by" lines and `[link]` markers).
    Feed,
    /// Forum posts (strips the "click to expand" artifact instead).
    Forum,
}

/// Strip comments and tags, decode entities, and drop source noise.
pub fn clean(text: &str, flavor: Flavor) -> String {
    if text.is_empty() {
        return String::new();
    }

    // 1) Markup structure -> newlines, everything else dropped
    let out = RE_COMMENT.replace_all(text, "");
    let out = RE_BR.replace_all(&out, "\n");
    let out = RE_P_OPEN.replace_all(&out, "\n");
    let out = RE_P_CLOSE.replace_all(&out, "\n");
    let out = RE_TAG.replace_all(&out, "");

    // 2) Entities, including the double-escaped space some feeds emit
    let mut out = html_escape::decode_html_entities(&out).replace("&#32;", " ");

    // 3) Source noise
    if flavor == Flavor::Feed {
        out = RE_SUBMITTED_BY.replace_all(&out, "").into_owned();
        out = RE_BRACKET_MARKERS.replace_all(&out, "").into_owned();
    }
    out = RE_BLANK_RUN.replace_all(&out, "\n\n").into_owned();
    if flavor == Flavor::Forum {
        out = out.replace(FORUM_EXPAND_ARTIFACT, "");
    }

    out.trim().to_string()
}

/// Cap `text` at [`MAX_DESCRIPTION_CHARS`], ending with an ellipsis when cut.
pub fn truncate(text: String) -> String {
    if text.chars().count() <= MAX_DESCRIPTION_CHARS {
        return text;
    }
    let keep = MAX_DESCRIPTION_CHARS - ELLIPSIS.chars().count();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// `clean` followed by `truncate`.
pub fn description(text: &str, flavor: Flavor) -> String {
    truncate(clean(text, flavor))
}
