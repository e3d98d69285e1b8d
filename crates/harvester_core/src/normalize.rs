use chrono::{DateTime, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

use crate::{Engagement, Post, RawItem, Source};

/// Titles longer than this are cut on a char boundary.
pub const TITLE_MAX_CHARS: usize = 300;
/// Bodies longer than this are cut on a char boundary.
pub const BODY_MAX_CHARS: usize = 5000;

const EXCERPT_CHARS: usize = 80;

/// Maps a tier-specific raw item into the canonical [`Post`] shape.
///
/// Returns `None` for items with no text at all. Missing ids are synthesized
/// from a content hash so the dedup key is always present; timestamps that
/// fail to parse degrade to `None` rather than dropping the record.
pub fn normalize_record(raw: RawItem, source: Source, tier: &str) -> Option<Post> {
    let title = raw.title.as_deref().map(str::trim).unwrap_or("");
    let body = raw.body.as_deref().map(str::trim).unwrap_or("");
    if title.is_empty() && body.is_empty() {
        return None;
    }

    // Single-field feeds carry their text in `body` only; the title falls
    // back to the leading body text so every record has a display line.
    let title_text = if title.is_empty() { body } else { title };

    let id = match raw.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => id.to_owned(),
        None => synthetic_id(title_text),
    };

    Some(Post {
        id,
        title: truncate_chars(title_text, TITLE_MAX_CHARS),
        body: truncate_chars(body, BODY_MAX_CHARS),
        author: raw
            .author
            .map(|a| a.trim().to_owned())
            .filter(|a| !a.is_empty()),
        created_at: raw.created_at.as_deref().and_then(parse_timestamp),
        engagement: Engagement {
            likes: raw.likes.unwrap_or(0),
            replies: raw.replies.unwrap_or(0),
            views: raw.views.unwrap_or(0),
        },
        source,
        tier: tier.to_owned(),
        url: raw.url.as_deref().and_then(normalize_post_url),
        human_label: raw.human_label.filter(|l| !l.is_empty()),
    })
}

/// Parses the timestamp forms the sources emit: RFC 3339 (with or without a
/// `Z`/offset), a bare `YYYY-MM-DDTHH:MM:SS`, or numeric epoch seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(epoch) = raw.parse::<f64>() {
        if epoch.is_finite() && epoch >= 0.0 {
            let secs = epoch.floor();
            let nanos = ((epoch - secs) * 1e9) as u32;
            return DateTime::from_timestamp(secs as i64, nanos);
        }
    }
    None
}

/// Deterministic content-derived identifier for items whose tier exposes no
/// stable id: sha256 over a whitespace-normalized lowercase excerpt.
pub fn synthetic_id(text: &str) -> String {
    let excerpt: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .take(EXCERPT_CHARS)
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(excerpt.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => input[..idx].to_owned(),
        None => input.to_owned(),
    }
}

fn normalize_post_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    Some(parsed.to_string())
}
