use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Site a record was harvested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Reddit,
    Bluesky,
    Stocktwits,
    Youtube,
    Discord,
    Telegram,
    Bitcointalk,
    Fourchan,
    Instagram,
    Tiktok,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Reddit => "reddit",
            Source::Bluesky => "bluesky",
            Source::Stocktwits => "stocktwits",
            Source::Youtube => "youtube",
            Source::Discord => "discord",
            Source::Telegram => "telegram",
            Source::Bitcointalk => "bitcointalk",
            Source::Fourchan => "fourchan",
            Source::Instagram => "instagram",
            Source::Tiktok => "tiktok",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interaction counts attached to a record. Sources that do not expose a
/// count report 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Engagement {
    pub likes: u64,
    pub replies: u64,
    pub views: u64,
}

impl Engagement {
    /// Combined score used for ranking, matching the like+reply sum the
    /// per-source feeds expose.
    pub fn score(&self) -> u64 {
        self.likes + self.replies
    }
}

/// Canonical record produced by normalization.
///
/// `source` + `id` identifies a post for the lifetime of one harvest run;
/// `id` is never empty (ids missing upstream are synthesized from content).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub engagement: Engagement,
    pub source: Source,
    /// Name of the acquisition tier that produced this record.
    pub tier: String,
    pub url: Option<String>,
    /// Ground-truth sentiment tag, only for sources that publish one.
    pub human_label: Option<String>,
}

/// One item exactly as an extractor handed it over, before normalization.
///
/// Every field is optional; extractors fill what their tier exposes and leave
/// the rest empty. `created_at` is the raw upstream value (RFC 3339 or epoch
/// seconds) and is parsed during normalization. `extra` carries any
/// tier-specific payload the engine itself never inspects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub created_at: Option<String>,
    pub likes: Option<u64>,
    pub replies: Option<u64>,
    pub views: Option<u64>,
    pub url: Option<String>,
    pub human_label: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}
