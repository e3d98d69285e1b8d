use std::fmt;

use serde::{Deserialize, Serialize};

/// How a tier acquires content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierCapability {
    /// Structured endpoint paged by continuation token or offset.
    Api,
    /// Anonymous page render parsed server-side.
    Render,
    /// Browser automation paging via infinite scroll.
    Browser,
}

/// One acquisition method for a source, in fallback priority order.
///
/// Built once per harvest call from static configuration plus runtime
/// credential availability; immutable during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDescriptor {
    pub name: String,
    pub capability: TierCapability,
    /// Ceiling on items this tier may contribute in one run.
    pub max_items_per_run: usize,
    pub requires_credentials: bool,
    /// Declares that the feed is ordered newest-first. Only tiers that
    /// declare this may be stopped early by the date window.
    pub reverse_chronological: bool,
}

impl TierDescriptor {
    pub fn new(name: impl Into<String>, capability: TierCapability) -> Self {
        Self {
            name: name.into(),
            capability,
            max_items_per_run: 1000,
            requires_credentials: false,
            reverse_chronological: false,
        }
    }
}

/// Continuation state for one tier's pagination loop.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cursor {
    /// Opaque continuation token from the previous page, if any.
    pub token: Option<String>,
    /// Monotonic page counter, starting at 0 for the first fetch.
    pub page: u32,
}

impl Cursor {
    pub fn start() -> Self {
        Self::default()
    }

    /// The cursor for the next fetch after a page returned `next`.
    pub fn advanced(&self, next: Option<String>) -> Self {
        Self {
            token: next,
            page: self.page + 1,
        }
    }
}

/// What happened to one tier during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierStatus {
    Used,
    Skipped,
    Failed,
}

/// Per-tier attempt accounting reported with the harvest result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierUsage {
    pub tier: String,
    pub status: TierStatus,
    pub pages: u32,
    pub admitted: usize,
    pub detail: Option<String>,
}

/// Why the run as a whole stopped fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedReason {
    TargetReached,
    TiersExhausted,
    Cancelled,
}

impl fmt::Display for ExhaustedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExhaustedReason::TargetReached => write!(f, "target_reached"),
            ExhaustedReason::TiersExhausted => write!(f, "tiers_exhausted"),
            ExhaustedReason::Cancelled => write!(f, "cancelled"),
        }
    }
}
