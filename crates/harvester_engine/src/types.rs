use std::fmt;

use harvester_core::RawItem;
use thiserror::Error;

/// Failure of a single page fetch or scroll interaction, classified for
/// retry policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    /// Network timeout, 5xx, or rate limiting. Retried with backoff.
    #[error("transient fetch failure: {0}")]
    Transient(String),
    /// Auth failure or anti-automation block. Fails the tier immediately,
    /// no retry.
    #[error("access blocked: {0}")]
    Blocked(String),
    /// Unparseable page or payload.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Configuration problems that fail the whole session before any fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HarvestError {
    #[error("no acquisition tiers configured")]
    NoTiersConfigured,
    #[error("every configured tier requires credentials and none are available")]
    MissingCredentials,
}

/// One page from a cursor tier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CursorPage {
    /// Raw items in the source's page order.
    pub items: Vec<RawItem>,
    /// Continuation token for the next page; `None` when the source is done.
    pub next: Option<String>,
}

/// Why one tier stopped contributing to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierEnd {
    TargetReached,
    /// Empty page, terminal or repeated cursor, or the tier's item ceiling.
    SourceDrained,
    /// Configured page or scroll-step bound was hit.
    PageLimit,
    /// The date window's older bound was proven exceeded.
    WindowExceeded,
    /// The scroll stall heuristic fired.
    Stalled,
    Blocked(String),
    TierError(String),
    Cancelled,
}

impl TierEnd {
    pub fn is_failure(&self) -> bool {
        matches!(self, TierEnd::Blocked(_) | TierEnd::TierError(_))
    }
}

impl fmt::Display for TierEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierEnd::TargetReached => write!(f, "target_reached"),
            TierEnd::SourceDrained => write!(f, "source_drained"),
            TierEnd::PageLimit => write!(f, "page_limit"),
            TierEnd::WindowExceeded => write!(f, "window_exceeded"),
            TierEnd::Stalled => write!(f, "stalled"),
            TierEnd::Blocked(msg) => write!(f, "blocked: {msg}"),
            TierEnd::TierError(msg) => write!(f, "tier_error: {msg}"),
            TierEnd::Cancelled => write!(f, "cancelled"),
        }
    }
}
