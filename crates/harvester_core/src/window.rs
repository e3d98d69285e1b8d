use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Requested harvest window. Bounds are inclusive; either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Outcome of checking one record against the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Inside the window, or timestamp unknown (recall wins over precision).
    Keep,
    /// Known timestamp outside the window.
    Drop,
    /// Older than `start` on a feed declared reverse-chronological: every
    /// later page is older still, so the tier can stop fetching.
    StopTier,
}

/// Window filter state for one harvest run.
#[derive(Debug, Clone)]
pub struct WindowState {
    window: DateWindow,
    exceeded_older_bound: bool,
}

impl WindowState {
    pub fn new(window: Option<DateWindow>) -> Self {
        Self {
            window: window.unwrap_or_default(),
            exceeded_older_bound: false,
        }
    }

    /// Set once a record strictly older than `start` was observed on a
    /// reverse-chronological feed; never cleared within a run.
    pub fn exceeded_older_bound(&self) -> bool {
        self.exceeded_older_bound
    }

    /// Whether any bound is set at all.
    pub fn is_filtering(&self) -> bool {
        !self.window.is_unbounded()
    }

    pub fn accept(
        &mut self,
        created_at: Option<DateTime<Utc>>,
        reverse_chronological: bool,
    ) -> Verdict {
        let Some(ts) = created_at else {
            return Verdict::Keep;
        };
        if let Some(end) = self.window.end {
            if ts > end {
                return Verdict::Drop;
            }
        }
        if let Some(start) = self.window.start {
            if ts < start {
                // The monotonicity assumption is declared per tier, never
                // inferred from observed ordering.
                if reverse_chronological {
                    self.exceeded_older_bound = true;
                    return Verdict::StopTier;
                }
                return Verdict::Drop;
            }
        }
        Verdict::Keep
    }
}
