use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use engine_logging::engine_debug;

/// Pacing policy for one tier key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    /// Floor interval between requests.
    pub min_interval: Duration,
    /// Multiplier applied by `penalize`; `reset` decays by the same step.
    pub backoff_factor: f64,
    /// Ceiling the interval never exceeds.
    pub max_interval: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(300),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl Pacing {
    fn sanitized(mut self) -> Self {
        if self.backoff_factor < 1.0 {
            self.backoff_factor = 1.0;
        }
        if self.max_interval < self.min_interval {
            self.max_interval = self.min_interval;
        }
        self
    }
}

#[derive(Debug)]
struct TierPacing {
    pacing: Pacing,
    current_interval: Duration,
    next_allowed: Instant,
}

impl TierPacing {
    fn new(pacing: Pacing) -> Self {
        Self {
            pacing,
            current_interval: pacing.min_interval,
            next_allowed: Instant::now(),
        }
    }
}

/// Process-wide request pacing, partitioned per tier key.
///
/// Shared by all harvest runs hitting the same external service so they
/// respect one ban-avoidance budget. The next-allowed instant is claimed
/// under the lock; the wait itself suspends the task outside it.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    default_pacing: Pacing,
    tiers: Mutex<HashMap<String, TierPacing>>,
}

impl RateLimiterRegistry {
    pub fn new(default_pacing: Pacing) -> Self {
        Self {
            default_pacing: default_pacing.sanitized(),
            tiers: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the pacing policy for one tier key.
    pub fn configure(&self, tier: &str, pacing: Pacing) {
        let pacing = pacing.sanitized();
        let mut tiers = self.tiers.lock().expect("limiter lock");
        let entry = tiers
            .entry(tier.to_owned())
            .or_insert_with(|| TierPacing::new(pacing));
        entry.pacing = pacing;
        entry.current_interval = entry
            .current_interval
            .clamp(pacing.min_interval, pacing.max_interval);
    }

    /// Suspends the calling task until the tier's pacing slot opens, and
    /// claims the following slot.
    pub async fn wait(&self, tier: &str) {
        let deadline = {
            let mut tiers = self.tiers.lock().expect("limiter lock");
            let entry = tiers
                .entry(tier.to_owned())
                .or_insert_with(|| TierPacing::new(self.default_pacing));
            let now = Instant::now();
            let deadline = entry.next_allowed.max(now);
            entry.next_allowed = deadline + entry.current_interval;
            deadline
        };
        tokio::time::sleep_until(deadline).await;
    }

    /// Backs off after a transient failure: the tier's interval grows by the
    /// backoff factor (capped) and the next slot moves out accordingly.
    pub fn penalize(&self, tier: &str) {
        let mut tiers = self.tiers.lock().expect("limiter lock");
        let entry = tiers
            .entry(tier.to_owned())
            .or_insert_with(|| TierPacing::new(self.default_pacing));
        let grown = entry.current_interval.mul_f64(entry.pacing.backoff_factor);
        entry.current_interval = grown.min(entry.pacing.max_interval);
        entry.next_allowed = Instant::now() + entry.current_interval;
        engine_debug!(
            "tier {} penalized, interval now {:?}",
            tier,
            entry.current_interval
        );
    }

    /// Decays the tier's interval one backoff step back toward its floor.
    /// Called on sustained success; one success between two failures does
    /// not erase the penalty.
    pub fn reset(&self, tier: &str) {
        let mut tiers = self.tiers.lock().expect("limiter lock");
        let entry = tiers
            .entry(tier.to_owned())
            .or_insert_with(|| TierPacing::new(self.default_pacing));
        let shrunk = entry
            .current_interval
            .mul_f64(1.0 / entry.pacing.backoff_factor);
        entry.current_interval = shrunk.max(entry.pacing.min_interval);
    }

    /// Current inter-request interval for a tier key.
    pub fn current_interval(&self, tier: &str) -> Duration {
        let tiers = self.tiers.lock().expect("limiter lock");
        tiers
            .get(tier)
            .map(|entry| entry.current_interval)
            .unwrap_or(self.default_pacing.min_interval)
    }
}
