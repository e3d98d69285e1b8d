use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use engine_logging::engine_info;
use harvester_core::{
    DateWindow, ExhaustedReason, Post, SeenSet, Source, TierUsage, WindowState,
};
use tokio_util::sync::CancellationToken;

use crate::{FallbackChain, HarvestError, Pacing, RateLimiterRegistry, Tier};

/// Engine knobs configured from the environment, not engine logic.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Default pacing for tiers without a per-tier override.
    pub pacing: Pacing,
    /// Hard bound on pages fetched from one cursor tier, against buggy
    /// continuation tokens.
    pub max_pages_per_tier: u32,
    /// Attempts per page fetch before a transient failure ends the tier.
    pub max_fetch_attempts: u32,
    /// Consecutive scroll steps with no new records before a tier stalls.
    pub scroll_idle_steps: u32,
    /// Consecutive static page heights before a tier stalls.
    pub scroll_static_height_steps: u32,
    /// Hard bound on scroll steps per tier attempt.
    pub max_scroll_steps: u32,
    /// Concurrent harvest runs an [`crate::EngineHandle`] will execute.
    pub max_concurrent_sessions: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pacing: Pacing::default(),
            max_pages_per_tier: 50,
            max_fetch_attempts: 3,
            scroll_idle_steps: 5,
            scroll_static_height_steps: 3,
            max_scroll_steps: 40,
            max_concurrent_sessions: 4,
        }
    }
}

/// One bounded harvest: a query against an ordered tier list.
#[derive(Clone)]
pub struct HarvestRequest {
    pub query: String,
    pub source: Source,
    pub target_count: usize,
    pub window: Option<DateWindow>,
    /// Acquisition tiers in fallback priority order.
    pub tiers: Vec<Tier>,
    /// Names of tiers whose credentials are configured at runtime.
    pub credentials: BTreeSet<String>,
}

/// Lifecycle of one harvest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Running,
    /// Target count met.
    Completed,
    /// Every tier exhausted below target. Reported, not an error.
    PartialTargetMiss,
    /// Cancelled by the caller.
    Aborted,
}

/// Result of one harvest run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestReport {
    pub posts: Vec<Post>,
    pub tier_usage: Vec<TierUsage>,
    pub exhausted_reason: ExhaustedReason,
    pub phase: SessionPhase,
}

impl HarvestReport {
    /// Human-readable outcome line: counts, reason, and what each tier did.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} records ({})",
            self.posts.len(),
            self.exhausted_reason
        );
        for usage in &self.tier_usage {
            let _ = write!(line, "; {}=", usage.tier);
            let _ = match usage.status {
                harvester_core::TierStatus::Used => {
                    write!(line, "used({} over {} pages)", usage.admitted, usage.pages)
                }
                harvester_core::TierStatus::Skipped => write!(line, "skipped"),
                harvester_core::TierStatus::Failed => {
                    write!(
                        line,
                        "failed({})",
                        usage.detail.as_deref().unwrap_or("unknown")
                    )
                }
            };
        }
        line
    }
}

/// Orchestrates one bounded run: validates configuration, owns the run's
/// seen-set and window state, and walks the fallback chain once.
pub struct HarvestSession {
    limiter: Arc<RateLimiterRegistry>,
    settings: EngineSettings,
    cancel: CancellationToken,
    phase: SessionPhase,
}

impl HarvestSession {
    pub fn new(limiter: Arc<RateLimiterRegistry>, settings: EngineSettings) -> Self {
        Self::with_cancellation(limiter, settings, CancellationToken::new())
    }

    pub fn with_cancellation(
        limiter: Arc<RateLimiterRegistry>,
        settings: EngineSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            limiter,
            settings,
            cancel,
            phase: SessionPhase::Idle,
        }
    }

    /// Token that aborts this run when cancelled. Checked at every page
    /// fetch and scroll step.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Runs the harvest to completion. Finding fewer records than asked is a
    /// normal outcome; only configuration problems are errors.
    pub async fn run(&mut self, request: HarvestRequest) -> Result<HarvestReport, HarvestError> {
        validate(&request)?;
        self.phase = SessionPhase::Running;
        engine_info!(
            "harvest start: source={} query={:?} target={} tiers={}",
            request.source,
            request.query,
            request.target_count,
            request.tiers.len()
        );

        let mut seen = SeenSet::new();
        let mut window = WindowState::new(request.window);
        let chain = FallbackChain::new(&self.limiter, &self.settings, &self.cancel);
        let outcome = chain
            .run(
                &request.query,
                request.source,
                request.target_count,
                &request.tiers,
                &request.credentials,
                &mut seen,
                &mut window,
            )
            .await;

        self.phase = match outcome.reason {
            ExhaustedReason::TargetReached => SessionPhase::Completed,
            ExhaustedReason::TiersExhausted => SessionPhase::PartialTargetMiss,
            ExhaustedReason::Cancelled => SessionPhase::Aborted,
        };
        let report = HarvestReport {
            posts: outcome.posts,
            tier_usage: outcome.usage,
            exhausted_reason: outcome.reason,
            phase: self.phase,
        };
        engine_info!("harvest done: {}", report.summary());
        Ok(report)
    }
}

fn validate(request: &HarvestRequest) -> Result<(), HarvestError> {
    if request.tiers.is_empty() {
        return Err(HarvestError::NoTiersConfigured);
    }
    let any_usable = request.tiers.iter().any(|tier| {
        !tier.descriptor.requires_credentials
            || request.credentials.contains(&tier.descriptor.name)
    });
    if !any_usable {
        return Err(HarvestError::MissingCredentials);
    }
    Ok(())
}
