use std::collections::BTreeSet;

use engine_logging::{engine_info, engine_warn};
use harvester_core::{
    ExhaustedReason, Post, SeenSet, Source, TierStatus, TierUsage, WindowState,
};
use tokio_util::sync::CancellationToken;

use crate::paginator::CursorPaginator;
use crate::scroll::ScrollHarvester;
use crate::session::EngineSettings;
use crate::{RateLimiterRegistry, Tier, TierAccess, TierEnd};

/// What one chain walk produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub posts: Vec<Post>,
    pub usage: Vec<TierUsage>,
    pub reason: ExhaustedReason,
}

/// Walks acquisition tiers in priority order until the target is met or the
/// tiers run out.
///
/// Records admitted by a tier that later fails are kept; they are valid data
/// already fetched. Exhausting every tier below target is a normal,
/// reportable outcome, not an error.
pub struct FallbackChain<'a> {
    limiter: &'a RateLimiterRegistry,
    settings: &'a EngineSettings,
    cancel: &'a CancellationToken,
}

impl<'a> FallbackChain<'a> {
    pub fn new(
        limiter: &'a RateLimiterRegistry,
        settings: &'a EngineSettings,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            limiter,
            settings,
            cancel,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        query: &str,
        source: Source,
        target: usize,
        tiers: &[Tier],
        credentials: &BTreeSet<String>,
        seen: &mut SeenSet,
        window: &mut WindowState,
    ) -> ChainOutcome {
        let mut posts: Vec<Post> = Vec::new();
        let mut usage: Vec<TierUsage> = Vec::new();
        let mut cancelled = false;

        for tier in tiers {
            if posts.len() >= target {
                break;
            }
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let descriptor = &tier.descriptor;
            if descriptor.requires_credentials && !credentials.contains(&descriptor.name) {
                engine_info!("tier {}: skipped, credentials not configured", descriptor.name);
                usage.push(TierUsage {
                    tier: descriptor.name.clone(),
                    status: TierStatus::Skipped,
                    pages: 0,
                    admitted: 0,
                    detail: Some("credentials not configured".to_string()),
                });
                continue;
            }

            let remaining = target - posts.len();
            let harvest = match &tier.access {
                TierAccess::Cursor(fetcher) => {
                    let paginator =
                        CursorPaginator::new(self.limiter, self.settings, self.cancel);
                    paginator
                        .fetch_until(
                            descriptor,
                            fetcher.as_ref(),
                            query,
                            source,
                            remaining,
                            seen,
                            window,
                        )
                        .await
                }
                TierAccess::Scroll(provider) => {
                    let scroller = ScrollHarvester::new(self.limiter, self.settings, self.cancel);
                    scroller
                        .run(
                            descriptor,
                            provider.as_ref(),
                            query,
                            source,
                            remaining,
                            seen,
                            window,
                        )
                        .await
                }
            };

            let admitted = harvest.records.len();
            if harvest.end.is_failure() {
                engine_warn!(
                    "tier {}: failed after {} records ({})",
                    descriptor.name,
                    admitted,
                    harvest.end
                );
            } else {
                engine_info!(
                    "tier {}: {} records over {} pages ({})",
                    descriptor.name,
                    admitted,
                    harvest.pages,
                    harvest.end
                );
            }
            usage.push(TierUsage {
                tier: descriptor.name.clone(),
                status: if harvest.end.is_failure() {
                    TierStatus::Failed
                } else {
                    TierStatus::Used
                },
                pages: harvest.pages,
                admitted,
                detail: Some(harvest.end.to_string()),
            });
            // Earlier-tier records always precede later-tier records.
            posts.extend(harvest.records);

            if harvest.end == TierEnd::Cancelled {
                cancelled = true;
                break;
            }
        }

        let reason = if cancelled {
            ExhaustedReason::Cancelled
        } else if posts.len() >= target {
            ExhaustedReason::TargetReached
        } else {
            ExhaustedReason::TiersExhausted
        };

        ChainOutcome {
            posts,
            usage,
            reason,
        }
    }
}
