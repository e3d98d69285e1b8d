use engine_logging::{engine_debug, engine_warn};
use harvester_core::{
    normalize_record, Post, SeenSet, Source, StallDetector, TierDescriptor, Verdict, WindowState,
};
use tokio_util::sync::CancellationToken;

use crate::paginator::TierHarvest;
use crate::session::EngineSettings;
use crate::{PageError, RateLimiterRegistry, ScrollProvider, ScrollSurface, TierEnd};

/// Drives an infinite-scroll tier: open a surface, extract/scroll until the
/// stall heuristic fires or the run is bounded, and always close the surface.
pub struct ScrollHarvester<'a> {
    limiter: &'a RateLimiterRegistry,
    settings: &'a EngineSettings,
    cancel: &'a CancellationToken,
}

impl<'a> ScrollHarvester<'a> {
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
        descriptor: &TierDescriptor,
        provider: &dyn ScrollProvider,
        query: &str,
        source: Source,
        target: usize,
        seen: &mut SeenSet,
        window: &mut WindowState,
    ) -> TierHarvest {
        let tier = descriptor.name.as_str();

        if target == 0 {
            return TierHarvest {
                records: Vec::new(),
                end: TierEnd::TargetReached,
                pages: 0,
            };
        }
        if descriptor.reverse_chronological && window.exceeded_older_bound() {
            return TierHarvest {
                records: Vec::new(),
                end: TierEnd::WindowExceeded,
                pages: 0,
            };
        }

        self.limiter.wait(tier).await;
        let mut surface = match provider.open(query).await {
            Ok(surface) => surface,
            Err(err) => {
                engine_warn!("tier {tier}: failed to open scroll surface: {err}");
                return TierHarvest {
                    records: Vec::new(),
                    end: end_for_error(err),
                    pages: 0,
                };
            }
        };

        // The surface owns an OS-level browser resource; run the loop first,
        // close unconditionally, then report.
        let harvest = self
            .drive(surface.as_mut(), descriptor, source, target, seen, window)
            .await;
        surface.close().await;
        harvest
    }

    async fn drive(
        &self,
        surface: &mut dyn ScrollSurface,
        descriptor: &TierDescriptor,
        source: Source,
        target: usize,
        seen: &mut SeenSet,
        window: &mut WindowState,
    ) -> TierHarvest {
        let tier = descriptor.name.as_str();
        let mut records: Vec<Post> = Vec::new();
        let mut stall = StallDetector::new(
            self.settings.scroll_idle_steps,
            self.settings.scroll_static_height_steps,
        );
        let mut steps = 0u32;
        let mut candidates = 0usize;
        let mut transient_errors = 0u32;

        loop {
            if steps >= self.settings.max_scroll_steps {
                return TierHarvest {
                    records,
                    end: TierEnd::PageLimit,
                    pages: steps,
                };
            }
            if self.cancel.is_cancelled() {
                return TierHarvest {
                    records,
                    end: TierEnd::Cancelled,
                    pages: steps,
                };
            }

            let step = self
                .one_step(surface, descriptor, source, target, seen, window, &mut records, &mut candidates)
                .await;
            steps += 1;

            match step {
                Ok(StepOutcome::Finished(end)) => {
                    return TierHarvest {
                        records,
                        end,
                        pages: steps,
                    };
                }
                Ok(StepOutcome::Scrolled {
                    new_admitted,
                    height_before,
                    height_after,
                }) => {
                    transient_errors = 0;
                    if !stall.should_continue(new_admitted, height_before, height_after) {
                        engine_debug!("tier {tier}: scroll stalled after {steps} steps");
                        return TierHarvest {
                            records,
                            end: TierEnd::Stalled,
                            pages: steps,
                        };
                    }
                }
                Err(PageError::Transient(msg)) => {
                    transient_errors += 1;
                    self.limiter.penalize(tier);
                    if transient_errors >= self.settings.max_fetch_attempts {
                        return TierHarvest {
                            records,
                            end: TierEnd::TierError(format!("transient fetch failure: {msg}")),
                            pages: steps,
                        };
                    }
                    engine_warn!("tier {tier}: transient scroll failure (attempt {transient_errors}): {msg}");
                }
                Err(PageError::Blocked(msg)) => {
                    return TierHarvest {
                        records,
                        end: TierEnd::Blocked(msg),
                        pages: steps,
                    };
                }
                Err(PageError::Malformed(msg)) => {
                    // A bad render of one step is skipped; the next scroll
                    // usually recovers.
                    engine_warn!("tier {tier}: skipping malformed scroll step: {msg}");
                }
            }
        }
    }

    /// One extract/admit/scroll cycle. The pacing wait between scroll
    /// interactions is the loop's suspension point and is cancellable.
    #[allow(clippy::too_many_arguments)]
    async fn one_step(
        &self,
        surface: &mut dyn ScrollSurface,
        descriptor: &TierDescriptor,
        source: Source,
        target: usize,
        seen: &mut SeenSet,
        window: &mut WindowState,
        records: &mut Vec<Post>,
        candidates: &mut usize,
    ) -> Result<StepOutcome, PageError> {
        let tier = descriptor.name.as_str();
        let height_before = surface.page_height().await?;
        let items = surface.extract_visible().await?;

        let mut new_admitted = 0usize;
        for raw in items {
            if *candidates >= descriptor.max_items_per_run {
                return Ok(StepOutcome::Finished(TierEnd::SourceDrained));
            }
            let Some(post) = normalize_record(raw, source, tier) else {
                continue;
            };
            // Re-rendered items from earlier steps cost nothing against the
            // tier's budget.
            if !seen.admit(source, &post.id) {
                continue;
            }
            *candidates += 1;
            match window.accept(post.created_at, descriptor.reverse_chronological) {
                Verdict::Keep => {
                    records.push(post);
                    new_admitted += 1;
                    if records.len() >= target {
                        return Ok(StepOutcome::Finished(TierEnd::TargetReached));
                    }
                }
                Verdict::Drop => {}
                Verdict::StopTier => {
                    return Ok(StepOutcome::Finished(TierEnd::WindowExceeded));
                }
            }
        }
        if *candidates >= descriptor.max_items_per_run {
            return Ok(StepOutcome::Finished(TierEnd::SourceDrained));
        }

        surface.scroll_step().await?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Ok(StepOutcome::Finished(TierEnd::Cancelled));
            }
            _ = self.limiter.wait(tier) => {}
        }
        let height_after = surface.page_height().await?;

        Ok(StepOutcome::Scrolled {
            new_admitted,
            height_before,
            height_after,
        })
    }
}

enum StepOutcome {
    Scrolled {
        new_admitted: usize,
        height_before: u64,
        height_after: u64,
    },
    Finished(TierEnd),
}

fn end_for_error(err: PageError) -> TierEnd {
    match err {
        PageError::Blocked(msg) => TierEnd::Blocked(msg),
        other => TierEnd::TierError(other.to_string()),
    }
}
