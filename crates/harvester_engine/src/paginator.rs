use engine_logging::{engine_debug, engine_warn};
use harvester_core::{
    normalize_record, Cursor, Post, SeenSet, Source, TierDescriptor, Verdict, WindowState,
};
use tokio_util::sync::CancellationToken;

use crate::session::EngineSettings;
use crate::{CursorPage, CursorSource, PageError, RateLimiterRegistry, TierEnd};

/// Records one tier contributed, with why it stopped. Partial results are
/// kept on every end condition, including failures and cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct TierHarvest {
    pub records: Vec<Post>,
    pub end: TierEnd,
    pub pages: u32,
}

/// Drives the fetch/advance cycle for one cursor- or offset-paged tier.
pub struct CursorPaginator<'a> {
    limiter: &'a RateLimiterRegistry,
    settings: &'a EngineSettings,
    cancel: &'a CancellationToken,
}

impl<'a> CursorPaginator<'a> {
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

    /// Fetches pages until the target is met or the tier is exhausted.
    ///
    /// Raw items flow normalize -> dedup -> window in page order; a record
    /// rejected by any stage does not count toward the target.
    #[allow(clippy::too_many_arguments)]
    pub async fn fetch_until(
        &self,
        descriptor: &TierDescriptor,
        fetcher: &dyn CursorSource,
        query: &str,
        source: Source,
        target: usize,
        seen: &mut SeenSet,
        window: &mut WindowState,
    ) -> TierHarvest {
        let tier = descriptor.name.as_str();
        let mut records: Vec<Post> = Vec::new();
        let mut cursor = Cursor::start();
        let mut pages = 0u32;
        let mut candidates = 0usize;
        let budget = tier_budget(descriptor, target, window);

        if target == 0 {
            return TierHarvest {
                records,
                end: TierEnd::TargetReached,
                pages,
            };
        }

        // A reverse-chronological tier has nothing left to offer once the
        // older bound was proven exceeded earlier in the run.
        if descriptor.reverse_chronological && window.exceeded_older_bound() {
            return TierHarvest {
                records,
                end: TierEnd::WindowExceeded,
                pages,
            };
        }

        loop {
            if pages >= self.settings.max_pages_per_tier {
                return TierHarvest {
                    records,
                    end: TierEnd::PageLimit,
                    pages,
                };
            }

            let fetched = tokio::select! {
                // Cancellation wins over a ready fetch at every page boundary.
                biased;
                _ = self.cancel.cancelled() => {
                    return TierHarvest {
                        records,
                        end: TierEnd::Cancelled,
                        pages,
                    };
                }
                fetched = self.fetch_page_with_retry(fetcher, query, &cursor, tier) => fetched,
            };

            let page = match fetched {
                Ok(page) => page,
                Err(PageError::Blocked(msg)) => {
                    return TierHarvest {
                        records,
                        end: TierEnd::Blocked(msg),
                        pages,
                    };
                }
                Err(PageError::Malformed(msg)) => {
                    // A positional tier can step over a bad page; a
                    // token-continuation tier cannot produce its next token
                    // from a malformed response.
                    if cursor.token.is_some() {
                        return TierHarvest {
                            records,
                            end: TierEnd::TierError(format!("malformed response: {msg}")),
                            pages,
                        };
                    }
                    engine_warn!("tier {tier}: skipping malformed page {}: {msg}", cursor.page);
                    pages += 1;
                    cursor = cursor.advanced(None);
                    continue;
                }
                Err(err) => {
                    return TierHarvest {
                        records,
                        end: TierEnd::TierError(err.to_string()),
                        pages,
                    };
                }
            };

            pages += 1;
            let had_items = !page.items.is_empty();
            let prev_token = cursor.token.clone();
            let CursorPage { items, next } = page;

            for raw in items {
                if candidates >= budget {
                    return TierHarvest {
                        records,
                        end: TierEnd::SourceDrained,
                        pages,
                    };
                }
                let Some(post) = normalize_record(raw, source, tier) else {
                    continue;
                };
                if !seen.admit(source, &post.id) {
                    continue;
                }
                // Duplicates and unparseable items cost nothing against the
                // tier's budget.
                candidates += 1;
                match window.accept(post.created_at, descriptor.reverse_chronological) {
                    Verdict::Keep => {
                        records.push(post);
                        if records.len() >= target {
                            return TierHarvest {
                                records,
                                end: TierEnd::TargetReached,
                                pages,
                            };
                        }
                    }
                    Verdict::Drop => {}
                    Verdict::StopTier => {
                        engine_debug!("tier {tier}: window older bound exceeded on page {pages}");
                        return TierHarvest {
                            records,
                            end: TierEnd::WindowExceeded,
                            pages,
                        };
                    }
                }
            }

            if !had_items || candidates >= budget {
                // Empty page, or this tier's item budget is spent.
                return TierHarvest {
                    records,
                    end: TierEnd::SourceDrained,
                    pages,
                };
            }
            match next {
                // A null cursor after a non-empty page means the source is done.
                None => {
                    return TierHarvest {
                        records,
                        end: TierEnd::SourceDrained,
                        pages,
                    };
                }
                // A repeated cursor would loop forever on the same page.
                Some(token) if prev_token.as_deref() == Some(token.as_str()) => {
                    return TierHarvest {
                        records,
                        end: TierEnd::SourceDrained,
                        pages,
                    };
                }
                Some(token) => cursor = cursor.advanced(Some(token)),
            }
        }
    }

    /// One page fetch with bounded penalize-driven retries on transient
    /// failures. Every attempt waits for the tier's pacing slot first.
    async fn fetch_page_with_retry(
        &self,
        fetcher: &dyn CursorSource,
        query: &str,
        cursor: &Cursor,
        tier: &str,
    ) -> Result<CursorPage, PageError> {
        let mut attempt = 0u32;
        loop {
            self.limiter.wait(tier).await;
            match fetcher.fetch_page(query, cursor).await {
                Ok(page) => {
                    self.limiter.reset(tier);
                    return Ok(page);
                }
                Err(PageError::Transient(msg)) => {
                    attempt += 1;
                    self.limiter.penalize(tier);
                    if attempt >= self.settings.max_fetch_attempts {
                        return Err(PageError::Transient(msg));
                    }
                    engine_warn!(
                        "tier {tier}: transient failure on page {} (attempt {attempt}): {msg}",
                        cursor.page
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Item budget for one tier attempt: twice the target when a window is set
/// (post-filter yield still has to approach the target), clamped by the
/// tier's own ceiling. Counted over deduplicated, normalized items.
fn tier_budget(descriptor: &TierDescriptor, target: usize, window: &WindowState) -> usize {
    let over_fetch = if window.is_filtering() {
        target.saturating_mul(2)
    } else {
        target
    };
    over_fetch.max(1).min(descriptor.max_items_per_run)
}
