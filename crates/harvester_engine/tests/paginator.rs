use std::collections::VecDeque;
use std::sync::{Mutex, Once};

use chrono::{TimeZone, Utc};
use harvester_core::{
    Cursor, DateWindow, SeenSet, Source, TierCapability, TierDescriptor, WindowState,
};
use harvester_engine::{
    CursorPage, CursorPaginator, CursorSource, EngineSettings, PageError, Pacing,
    RateLimiterRegistry, TierEnd,
};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

/// Replays a scripted sequence of page results and records every cursor the
/// paginator asked with.
struct ScriptedSource {
    pages: Mutex<VecDeque<Result<CursorPage, PageError>>>,
    calls: Mutex<Vec<Cursor>>,
}

impl ScriptedSource {
    fn new(pages: Vec<Result<CursorPage, PageError>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl CursorSource for ScriptedSource {
    async fn fetch_page(&self, _query: &str, cursor: &Cursor) -> Result<CursorPage, PageError> {
        self.calls.lock().unwrap().push(cursor.clone());
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CursorPage::default()))
    }
}

fn item(id: &str) -> harvester_core::RawItem {
    harvester_core::RawItem {
        id: Some(id.to_string()),
        title: Some(format!("post {id}")),
        ..Default::default()
    }
}

fn item_at(id: &str, created_at: &str) -> harvester_core::RawItem {
    harvester_core::RawItem {
        created_at: Some(created_at.to_string()),
        ..item(id)
    }
}

fn page(ids: &[&str], next: Option<&str>) -> Result<CursorPage, PageError> {
    Ok(CursorPage {
        items: ids.iter().map(|id| item(id)).collect(),
        next: next.map(str::to_string),
    })
}

fn descriptor() -> TierDescriptor {
    TierDescriptor::new("api", TierCapability::Api)
}

struct Fixture {
    limiter: RateLimiterRegistry,
    settings: EngineSettings,
    cancel: CancellationToken,
}

impl Fixture {
    fn new() -> Self {
        Self {
            limiter: RateLimiterRegistry::new(Pacing::default()),
            settings: EngineSettings::default(),
            cancel: CancellationToken::new(),
        }
    }

    fn paginator(&self) -> CursorPaginator<'_> {
        CursorPaginator::new(&self.limiter, &self.settings, &self.cancel)
    }
}

#[tokio::test(start_paused = true)]
async fn target_reached_after_two_pages() {
    init_logging();
    let source = ScriptedSource::new(vec![
        page(&["a1", "a2", "a3", "a4", "a5"], Some("p2")),
        page(&["a6", "a7", "a8", "a9", "a10"], None),
    ]);
    let fixture = Fixture::new();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(None);

    let harvest = fixture
        .paginator()
        .fetch_until(&descriptor(), &source, "btc", Source::Bluesky, 7, &mut seen, &mut window)
        .await;

    let ids: Vec<&str> = harvest.records.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2", "a3", "a4", "a5", "a6", "a7"]);
    assert_eq!(harvest.end, TierEnd::TargetReached);
    assert_eq!(source.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn repeated_cursor_terminates_within_two_calls() {
    init_logging();
    let source = ScriptedSource::new(vec![
        page(&["a1"], Some("x")),
        page(&["a2"], Some("x")),
        page(&["a3"], Some("x")),
    ]);
    let fixture = Fixture::new();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(None);

    let harvest = fixture
        .paginator()
        .fetch_until(&descriptor(), &source, "btc", Source::Bluesky, 100, &mut seen, &mut window)
        .await;

    assert_eq!(harvest.end, TierEnd::SourceDrained);
    assert_eq!(source.call_count(), 2);
    assert_eq!(harvest.records.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn duplicates_across_pages_do_not_count_toward_target() {
    init_logging();
    let source = ScriptedSource::new(vec![
        page(&["a1", "a2", "a3"], Some("p2")),
        page(&["a1", "a2", "a3", "a4"], None),
    ]);
    let fixture = Fixture::new();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(None);

    let harvest = fixture
        .paginator()
        .fetch_until(&descriptor(), &source, "btc", Source::Stocktwits, 10, &mut seen, &mut window)
        .await;

    let ids: Vec<&str> = harvest.records.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2", "a3", "a4"]);
    assert_eq!(harvest.end, TierEnd::SourceDrained);
}

#[tokio::test(start_paused = true)]
async fn window_stop_fetches_no_further_pages() {
    init_logging();
    let source = ScriptedSource::new(vec![
        Ok(CursorPage {
            items: vec![
                item_at("a1", "2024-03-10T00:00:00Z"),
                item_at("a2", "2024-02-01T00:00:00Z"),
                item_at("a3", "2024-03-09T00:00:00Z"),
            ],
            next: Some("p2".to_string()),
        }),
        page(&["a4"], None),
    ]);
    let mut reverse = descriptor();
    reverse.reverse_chronological = true;
    let fixture = Fixture::new();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(Some(DateWindow {
        start: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
        end: None,
    }));

    let harvest = fixture
        .paginator()
        .fetch_until(&reverse, &source, "btc", Source::Bluesky, 10, &mut seen, &mut window)
        .await;

    assert_eq!(harvest.end, TierEnd::WindowExceeded);
    assert_eq!(source.call_count(), 1);
    // a1 was admitted before the older record was observed; a3 was not
    // reached.
    let ids: Vec<&str> = harvest.records.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["a1"]);
    assert!(window.exceeded_older_bound());
}

#[tokio::test(start_paused = true)]
async fn old_records_on_unordered_tiers_are_dropped_not_fatal() {
    init_logging();
    let source = ScriptedSource::new(vec![Ok(CursorPage {
        items: vec![
            item_at("a1", "2024-02-01T00:00:00Z"),
            item_at("a2", "2024-03-10T00:00:00Z"),
        ],
        next: None,
    })]);
    let fixture = Fixture::new();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(Some(DateWindow {
        start: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
        end: None,
    }));

    let harvest = fixture
        .paginator()
        .fetch_until(&descriptor(), &source, "btc", Source::Fourchan, 10, &mut seen, &mut window)
        .await;

    let ids: Vec<&str> = harvest.records.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["a2"]);
    assert_eq!(harvest.end, TierEnd::SourceDrained);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_backoff() {
    init_logging();
    let source = ScriptedSource::new(vec![
        Err(PageError::Transient("http status 503".into())),
        Err(PageError::Transient("http status 503".into())),
        page(&["a1", "a2"], None),
    ]);
    let fixture = Fixture::new();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(None);

    let harvest = fixture
        .paginator()
        .fetch_until(&descriptor(), &source, "btc", Source::Bluesky, 2, &mut seen, &mut window)
        .await;

    assert_eq!(harvest.end, TierEnd::TargetReached);
    assert_eq!(harvest.records.len(), 2);
    assert_eq!(source.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_end_the_tier_but_keep_earlier_records() {
    init_logging();
    let source = ScriptedSource::new(vec![
        page(&["a1"], Some("p2")),
        Err(PageError::Transient("timeout".into())),
        Err(PageError::Transient("timeout".into())),
        Err(PageError::Transient("timeout".into())),
    ]);
    let fixture = Fixture::new();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(None);

    let harvest = fixture
        .paginator()
        .fetch_until(&descriptor(), &source, "btc", Source::Bluesky, 10, &mut seen, &mut window)
        .await;

    assert_eq!(harvest.records.len(), 1);
    assert!(matches!(harvest.end, TierEnd::TierError(_)));
    // 1 page + 3 attempts at the second page.
    assert_eq!(source.call_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn blocked_fails_immediately_without_retry() {
    init_logging();
    let source = ScriptedSource::new(vec![Err(PageError::Blocked("http status 403".into()))]);
    let fixture = Fixture::new();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(None);

    let harvest = fixture
        .paginator()
        .fetch_until(&descriptor(), &source, "btc", Source::Instagram, 10, &mut seen, &mut window)
        .await;

    assert_eq!(harvest.end, TierEnd::Blocked("http status 403".into()));
    assert_eq!(source.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_page_is_skipped_on_positional_tiers() {
    init_logging();
    let source = ScriptedSource::new(vec![
        Err(PageError::Malformed("bad json".into())),
        page(&["a1"], None),
    ]);
    let fixture = Fixture::new();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(None);

    let harvest = fixture
        .paginator()
        .fetch_until(&descriptor(), &source, "btc", Source::Bitcointalk, 10, &mut seen, &mut window)
        .await;

    assert_eq!(harvest.records.len(), 1);
    assert_eq!(harvest.end, TierEnd::SourceDrained);
    assert_eq!(source.call_count(), 2);
    // The skipped page still advanced the page counter.
    assert_eq!(source.calls.lock().unwrap()[1].page, 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_page_ends_token_continuation_tiers() {
    init_logging();
    let source = ScriptedSource::new(vec![
        page(&["a1"], Some("p2")),
        Err(PageError::Malformed("truncated body".into())),
    ]);
    let fixture = Fixture::new();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(None);

    let harvest = fixture
        .paginator()
        .fetch_until(&descriptor(), &source, "btc", Source::Bluesky, 10, &mut seen, &mut window)
        .await;

    assert_eq!(harvest.records.len(), 1);
    assert!(matches!(harvest.end, TierEnd::TierError(_)));
}

#[tokio::test(start_paused = true)]
async fn empty_first_page_drains_the_source() {
    init_logging();
    let source = ScriptedSource::new(vec![page(&[], None)]);
    let fixture = Fixture::new();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(None);

    let harvest = fixture
        .paginator()
        .fetch_until(&descriptor(), &source, "btc", Source::Bluesky, 10, &mut seen, &mut window)
        .await;

    assert_eq!(harvest.end, TierEnd::SourceDrained);
    assert_eq!(harvest.records.len(), 0);
    assert_eq!(source.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn page_limit_bounds_buggy_continuations() {
    init_logging();
    let source = ScriptedSource::new(vec![
        page(&["a1"], Some("p1")),
        page(&["a2"], Some("p2")),
        page(&["a3"], Some("p3")),
        page(&["a4"], Some("p4")),
    ]);
    let fixture = Fixture {
        settings: EngineSettings {
            max_pages_per_tier: 3,
            ..EngineSettings::default()
        },
        ..Fixture::new()
    };
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(None);

    let harvest = fixture
        .paginator()
        .fetch_until(&descriptor(), &source, "btc", Source::Bluesky, 100, &mut seen, &mut window)
        .await;

    assert_eq!(harvest.end, TierEnd::PageLimit);
    assert_eq!(harvest.pages, 3);
    assert_eq!(source.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn item_ceiling_caps_tier_contribution() {
    init_logging();
    let source = ScriptedSource::new(vec![page(&["a1", "a2", "a3", "a4", "a5"], Some("p2"))]);
    let mut capped = descriptor();
    capped.max_items_per_run = 3;
    let fixture = Fixture::new();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(None);

    let harvest = fixture
        .paginator()
        .fetch_until(&capped, &source, "btc", Source::Bluesky, 100, &mut seen, &mut window)
        .await;

    assert_eq!(harvest.records.len(), 3);
    assert_eq!(harvest.end, TierEnd::SourceDrained);
}

#[tokio::test(start_paused = true)]
async fn cancellation_returns_admitted_records() {
    init_logging();
    let source = ScriptedSource::new(vec![page(&["a1"], Some("p2"))]);
    let fixture = Fixture::new();
    fixture.cancel.cancel();
    let mut seen = SeenSet::new();
    let mut window = WindowState::new(None);

    let harvest = fixture
        .paginator()
        .fetch_until(&descriptor(), &source, "btc", Source::Bluesky, 10, &mut seen, &mut window)
        .await;

    assert_eq!(harvest.end, TierEnd::Cancelled);
    assert_eq!(harvest.records.len(), 0);
    assert_eq!(source.call_count(), 0);
}
