use std::sync::Arc;

use harvester_core::{Cursor, RawItem, TierDescriptor};

use crate::{CursorPage, PageError};

/// Single-page fetch for cursor- or offset-paged tiers.
///
/// Implementations own all wire-format and markup knowledge for their
/// source; the engine only sees the raw items they return. Offset-paged
/// tiers key their request on `cursor.page` and may leave the token unused.
#[async_trait::async_trait]
pub trait CursorSource: Send + Sync {
    async fn fetch_page(&self, query: &str, cursor: &Cursor) -> Result<CursorPage, PageError>;
}

/// An open browser surface for one scroll-tier attempt.
///
/// The engine calls `close` on every exit path, including errors and
/// cancellation; implementations release their driver process there.
#[async_trait::async_trait]
pub trait ScrollSurface: Send {
    /// Items currently rendered. May repeat items from earlier steps; the
    /// dedup stage drops repeats.
    async fn extract_visible(&mut self) -> Result<Vec<RawItem>, PageError>;

    /// Scrolls one step further down the feed.
    async fn scroll_step(&mut self) -> Result<(), PageError>;

    /// Current document height, in whatever unit the surface reports.
    async fn page_height(&mut self) -> Result<u64, PageError>;

    async fn close(&mut self);
}

/// Opens scroll surfaces for browser-automation tiers. One surface is opened
/// per tier attempt and owned by the engine for that attempt only.
#[async_trait::async_trait]
pub trait ScrollProvider: Send + Sync {
    async fn open(&self, query: &str) -> Result<Box<dyn ScrollSurface>, PageError>;
}

/// Access method behind a tier.
#[derive(Clone)]
pub enum TierAccess {
    Cursor(Arc<dyn CursorSource>),
    Scroll(Arc<dyn ScrollProvider>),
}

/// A fully configured acquisition tier: the immutable descriptor plus the
/// extractor implementing it.
#[derive(Clone)]
pub struct Tier {
    pub descriptor: TierDescriptor,
    pub access: TierAccess,
}

impl Tier {
    pub fn new(descriptor: TierDescriptor, access: TierAccess) -> Self {
        Self { descriptor, access }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}
