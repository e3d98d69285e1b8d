//! Harvester core: pure record pipeline and tier bookkeeping.
mod dedup;
mod normalize;
mod record;
mod stall;
mod tier;
mod window;

pub use dedup::SeenSet;
pub use normalize::{
    normalize_record, parse_timestamp, synthetic_id, BODY_MAX_CHARS, TITLE_MAX_CHARS,
};
pub use record::{Engagement, Post, RawItem, Source};
pub use stall::StallDetector;
pub use tier::{Cursor, ExhaustedReason, TierCapability, TierDescriptor, TierStatus, TierUsage};
pub use window::{DateWindow, Verdict, WindowState};
