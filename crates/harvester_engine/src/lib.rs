//! Harvester engine: async acquisition tiers and run orchestration.
mod decode;
mod extractor;
mod fallback;
mod http;
mod limiter;
mod paginator;
mod runner;
mod scroll;
mod session;
mod types;

pub use decode::{decode_text, DecodedText};
pub use extractor::{CursorSource, ScrollProvider, ScrollSurface, Tier, TierAccess};
pub use fallback::{ChainOutcome, FallbackChain};
pub use http::{FetchedText, HttpFetcher, HttpSettings};
pub use limiter::{Pacing, RateLimiterRegistry};
pub use paginator::{CursorPaginator, TierHarvest};
pub use runner::{EngineHandle, HarvestEvent, RunId};
pub use scroll::ScrollHarvester;
pub use session::{
    EngineSettings, HarvestReport, HarvestRequest, HarvestSession, SessionPhase,
};
pub use types::{CursorPage, HarvestError, PageError, TierEnd};
