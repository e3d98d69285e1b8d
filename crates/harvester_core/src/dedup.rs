use std::collections::HashSet;

use crate::Source;

/// Tracks `(source, id)` keys admitted during one harvest run.
///
/// Scoped to a single run and never persisted; every run starts empty.
#[derive(Debug, Default)]
pub struct SeenSet {
    keys: HashSet<(Source, String)>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true and records the key the first time it is seen; false on
    /// every repeat. Idempotent under key equality regardless of call order.
    pub fn admit(&mut self, source: Source, id: &str) -> bool {
        self.keys.insert((source, id.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
