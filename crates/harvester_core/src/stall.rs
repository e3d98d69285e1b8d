/// Stopping rule for infinite-scroll tiers.
///
/// Best-effort heuristic, not a correctness guarantee: a tier is considered
/// stalled after a run of scroll steps that admitted no new records, or after
/// the page height stops growing for a run of steps.
#[derive(Debug, Clone)]
pub struct StallDetector {
    max_idle_steps: u32,
    max_static_height_steps: u32,
    idle_steps: u32,
    static_height_steps: u32,
}

impl StallDetector {
    pub fn new(max_idle_steps: u32, max_static_height_steps: u32) -> Self {
        Self {
            max_idle_steps: max_idle_steps.max(1),
            max_static_height_steps: max_static_height_steps.max(1),
            idle_steps: 0,
            static_height_steps: 0,
        }
    }

    /// Records one scroll step and reports whether scrolling should continue.
    pub fn should_continue(
        &mut self,
        new_admitted: usize,
        height_before: u64,
        height_after: u64,
    ) -> bool {
        if new_admitted == 0 {
            self.idle_steps += 1;
        } else {
            self.idle_steps = 0;
        }
        if height_after == height_before {
            self.static_height_steps += 1;
        } else {
            self.static_height_steps = 0;
        }
        self.idle_steps < self.max_idle_steps
            && self.static_height_steps < self.max_static_height_steps
    }

    pub fn reset(&mut self) {
        self.idle_steps = 0;
        self.static_height_steps = 0;
    }
}
