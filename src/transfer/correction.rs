use std::time::Duration;

pub const DEFAULT_CORRECTION_RETRY_CEILING: u32 = 5;

/// Repeating a correction already sent for the same `(from, to)` pair needs this many times
/// the usual number of off-cycle fragments.
pub const REPEAT_CORRECTION_FACTOR: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionDecision {
    /// Nothing to send yet.
    Hold,
    /// Ask the sender to move to the given cycle.
    Signal { cycle: u32 },
}

/// Debounces "change cycle" requests while the receiver sees fragments from a cycle other
/// than the one it is collecting.
#[derive(Debug, Clone)]
pub struct CorrectionController {
    wrong_fragments: u32,
    wrong_fragments_limit: u32,
    attempts: u32,
    retry_ceiling: u32,
    last_pair: Option<(u32, u32)>,
    last_signaled: Option<(u32, u32)>,
}

impl CorrectionController {
    pub fn new(wrong_fragments_limit: u32, retry_ceiling: u32) -> Self {
        Self {
            wrong_fragments: 0,
            wrong_fragments_limit: wrong_fragments_limit.max(1),
            attempts: 0,
            retry_ceiling,
            last_pair: None,
            last_signaled: None,
        }
    }

    pub fn wrong_fragments(&self) -> u32 {
        self.wrong_fragments
    }

    pub fn wrong_fragments_limit(&self) -> u32 {
        self.wrong_fragments_limit
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Most recent `(current, target)` evaluated, whether or not it was signalled.
    /// Diagnostic only: debouncing keys off the last signalled pair.
    pub fn last_pair(&self) -> Option<(u32, u32)> {
        self.last_pair
    }

    pub fn record_wrong_fragment(&mut self) {
        self.wrong_fragments = self.wrong_fragments.saturating_add(1);
    }

    /// An in-cycle fragment proves the sender is where we expect it.
    pub fn on_in_sync(&mut self) {
        self.wrong_fragments = 0;
        self.attempts = 0;
        self.last_signaled = None;
    }

    pub fn is_stalled(&self) -> bool {
        self.attempts > self.retry_ceiling
    }

    /// Decides whether the receiver sitting in `current` should ask the sender to move.
    /// The request always names `current`; `target` only identifies the desync condition.
    pub fn correct_cycle_to(&mut self, current: u32, target: u32) -> CorrectionDecision {
        let pair = (current, target);
        let threshold = if self.last_signaled == Some(pair) {
            self.wrong_fragments_limit
                .saturating_mul(REPEAT_CORRECTION_FACTOR)
        } else {
            self.wrong_fragments_limit
        };

        let mut decision = CorrectionDecision::Hold;
        if self.wrong_fragments > threshold {
            self.wrong_fragments = 0;
            self.attempts = self.attempts.saturating_add(1);
            self.last_signaled = Some(pair);
            decision = CorrectionDecision::Signal { cycle: current };
        }

        if self.is_stalled()
            && crate::logging::warn_throttled("cycle_correction_stalled", Duration::from_secs(10))
        {
            tracing::warn!(
                current,
                target,
                attempts = self.attempts,
                "cycle correction keeps failing; sender may be out of reach"
            );
        }

        self.last_pair = Some(pair);
        decision
    }
}
