use std::{
    collections::HashMap,
    sync::{Mutex, OnceLock},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy)]
struct ThrottleSlot {
    last: Instant,
    suppressed: u64,
}

/// Per-key rate limiter for repetitive warnings (malformed datagrams, stalled corrections).
#[derive(Debug, Default)]
pub struct WarnThrottle {
    slots: HashMap<&'static str, ThrottleSlot>,
}

impl WarnThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Some(suppressed)` when a warning for `key` may be emitted at `now`, where
    /// `suppressed` counts the calls swallowed since the previous emission.
    pub fn check(&mut self, key: &'static str, interval: Duration, now: Instant) -> Option<u64> {
        match self.slots.get_mut(key) {
            Some(slot) if now.saturating_duration_since(slot.last) < interval => {
                slot.suppressed = slot.suppressed.saturating_add(1);
                None
            }
            Some(slot) => {
                let suppressed = slot.suppressed;
                slot.last = now;
                slot.suppressed = 0;
                Some(suppressed)
            }
            None => {
                self.slots.insert(
                    key,
                    ThrottleSlot {
                        last: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }
}

/// Process-wide throttle. Returns true when the caller should log its warning now.
pub fn warn_throttled(key: &'static str, interval: Duration) -> bool {
    let Some(suppressed) = warn_throttled_with_count(key, interval) else {
        return false;
    };
    if suppressed > 0 {
        tracing::warn!(
            event = "throttled_warning_summary",
            key,
            suppressed,
            "throttled warnings were suppressed"
        );
    }
    true
}

pub fn warn_throttled_with_count(key: &'static str, interval: Duration) -> Option<u64> {
    static GLOBAL: OnceLock<Mutex<WarnThrottle>> = OnceLock::new();
    let throttle = GLOBAL.get_or_init(|| Mutex::new(WarnThrottle::new()));
    let mut guard = match throttle.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("warn throttle lock poisoned; continuing with recovered state");
            poisoned.into_inner()
        }
    };
    guard.check(key, interval, Instant::now())
}
