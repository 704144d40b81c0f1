use crate::events::{FailoverEvent, Timestamp};
use chrono::Utc;
use log::debug;

/// Tracks which pool is currently serving traffic
///
/// Every observed pool is compared with the stored one. A difference produces a
/// `FailoverEvent` and the stored pool is replaced unconditionally; whether the event
/// is actually notified is decided later by the alert cooldown.
#[derive(Debug, Clone)]
pub struct FailoverDetector {
    current_pool: String,
}

impl FailoverDetector {
    /// Create a detector seeded with the pool believed to be active at startup
    pub fn new(initial_pool: impl Into<String>) -> Self {
        Self {
            current_pool: initial_pool.into(),
        }
    }

    /// Observe the pool of one request
    ///
    /// # Returns
    ///
    /// `Some(FailoverEvent)` if the pool differs from the stored one, `None` otherwise
    pub fn observe(&mut self, pool: &str) -> Option<FailoverEvent> {
        self.observe_at(pool, Utc::now())
    }

    /// Observe the pool of one request at a specific time
    ///
    /// This is primarily used for testing with controlled timestamps.
    pub fn observe_at(&mut self, pool: &str, now: Timestamp) -> Option<FailoverEvent> {
        if pool == self.current_pool {
            return None;
        }

        let from = std::mem::replace(&mut self.current_pool, pool.to_string());
        debug!("Active pool changed: {} -> {}", from, pool);

        Some(FailoverEvent {
            from,
            to: pool.to_string(),
            timestamp: now,
        })
    }

    /// Pool currently believed to be active
    pub fn current_pool(&self) -> &str {
        &self.current_pool
    }
}
