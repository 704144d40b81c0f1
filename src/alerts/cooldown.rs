use crate::events::{AlertKind, Timestamp};
use chrono::{Duration, Utc};

/// Per-class cooldown for alert notifications
///
/// Tracks when each alert class last fired and only allows it to fire again once the
/// cooldown has elapsed. A class that never fired may fire immediately.
#[derive(Debug, Clone)]
pub struct AlertCooldown {
    /// Minimum time between two firings of the same class
    cooldown: Duration,
    /// Last firing of the failover class
    last_failover: Option<Timestamp>,
    /// Last firing of the error-rate class
    last_error_rate: Option<Timestamp>,
}

impl Default for AlertCooldown {
    fn default() -> Self {
        Self::new(Duration::seconds(300))
    }
}

impl AlertCooldown {
    /// Create a cooldown tracker with nothing fired yet
    ///
    /// # Arguments
    ///
    /// * `cooldown` - Minimum time between two firings of the same class
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_failover: None,
            last_error_rate: None,
        }
    }

    /// Check if `kind` may fire now
    pub fn can_fire(&self, kind: AlertKind) -> bool {
        self.can_fire_at(kind, Utc::now())
    }

    /// Check if `kind` may fire at a specific time
    pub fn can_fire_at(&self, kind: AlertKind, now: Timestamp) -> bool {
        match self.last_fired(kind) {
            None => true,
            Some(last) => now - last >= self.cooldown,
        }
    }

    /// Record that `kind` fired at a specific time
    ///
    /// Only call this when an alert actually fired, not when it was merely considered.
    pub fn record_fired_at(&mut self, kind: AlertKind, now: Timestamp) {
        *self.slot(kind) = Some(now);
    }

    /// When `kind` last fired, if ever
    pub fn last_fired(&self, kind: AlertKind) -> Option<Timestamp> {
        match kind {
            AlertKind::Failover => self.last_failover,
            AlertKind::ErrorRate => self.last_error_rate,
        }
    }

    /// Configured cooldown
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    fn slot(&mut self, kind: AlertKind) -> &mut Option<Timestamp> {
        match kind {
            AlertKind::Failover => &mut self.last_failover,
            AlertKind::ErrorRate => &mut self.last_error_rate,
        }
    }
}
