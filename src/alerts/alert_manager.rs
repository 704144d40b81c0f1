use crate::alerts::{AlertCooldown, Notifier};
use crate::error::AlertError;
use crate::events::{AlertKind, FailoverEvent, Timestamp};
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

/// What happened to an alert candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    /// The triggering condition was false
    NotTriggered,
    /// The condition was true but the class is still cooling down
    Suppressed,
    /// The alert fired and the notifier accepted it
    Delivered,
    /// The alert fired but the notifier failed or timed out
    DeliveryFailed,
}

impl AlertDecision {
    /// Whether the alert fired, regardless of delivery success
    pub fn fired(self) -> bool {
        matches!(self, AlertDecision::Delivered | AlertDecision::DeliveryFailed)
    }
}

/// Thresholds and timing for the alert dispatcher
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    /// Minimum time between two notifications of the same class
    pub cooldown: chrono::Duration,
    /// Error rate (percent) at or above which the error-rate alert triggers
    pub error_rate_threshold: f64,
    /// Upper bound for one notifier call
    pub notify_timeout: Duration,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            cooldown: chrono::Duration::seconds(300),
            error_rate_threshold: 2.0,
            notify_timeout: Duration::from_secs(5),
        }
    }
}

/// Decides which alerts fire and hands them to the notifier
///
/// Each alert class (failover, error rate) fires when its condition holds and its
/// cooldown has elapsed. Sustained conditions therefore produce one notification per
/// cooldown interval. Notification failures are logged and swallowed so that a broken
/// webhook never interrupts monitoring.
pub struct AlertManager {
    /// Outbound transport
    notifier: Arc<dyn Notifier>,
    /// Last firing per alert class
    cooldown: AlertCooldown,
    /// Error rate threshold in percent
    error_rate_threshold: f64,
    /// Bound on a single delivery attempt
    notify_timeout: Duration,
    /// Runtime driving the async notifier from the synchronous detection loop
    runtime: Runtime,
}

impl AlertManager {
    /// Create a new alert manager
    ///
    /// # Errors
    ///
    /// Returns `AlertError::IoError` if the notification runtime cannot be created.
    pub fn new(notifier: Arc<dyn Notifier>, policy: AlertPolicy) -> Result<Self, AlertError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;

        Ok(Self {
            notifier,
            cooldown: AlertCooldown::new(policy.cooldown),
            error_rate_threshold: policy.error_rate_threshold,
            notify_timeout: policy.notify_timeout,
            runtime,
        })
    }

    /// Consider notifying about a pool change
    pub fn consider_failover(&mut self, event: &FailoverEvent) -> AlertDecision {
        self.consider_failover_at(event, Utc::now())
    }

    /// Consider notifying about a pool change at a specific time
    pub fn consider_failover_at(&mut self, event: &FailoverEvent, now: Timestamp) -> AlertDecision {
        if !self.cooldown.can_fire_at(AlertKind::Failover, now) {
            debug!(
                "Failover alert suppressed by cooldown: {} -> {}",
                event.from, event.to
            );
            return AlertDecision::Suppressed;
        }

        let message = Self::format_failover_message(event);
        self.fire(AlertKind::Failover, &message, now)
    }

    /// Consider notifying about the current error rate
    ///
    /// # Arguments
    ///
    /// * `rate` - Error rate in percent, `None` when the window is empty
    /// * `sample_count` - Number of requests the rate was computed over
    pub fn consider_error_rate(&mut self, rate: Option<f64>, sample_count: usize) -> AlertDecision {
        self.consider_error_rate_at(rate, sample_count, Utc::now())
    }

    /// Consider notifying about the current error rate at a specific time
    pub fn consider_error_rate_at(
        &mut self,
        rate: Option<f64>,
        sample_count: usize,
        now: Timestamp,
    ) -> AlertDecision {
        let rate = match rate {
            Some(rate) if sample_count > 0 && rate >= self.error_rate_threshold => rate,
            _ => return AlertDecision::NotTriggered,
        };

        if !self.cooldown.can_fire_at(AlertKind::ErrorRate, now) {
            debug!(
                "Error rate alert suppressed by cooldown: {:.2}% over {} requests",
                rate, sample_count
            );
            return AlertDecision::Suppressed;
        }

        let message = Self::format_error_rate_message(rate, sample_count, now);
        self.fire(AlertKind::ErrorRate, &message, now)
    }

    /// Configured error rate threshold in percent
    pub fn error_rate_threshold(&self) -> f64 {
        self.error_rate_threshold
    }

    /// When `kind` last fired, if ever
    pub fn last_fired(&self, kind: AlertKind) -> Option<Timestamp> {
        self.cooldown.last_fired(kind)
    }

    /// Mark the class as fired and attempt delivery
    fn fire(&mut self, kind: AlertKind, message: &str, now: Timestamp) -> AlertDecision {
        self.cooldown.record_fired_at(kind, now);

        match self.deliver(message) {
            Ok(()) => {
                info!("Sent {} alert: {}", kind, message);
                AlertDecision::Delivered
            }
            Err(e) => {
                warn!("Failed to deliver {} alert: {}", kind, e);
                AlertDecision::DeliveryFailed
            }
        }
    }

    /// Run the notifier to completion, bounded by the notify timeout
    fn deliver(&self, message: &str) -> Result<(), AlertError> {
        let notifier = Arc::clone(&self.notifier);
        let timeout = self.notify_timeout;

        self.runtime.block_on(async move {
            tokio::time::timeout(timeout, notifier.notify(message))
                .await
                .map_err(|_| AlertError::Timeout)?
        })
    }

    fn format_timestamp(now: Timestamp) -> String {
        now.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
    }

    /// Human-readable failover notification text
    fn format_failover_message(event: &FailoverEvent) -> String {
        format!(
            ":rotating_light: Failover detected: {} -> {} at {}",
            event.from,
            event.to,
            Self::format_timestamp(event.timestamp)
        )
    }

    /// Human-readable error rate notification text
    fn format_error_rate_message(rate: f64, sample_count: usize, now: Timestamp) -> String {
        format!(
            ":warning: High upstream error rate: {:.2}% over last {} requests at {}",
            rate,
            sample_count,
            Self::format_timestamp(now)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::MockNotifier;
    use chrono::TimeZone;

    fn manager_with(notifier: &MockNotifier, cooldown_secs: i64) -> AlertManager {
        let policy = AlertPolicy {
            cooldown: chrono::Duration::seconds(cooldown_secs),
            error_rate_threshold: 2.0,
            notify_timeout: Duration::from_millis(200),
        };
        AlertManager::new(Arc::new(notifier.clone()), policy).unwrap()
    }

    fn failover(from: &str, to: &str) -> FailoverEvent {
        FailoverEvent {
            from: from.to_string(),
            to: to.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_first_failover_fires_immediately() {
        let notifier = MockNotifier::new();
        let mut manager = manager_with(&notifier, 300);

        let decision = manager.consider_failover(&failover("blue", "green"));

        assert_eq!(decision, AlertDecision::Delivered);
        assert_eq!(notifier.call_count(), 1);
        assert!(notifier.messages()[0].contains("blue -> green"));
    }

    #[test]
    fn test_failover_within_cooldown_is_suppressed() {
        let notifier = MockNotifier::new();
        let mut manager = manager_with(&notifier, 300);
        let now = Utc::now();

        manager.consider_failover_at(&failover("blue", "green"), now);
        let decision = manager.consider_failover_at(
            &failover("green", "blue"),
            now + chrono::Duration::seconds(10),
        );

        assert_eq!(decision, AlertDecision::Suppressed);
        assert_eq!(notifier.call_count(), 1);
        assert_eq!(manager.last_fired(AlertKind::Failover), Some(now));
    }

    #[test]
    fn test_failover_after_cooldown_fires_again() {
        let notifier = MockNotifier::new();
        let mut manager = manager_with(&notifier, 300);
        let now = Utc::now();

        manager.consider_failover_at(&failover("blue", "green"), now);
        let decision = manager.consider_failover_at(
            &failover("green", "blue"),
            now + chrono::Duration::seconds(300),
        );

        assert_eq!(decision, AlertDecision::Delivered);
        assert_eq!(notifier.call_count(), 2);
    }

    #[test]
    fn test_error_rate_below_threshold_not_triggered() {
        let notifier = MockNotifier::new();
        let mut manager = manager_with(&notifier, 300);

        assert_eq!(
            manager.consider_error_rate(Some(1.99), 200),
            AlertDecision::NotTriggered
        );
        assert_eq!(notifier.call_count(), 0);
        assert_eq!(manager.last_fired(AlertKind::ErrorRate), None);
    }

    #[test]
    fn test_error_rate_at_threshold_fires() {
        let notifier = MockNotifier::new();
        let mut manager = manager_with(&notifier, 300);

        assert_eq!(
            manager.consider_error_rate(Some(2.0), 200),
            AlertDecision::Delivered
        );
        assert!(notifier.messages()[0].contains("2.00% over last 200 requests"));
    }

    #[test]
    fn test_empty_window_never_alerts() {
        let notifier = MockNotifier::new();
        let mut manager = manager_with(&notifier, 0);

        assert_eq!(
            manager.consider_error_rate(None, 0),
            AlertDecision::NotTriggered
        );
        assert_eq!(
            manager.consider_error_rate(Some(100.0), 0),
            AlertDecision::NotTriggered
        );
        assert_eq!(notifier.call_count(), 0);
    }

    #[test]
    fn test_sustained_error_rate_alerts_once_per_cooldown() {
        let notifier = MockNotifier::new();
        let mut manager = manager_with(&notifier, 60);
        let start = Utc::now();

        let fired = (0..120)
            .map(|second| {
                manager.consider_error_rate_at(
                    Some(50.0),
                    20,
                    start + chrono::Duration::seconds(second),
                )
            })
            .filter(|decision| decision.fired())
            .count();

        // Fires at 0s and 60s
        assert_eq!(fired, 2);
        assert_eq!(notifier.call_count(), 2);
    }

    #[test]
    fn test_failover_and_error_rate_cooldowns_are_independent() {
        let notifier = MockNotifier::new();
        let mut manager = manager_with(&notifier, 300);
        let now = Utc::now();

        assert!(manager
            .consider_failover_at(&failover("blue", "green"), now)
            .fired());
        assert!(manager.consider_error_rate_at(Some(10.0), 10, now).fired());
        assert_eq!(notifier.call_count(), 2);
    }

    #[test]
    fn test_notifier_failure_is_swallowed_and_cooldown_advances() {
        let notifier = MockNotifier::failing("HTTP 500");
        let mut manager = manager_with(&notifier, 300);
        let now = Utc::now();

        let decision = manager.consider_failover_at(&failover("blue", "green"), now);
        assert_eq!(decision, AlertDecision::DeliveryFailed);
        assert_eq!(manager.last_fired(AlertKind::Failover), Some(now));

        // Failed delivery is not retried within the cooldown
        let decision = manager.consider_failover_at(
            &failover("green", "blue"),
            now + chrono::Duration::seconds(1),
        );
        assert_eq!(decision, AlertDecision::Suppressed);
        assert_eq!(notifier.call_count(), 1);
    }

    #[test]
    fn test_slow_notifier_times_out() {
        let notifier = MockNotifier::new().with_delay(Duration::from_secs(5));
        let mut manager = manager_with(&notifier, 300);

        let decision = manager.consider_error_rate(Some(100.0), 10);
        assert_eq!(decision, AlertDecision::DeliveryFailed);
    }

    #[test]
    fn test_failover_message_format() {
        let observed = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        let event = FailoverEvent {
            timestamp: observed,
            ..failover("blue", "green")
        };
        let message = AlertManager::format_failover_message(&event);

        assert_eq!(
            message,
            ":rotating_light: Failover detected: blue -> green at 2026-10-19T08:30:00.000000Z"
        );
    }

    #[test]
    fn test_failover_message_uses_observation_time() {
        let notifier = MockNotifier::new();
        let mut manager = manager_with(&notifier, 300);
        let observed = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        let event = FailoverEvent {
            timestamp: observed,
            ..failover("green", "blue")
        };

        let decision = manager.consider_failover_at(&event, observed + chrono::Duration::seconds(2));

        assert_eq!(decision, AlertDecision::Delivered);
        assert!(notifier.messages()[0].ends_with("green -> blue at 2026-10-19T08:30:00.000000Z"));
    }

    #[test]
    fn test_error_rate_message_format() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        let message = AlertManager::format_error_rate_message(12.5, 200, now);

        assert_eq!(
            message,
            ":warning: High upstream error rate: 12.50% over last 200 requests at 2026-10-19T08:30:00.000000Z"
        );
    }

    #[test]
    fn test_alert_decision_fired() {
        assert!(AlertDecision::Delivered.fired());
        assert!(AlertDecision::DeliveryFailed.fired());
        assert!(!AlertDecision::Suppressed.fired());
        assert!(!AlertDecision::NotTriggered.fired());
    }
}
