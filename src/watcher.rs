use crate::aggregator::RollingWindow;
use crate::alerts::{AlertDecision, AlertManager, AlertPolicy, Notifier};
use crate::config::Config;
use crate::error::{ConfigError, WatcherError};
use crate::events::{LogEvent, Timestamp, WatchMessage};
use crate::monitoring::WatcherStats;
use crate::triggers::FailoverDetector;
use chrono::Utc;
use log::{debug, info};
use std::num::NonZeroUsize;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// What the detectors made of one parsed line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineReport {
    /// Decision for the failover alert; `NotTriggered` when the pool did not change
    pub failover: AlertDecision,
    /// Decision for the error-rate alert
    pub error_rate: AlertDecision,
}

/// Detection loop over access log lines
///
/// Feeds each parsed line to the failover detector and the rolling window, then asks
/// the alert manager about both alert classes. Lines are processed strictly one at a
/// time in arrival order.
pub struct PoolWatcher {
    window: RollingWindow,
    detector: FailoverDetector,
    alerts: AlertManager,
    stats: WatcherStats,
}

impl PoolWatcher {
    /// Build a watcher from configuration and an alert transport
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Config` if the configuration is invalid and
    /// `WatcherError::Alert` if the alert runtime cannot be created.
    pub fn new(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self, WatcherError> {
        config.validate()?;

        let capacity = NonZeroUsize::new(config.window_size).ok_or_else(|| {
            ConfigError::ValidationError("window_size must be greater than zero".to_string())
        })?;

        let policy = AlertPolicy {
            cooldown: config.alert_cooldown(),
            error_rate_threshold: config.error_rate_threshold,
            notify_timeout: config.notify_timeout(),
        };

        Ok(Self::from_parts(
            RollingWindow::new(capacity),
            FailoverDetector::new(config.active_pool.clone()),
            AlertManager::new(notifier, policy)?,
        ))
    }

    /// Assemble a watcher from already built components
    pub fn from_parts(window: RollingWindow, detector: FailoverDetector, alerts: AlertManager) -> Self {
        Self {
            window,
            detector,
            alerts,
            stats: WatcherStats::new(),
        }
    }

    /// Process one raw log line
    ///
    /// Returns `None` for lines that do not match the access log format. Such lines
    /// leave every piece of detection state untouched.
    pub fn process_line(&mut self, line: &str) -> Option<LineReport> {
        self.process_line_at(line, Utc::now())
    }

    /// Process one raw log line at a specific time
    pub fn process_line_at(&mut self, line: &str, now: Timestamp) -> Option<LineReport> {
        self.stats.record_line();

        let Some(event) = LogEvent::parse(line) else {
            debug!("Skipping unparsable line: {}", line);
            self.stats.record_parse_miss();
            return None;
        };
        self.stats.record_event();

        self.window.push(event.is_upstream_error());

        let failover = match self.detector.observe_at(&event.pool, now) {
            Some(failover) => {
                self.stats.record_failover();
                self.alerts.consider_failover_at(&failover, now)
            }
            None => AlertDecision::NotTriggered,
        };
        self.stats.record_decision(failover);

        let error_rate =
            self.alerts
                .consider_error_rate_at(self.window.error_rate(), self.window.len(), now);
        self.stats.record_decision(error_rate);

        Some(LineReport {
            failover,
            error_rate,
        })
    }

    /// Consume messages until shutdown is requested or every sender is gone
    ///
    /// The receiver is dropped on return, which tells the tailer thread to exit.
    pub fn run(&mut self, messages: Receiver<WatchMessage>) -> WatcherStats {
        info!(
            "Watching pool traffic: active_pool={}, window={}, threshold={}%",
            self.detector.current_pool(),
            self.window.capacity(),
            self.alerts.error_rate_threshold()
        );

        loop {
            match messages.recv() {
                Ok(WatchMessage::Line(line)) => {
                    self.process_line(&line);
                }
                Ok(WatchMessage::Shutdown) => {
                    info!("Shutdown requested, stopping detection loop");
                    break;
                }
                Err(_) => {
                    info!("Log tailer disconnected, stopping detection loop");
                    break;
                }
            }
        }

        self.stats.clone()
    }

    /// Pool the watcher currently believes is serving traffic
    pub fn current_pool(&self) -> &str {
        self.detector.current_pool()
    }

    /// Recent request outcomes
    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    /// Counters for this run
    pub fn stats(&self) -> &WatcherStats {
        &self.stats
    }
}
