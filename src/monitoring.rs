//! Self-monitoring counters for the pool watcher
//!
//! Tracks how much of the access log the watcher has consumed and what the alert
//! dispatcher did with it, so operators can tell a quiet log apart from a stuck watcher.

use crate::alerts::AlertDecision;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

/// Number of lines between two periodic debug reports
pub const REPORT_EVERY_LINES: u64 = 1000;

/// Counters for a single watcher run
#[derive(Debug, Clone, Serialize)]
pub struct WatcherStats {
    /// Lines received from the tailer
    pub lines_read: u64,
    /// Lines that did not match the access log format
    pub parse_misses: u64,
    /// Lines parsed into events and fed to the detectors
    pub events_processed: u64,
    /// Pool changes seen by the failover detector
    pub failovers_observed: u64,
    /// Alerts accepted by the notifier
    pub alerts_delivered: u64,
    /// Alerts that fired but could not be delivered
    pub alerts_failed: u64,
    /// Alert candidates held back by the cooldown
    pub alerts_suppressed: u64,
    /// When this run started
    pub started_at: DateTime<Utc>,
}

impl Default for WatcherStats {
    fn default() -> Self {
        Self::new()
    }
}

impl WatcherStats {
    /// Start counting from zero
    pub fn new() -> Self {
        Self {
            lines_read: 0,
            parse_misses: 0,
            events_processed: 0,
            failovers_observed: 0,
            alerts_delivered: 0,
            alerts_failed: 0,
            alerts_suppressed: 0,
            started_at: Utc::now(),
        }
    }

    /// Record a line received from the tailer
    pub fn record_line(&mut self) {
        self.lines_read += 1;
        if self.lines_read % REPORT_EVERY_LINES == 0 {
            self.report_progress();
        }
    }

    /// Record a line that could not be parsed
    pub fn record_parse_miss(&mut self) {
        self.parse_misses += 1;
    }

    /// Record a parsed event
    pub fn record_event(&mut self) {
        self.events_processed += 1;
    }

    /// Record a pool change
    pub fn record_failover(&mut self) {
        self.failovers_observed += 1;
    }

    /// Record what the dispatcher decided for one alert candidate
    pub fn record_decision(&mut self, decision: AlertDecision) {
        match decision {
            AlertDecision::NotTriggered => {}
            AlertDecision::Suppressed => self.alerts_suppressed += 1,
            AlertDecision::Delivered => self.alerts_delivered += 1,
            AlertDecision::DeliveryFailed => self.alerts_failed += 1,
        }
    }

    /// Alerts that fired, delivered or not
    pub fn alerts_fired(&self) -> u64 {
        self.alerts_delivered + self.alerts_failed
    }

    /// Share of fired alerts the notifier accepted, in percent
    ///
    /// Nothing fired counts as 100%.
    pub fn delivery_success_rate(&self) -> f64 {
        let fired = self.alerts_fired();
        if fired == 0 {
            return 100.0;
        }
        self.alerts_delivered as f64 / fired as f64 * 100.0
    }

    /// Log the final counters for this run
    pub fn log_summary(&self) {
        let uptime = Utc::now() - self.started_at;
        info!(
            "Watcher stats: uptime={}s, lines={}, events={}, parse_misses={}, failovers={}, alerts delivered={} failed={} suppressed={}",
            uptime.num_seconds(),
            self.lines_read,
            self.events_processed,
            self.parse_misses,
            self.failovers_observed,
            self.alerts_delivered,
            self.alerts_failed,
            self.alerts_suppressed
        );

        if self.alerts_fired() > 0 && self.delivery_success_rate() < 90.0 {
            warn!(
                "Low notification success rate: {:.1}%",
                self.delivery_success_rate()
            );
        }
    }

    fn report_progress(&self) {
        debug!(
            "Processed {} lines ({} events, {} parse misses, {} alerts fired)",
            self.lines_read,
            self.events_processed,
            self.parse_misses,
            self.alerts_fired()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_start_at_zero() {
        let stats = WatcherStats::new();

        assert_eq!(stats.lines_read, 0);
        assert_eq!(stats.events_processed, 0);
        assert_eq!(stats.alerts_fired(), 0);
        assert_eq!(stats.delivery_success_rate(), 100.0);
    }

    #[test]
    fn test_line_and_event_counters() {
        let mut stats = WatcherStats::new();

        for _ in 0..(REPORT_EVERY_LINES + 5) {
            stats.record_line();
        }
        stats.record_parse_miss();
        stats.record_event();
        stats.record_event();
        stats.record_failover();

        assert_eq!(stats.lines_read, REPORT_EVERY_LINES + 5);
        assert_eq!(stats.parse_misses, 1);
        assert_eq!(stats.events_processed, 2);
        assert_eq!(stats.failovers_observed, 1);
    }

    #[test]
    fn test_decision_counters() {
        let mut stats = WatcherStats::new();

        stats.record_decision(AlertDecision::NotTriggered);
        stats.record_decision(AlertDecision::Suppressed);
        stats.record_decision(AlertDecision::Delivered);
        stats.record_decision(AlertDecision::Delivered);
        stats.record_decision(AlertDecision::Delivered);
        stats.record_decision(AlertDecision::DeliveryFailed);

        assert_eq!(stats.alerts_suppressed, 1);
        assert_eq!(stats.alerts_delivered, 3);
        assert_eq!(stats.alerts_failed, 1);
        assert_eq!(stats.alerts_fired(), 4);
        assert!((stats.delivery_success_rate() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_serialize() {
        let mut stats = WatcherStats::new();
        stats.record_line();

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["lines_read"], 1);
        assert!(json.get("started_at").is_some());
    }
}
