//! Core event types for the pool watcher
//!
//! This module defines the values that flow through the watcher: the structured
//! `LogEvent` parsed from one access log line, the `FailoverEvent` emitted on a pool
//! change, and the alert classes the dispatcher tracks cooldowns for.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Access log grammar written by the reverse proxy. Anything may precede `pool=`.
const LINE_PATTERN: &str = r"^.*pool=(?P<pool>\S+)\s+release=(?P<release>\S+)\s+status=(?P<status>\d+)\s+upstream_status=(?P<upstream_status>\d+)\s+upstream_addr=(?P<upstream_addr>\S+)";

fn line_regex() -> &'static Regex {
    static LINE_REGEX: OnceLock<Regex> = OnceLock::new();
    LINE_REGEX.get_or_init(|| Regex::new(LINE_PATTERN).expect("access log pattern is valid"))
}

/// One request parsed from the access log
///
/// Only ever constructed from a line that matches the access log grammar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEvent {
    /// Backend pool that served the request (e.g. "blue", "green")
    pub pool: String,
    /// Release identifier reported by the pool
    pub release: String,
    /// Status code returned to the client
    pub status: u32,
    /// Status code returned by the upstream backend
    pub upstream_status: u32,
    /// Address of the upstream backend
    pub upstream_addr: String,
}

impl LogEvent {
    /// Parse one access log line
    ///
    /// The line is expected to have its trailing newline already stripped. Lines that
    /// do not match the grammar, or whose status fields do not fit an integer, yield
    /// `None` and must be skipped by the caller. Malformed input never panics.
    ///
    /// # Example
    ///
    /// ```
    /// use pool_watcher::events::LogEvent;
    ///
    /// let line = "10.0.0.1 - - pool=blue release=blue-1 status=200 upstream_status=200 upstream_addr=172.18.0.2:3000";
    /// let event = LogEvent::parse(line).unwrap();
    /// assert_eq!(event.pool, "blue");
    /// assert!(LogEvent::parse("GET / HTTP/1.1 200").is_none());
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let caps = line_regex().captures(line)?;

        Some(Self {
            pool: caps["pool"].to_string(),
            release: caps["release"].to_string(),
            status: caps["status"].parse().ok()?,
            upstream_status: caps["upstream_status"].parse().ok()?,
            upstream_addr: caps["upstream_addr"].to_string(),
        })
    }

    /// Outcome stored in the rolling window: `true` for an upstream 5xx
    pub fn is_upstream_error(&self) -> bool {
        (500..=599).contains(&self.upstream_status)
    }
}

/// A change of the pool serving traffic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailoverEvent {
    /// Pool that was active before the change
    pub from: String,
    /// Pool observed in the latest request
    pub to: String,
    /// When the change was observed
    pub timestamp: Timestamp,
}

/// Alert classes, each with its own cooldown
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// The serving pool changed
    Failover,
    /// The upstream error rate crossed the threshold
    ErrorRate,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Failover => write!(f, "failover"),
            AlertKind::ErrorRate => write!(f, "error_rate"),
        }
    }
}

/// Messages consumed by the detection loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMessage {
    /// A raw line read from the access log
    Line(String),
    /// Request to stop the detection loop
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_LINE: &str = r#"172.18.0.1 - - [19/Oct/2026:10:00:00 +0000] "GET /version HTTP/1.1" pool=green release=green-v2 status=200 upstream_status=502 upstream_addr=172.18.0.3:3000 request_time=0.004"#;

    #[test]
    fn test_parse_valid_line() {
        let event = LogEvent::parse(VALID_LINE).unwrap();

        assert_eq!(event.pool, "green");
        assert_eq!(event.release, "green-v2");
        assert_eq!(event.status, 200);
        assert_eq!(event.upstream_status, 502);
        assert_eq!(event.upstream_addr, "172.18.0.3:3000");
    }

    #[test]
    fn test_parse_without_prefix() {
        let line = "pool=blue release=r1 status=200 upstream_status=200 upstream_addr=a:1";
        let event = LogEvent::parse(line).unwrap();
        assert_eq!(event.pool, "blue");
    }

    #[test]
    fn test_parse_missing_upstream_status() {
        let line = "pool=blue release=r1 status=200 upstream_addr=172.18.0.2:3000";
        assert!(LogEvent::parse(line).is_none());
    }

    #[test]
    fn test_parse_non_numeric_status() {
        let line = "pool=blue release=r1 status=abc upstream_status=200 upstream_addr=a:1";
        assert!(LogEvent::parse(line).is_none());

        // nginx writes "-" when no upstream was contacted
        let line = "pool=blue release=r1 status=499 upstream_status=- upstream_addr=-";
        assert!(LogEvent::parse(line).is_none());
    }

    #[test]
    fn test_parse_fields_out_of_order() {
        let line = "release=r1 pool=blue status=200 upstream_status=200 upstream_addr=a:1";
        assert!(LogEvent::parse(line).is_none());
    }

    #[test]
    fn test_parse_empty_and_garbage() {
        assert!(LogEvent::parse("").is_none());
        assert!(LogEvent::parse("   ").is_none());
        assert!(LogEvent::parse("pool=").is_none());
    }

    #[test]
    fn test_parse_status_outside_http_range() {
        let line = "pool=blue release=r1 status=999 upstream_status=42 upstream_addr=a:1";
        let event = LogEvent::parse(line).unwrap();
        assert_eq!(event.status, 999);
        assert!(!event.is_upstream_error());
    }

    #[test]
    fn test_parse_status_overflow_is_no_match() {
        let line =
            "pool=blue release=r1 status=200 upstream_status=99999999999999 upstream_addr=a:1";
        assert!(LogEvent::parse(line).is_none());
    }

    #[test]
    fn test_upstream_error_classification() {
        let mut event = LogEvent::parse(VALID_LINE).unwrap();

        for (status, expected) in [
            (200, false),
            (404, false),
            (499, false),
            (500, true),
            (503, true),
            (599, true),
            (600, false),
            (5000, false),
        ] {
            event.upstream_status = status;
            assert_eq!(event.is_upstream_error(), expected, "status {}", status);
        }
    }

    #[test]
    fn test_alert_kind_display_and_serialization() {
        assert_eq!(AlertKind::Failover.to_string(), "failover");
        assert_eq!(AlertKind::ErrorRate.to_string(), "error_rate");
        assert_eq!(
            serde_json::to_string(&AlertKind::ErrorRate).unwrap(),
            "\"error_rate\""
        );
    }
}
