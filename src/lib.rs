/// Error types for the pool watcher
pub mod error;

/// Access log events and alert classes
pub mod events;

/// Access log tailing
pub mod collectors;

/// Rolling window of request outcomes
pub mod aggregator;

/// Failover detection
pub mod triggers;

/// Alert dispatch and notifications
pub mod alerts;

/// Configuration management
pub mod config;

/// Self-monitoring counters
pub mod monitoring;

/// Detection loop tying the components together
pub mod watcher;

// Re-export commonly used types
pub use error::{AlertError, CollectorError, ConfigError, WatcherError};
pub use events::{FailoverEvent, LogEvent, WatchMessage};
pub use watcher::PoolWatcher;
