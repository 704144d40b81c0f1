use crate::error::ConfigError;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming an optional TOML configuration file
pub const CONFIG_FILE_ENV: &str = "WATCHER_CONFIG";

/// Longest accepted alert cooldown (one year)
pub const MAX_ALERT_COOLDOWN_SECS: u64 = 365 * 24 * 60 * 60;

/// Longest accepted webhook timeout (one hour)
pub const MAX_NOTIFY_TIMEOUT_SECS: u64 = 60 * 60;

/// Runtime configuration of the pool watcher
///
/// Every field has a default, so an empty environment yields a working watcher that
/// tails the default access log with alerting disabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Access log to tail
    pub log_path: PathBuf,
    /// Webhook endpoint for alerts; `None` disables alerting
    pub webhook_url: Option<String>,
    /// Error rate in percent at or above which an alert is raised
    pub error_rate_threshold: f64,
    /// Number of most recent requests the error rate is computed over
    pub window_size: usize,
    /// Minimum seconds between two alerts of the same class
    pub alert_cooldown_secs: u64,
    /// Pool assumed to be active at startup
    pub active_pool: String,
    /// Idle delay between polls when the log has no new data
    pub poll_interval_ms: u64,
    /// Delay before retrying after a read error
    pub retry_delay_ms: u64,
    /// Upper bound for one webhook call
    pub notify_timeout_secs: u64,
    /// Reopen the log when it is rotated or truncated
    pub follow_rotation: bool,
    /// Capacity of the queue between the tailer thread and the detection loop
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/var/log/nginx/access_stage3.log"),
            webhook_url: None,
            error_rate_threshold: 2.0,
            window_size: 200,
            alert_cooldown_secs: 300,
            active_pool: "blue".to_string(),
            poll_interval_ms: 200,
            retry_delay_ms: 1000,
            notify_timeout_secs: 5,
            follow_rotation: true,
            queue_capacity: 1024,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Fields missing from the file keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Build the process configuration
    ///
    /// Starts from defaults, applies the TOML file named by `WATCHER_CONFIG` if set,
    /// then environment overrides. An unreadable file or an invalid result is reported
    /// and replaced by defaults.
    pub fn load() -> Self {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn load_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_FILE_ENV).filter(|path| !path.is_empty()) {
            Some(path) => {
                info!("Loading configuration from: {}", path);
                match Self::from_file(Path::new(&path)) {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("Configuration file '{}' unusable ({}), using defaults", path, e);
                        Self::default()
                    }
                }
            }
            None => Self::default(),
        };

        config.apply_env_overrides(&lookup);

        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                error!("{}", e);
                warn!("Using default configuration due to invalid settings");
                Self::default()
            }
        }
    }

    /// Override fields from environment-style variables
    ///
    /// Unparsable values are logged and ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("LOG_PATH").filter(|path| !path.is_empty()) {
            self.log_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("SLACK_WEBHOOK_URL") {
            self.webhook_url = Some(url).filter(|url| !url.trim().is_empty());
        }
        if let Some(pool) = lookup("ACTIVE_POOL") {
            self.active_pool = pool;
        }

        override_parsed(lookup, "ERROR_RATE_THRESHOLD", &mut self.error_rate_threshold);
        override_parsed(lookup, "WINDOW_SIZE", &mut self.window_size);
        override_parsed(lookup, "ALERT_COOLDOWN_SEC", &mut self.alert_cooldown_secs);
        override_parsed(lookup, "POLL_INTERVAL_MS", &mut self.poll_interval_ms);
        override_parsed(lookup, "RETRY_DELAY_MS", &mut self.retry_delay_ms);
        override_parsed(lookup, "NOTIFY_TIMEOUT_SEC", &mut self.notify_timeout_secs);
        override_parsed(lookup, "FOLLOW_ROTATION", &mut self.follow_rotation);
        override_parsed(lookup, "QUEUE_CAPACITY", &mut self.queue_capacity);
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ValidationError(
                "window_size must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.error_rate_threshold) {
            return Err(ConfigError::ValidationError(format!(
                "error_rate_threshold must be within 0-100, got {}",
                self.error_rate_threshold
            )));
        }
        if self.active_pool.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "active_pool must not be empty".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.notify_timeout_secs == 0 || self.notify_timeout_secs > MAX_NOTIFY_TIMEOUT_SECS {
            return Err(ConfigError::ValidationError(format!(
                "notify_timeout_secs must be within 1-{}, got {}",
                MAX_NOTIFY_TIMEOUT_SECS, self.notify_timeout_secs
            )));
        }
        if self.alert_cooldown_secs > MAX_ALERT_COOLDOWN_SECS {
            return Err(ConfigError::ValidationError(format!(
                "alert_cooldown_secs must be at most {}, got {}",
                MAX_ALERT_COOLDOWN_SECS, self.alert_cooldown_secs
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    /// Alert cooldown, clamped to `MAX_ALERT_COOLDOWN_SECS` for unvalidated values
    pub fn alert_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.alert_cooldown_secs.min(MAX_ALERT_COOLDOWN_SECS) as i64)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };

    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!("Ignoring invalid value for {}: '{}'", key, raw),
    }
}
