use thiserror::Error;

/// Errors that can occur while tailing the access log
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Failed to open log file {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Log tailer is already running")]
    AlreadyRunning,

    #[error("Failed to join tailer thread: {0}")]
    ThreadJoin(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CollectorError {
    /// Whether the error should stop the process rather than be retried
    pub fn is_fatal(&self) -> bool {
        matches!(self, CollectorError::OpenFailed { .. })
    }
}

/// Errors that can occur when delivering a notification
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to send notification: {0}")]
    NotificationFailed(String),

    #[error("Notification timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Errors that prevent the watcher from starting
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    #[error("Alert error: {0}")]
    Alert(#[from] AlertError),
}
