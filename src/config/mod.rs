/// Configuration loading from TOML and environment variables
pub mod settings;

pub use settings::{Config, CONFIG_FILE_ENV};
