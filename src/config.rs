use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Default per-file size cap applied by the import engines.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 5_000_000;

/// Default drop target allow-list.
pub const DEFAULT_ACCEPTED_TYPES: &str = ".txt,.md,.json,.enex";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty Import service and CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Tag every imported note as markdown.
    pub markdown: bool,
    /// Largest file, in bytes, an engine will read.
    pub max_file_bytes: u64,
    /// Comma-separated extension allow-list used by the drop target.
    pub accepted_types: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            markdown: false,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            accepted_types: DEFAULT_ACCEPTED_TYPES.to_string(),
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            markdown: load_env_optional("IMPORT_MARKDOWN")
                .map(|value| {
                    parse_bool(&value)
                        .ok_or_else(|| ConfigError::InvalidValue("IMPORT_MARKDOWN".into()))
                })
                .transpose()?
                .unwrap_or(defaults.markdown),
            max_file_bytes: load_env_optional("IMPORT_MAX_FILE_BYTES")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("IMPORT_MAX_FILE_BYTES".into()))
                })
                .transpose()?
                .unwrap_or(defaults.max_file_bytes),
            accepted_types: load_env_optional("IMPORT_ACCEPTED_TYPES")
                .unwrap_or(defaults.accepted_types),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        markdown = config.markdown,
        max_file_bytes = config.max_file_bytes,
        accepted_types = %config.accepted_types,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn defaults_cover_all_supported_formats() {
        let config = Config::default();
        assert!(!config.markdown);
        assert_eq!(config.max_file_bytes, DEFAULT_MAX_FILE_BYTES);
        for extension in [".txt", ".md", ".json", ".enex"] {
            assert!(config.accepted_types.contains(extension));
        }
    }
}
