//! Normalizer configuration loading.
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables:
//!
//! - `JA_ADDRESS_API` sets the gazetteer base URI
//! - `JA_ADDRESS_TOWN_CACHE_SIZE` sets the town cache capacity
//! - `JA_ADDRESS_TOWN_CACHE_TTL_SECS` sets the town cache TTL

use std::path::Path;

use ja_address_normalizer_models::NormalizerConfig;

pub const ENV_API: &str = "JA_ADDRESS_API";
pub const ENV_TOWN_CACHE_SIZE: &str = "JA_ADDRESS_TOWN_CACHE_SIZE";
pub const ENV_TOWN_CACHE_TTL_SECS: &str = "JA_ADDRESS_TOWN_CACHE_TTL_SECS";

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`NormalizerConfig`].
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment variable holds an unusable value.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Parses a TOML document into a config. Missing keys take defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Toml`] if the document is malformed.
pub fn parse_config(toml_str: &str) -> Result<NormalizerConfig, ConfigError> {
    Ok(toml::de::from_str(toml_str)?)
}

/// Loads the config file at `path` (defaults when `None`) and applies
/// environment overrides.
///
/// # Errors
///
/// * If the file cannot be read
/// * If the file is not valid TOML
/// * If an override variable cannot be parsed
pub fn load_config(path: Option<&Path>) -> Result<NormalizerConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            log::debug!("Loading config from {}", path.display());
            let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            parse_config(&contents)?
        }
        None => NormalizerConfig::default(),
    };

    apply_env_overrides(config, |name| std::env::var(name).ok())
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}

/// Applies overrides looked up through `lookup`, normally
/// `std::env::var`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnv`] if a numeric override is not a
/// number.
pub fn apply_env_overrides(
    mut config: NormalizerConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<NormalizerConfig, ConfigError> {
    if let Some(api) = lookup(ENV_API).filter(|v| !v.trim().is_empty()) {
        log::debug!("{ENV_API} overrides gazetteer base: {api}");
        config.api_base = api.trim().to_string();
    }
    if let Some(size) = lookup(ENV_TOWN_CACHE_SIZE) {
        config.town_cache_size = parse_env(ENV_TOWN_CACHE_SIZE, size)?;
    }
    if let Some(ttl) = lookup(ENV_TOWN_CACHE_TTL_SECS) {
        config.town_cache_ttl_secs = parse_env(ENV_TOWN_CACHE_TTL_SECS, ttl)?;
    }
    Ok(config)
}
