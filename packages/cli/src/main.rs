#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the Japanese address normalizer.
//!
//! Normalizes the addresses given as arguments, or one address per line
//! on stdin when none are given, and prints one JSON object per address
//! in input order. Many addresses are normalized concurrently over one
//! shared [`Normalizer`], so each gazetteer list is fetched only once.

use std::io::{BufRead as _, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures::stream::{self, StreamExt as _};
use ja_address_normalizer::config::{ConfigError, load_config};
use ja_address_normalizer::{NormalizeError, Normalizer};
use ja_address_normalizer_models::{DEFAULT_LEVEL, NormalizeOptions, NormalizerConfig};

/// Normalize Japanese addresses against the `japanese-addresses` gazetteer.
#[derive(Parser, Debug)]
#[command(name = "ja_address_cli")]
#[command(about = "Normalize Japanese addresses into prefecture, city, town and block")]
struct Cli {
    /// Addresses to normalize. Reads one per line from stdin when empty.
    addresses: Vec<String>,

    /// Deepest level to resolve: 1 prefecture, 2 city, 3 town, 8 block.
    #[arg(long, default_value_t = DEFAULT_LEVEL)]
    level: u8,

    /// Gazetteer base URI (`https://…/api/ja` or `file:///…/api/ja`).
    #[arg(long)]
    api: Option<String>,

    /// TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of cities whose town patterns stay cached.
    #[arg(long)]
    cache_size: Option<usize>,

    /// Addresses normalized concurrently.
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
}

/// Errors surfaced by the CLI.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The normalizer could not be built.
    #[error("Normalizer error: {0}")]
    Normalize(#[from] NormalizeError),

    /// Reading input or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A result could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Cli {
    /// Loads the config file and environment, then applies flag
    /// overrides on top.
    fn resolve_config(&self) -> Result<NormalizerConfig, ConfigError> {
        Ok(self.apply_flags(load_config(self.config.as_deref())?))
    }

    fn apply_flags(&self, mut config: NormalizerConfig) -> NormalizerConfig {
        if let Some(api) = &self.api {
            config.api_base.clone_from(api);
        }
        if let Some(size) = self.cache_size {
            config.town_cache_size = size;
        }
        config
    }
}

/// Non-blank input lines, trimmed.
fn read_addresses(reader: impl std::io::BufRead) -> std::io::Result<Vec<String>> {
    let mut addresses = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            addresses.push(line.to_string());
        }
    }
    Ok(addresses)
}

/// Renders one result line. Failures become `{"input": …, "error": …}`.
fn render(
    input: &str,
    result: Result<ja_address_normalizer_models::NormalizeResult, NormalizeError>,
) -> Result<String, serde_json::Error> {
    match result {
        Ok(normalized) => serde_json::to_string(&normalized),
        Err(e) => {
            log::warn!("Failed to normalize {input:?}: {e}");
            serde_json::to_string(&serde_json::json!({
                "input": input,
                "error": e.to_string(),
            }))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = cli.resolve_config()?;
    log::info!("Using gazetteer at {}", config.api_base);
    let normalizer = Arc::new(Normalizer::from_config(&config)?);

    let addresses = if cli.addresses.is_empty() {
        read_addresses(std::io::stdin().lock())?
    } else {
        cli.addresses.clone()
    };
    log::debug!(
        "Normalizing {} addresses (concurrency={})",
        addresses.len(),
        cli.concurrency
    );

    let options = NormalizeOptions { level: cli.level };
    let mut results = stream::iter(addresses.into_iter().map(|input| {
        let normalizer = normalizer.clone();
        async move {
            let result = normalizer.normalize(&input, options).await;
            (input, result)
        }
    }))
    .buffered(cli.concurrency.max(1));

    let mut stdout = std::io::stdout().lock();
    let mut failures = 0usize;
    while let Some((input, result)) = results.next().await {
        if result.is_err() {
            failures += 1;
        }
        writeln!(stdout, "{}", render(&input, result)?)?;
    }
    stdout.flush()?;

    if failures > 0 {
        log::warn!("{failures} addresses could not be normalized");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ja_address_normalizer_models::NormalizeResult;

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "ja_address_cli",
            "--level",
            "8",
            "--api",
            "file:///srv/api/ja",
            "--cache-size",
            "10",
            "東京都千代田区千代田1-1",
        ])
        .unwrap();

        assert_eq!(cli.level, 8);
        assert_eq!(cli.api.as_deref(), Some("file:///srv/api/ja"));
        assert_eq!(cli.cache_size, Some(10));
        assert_eq!(cli.concurrency, 8);
        assert_eq!(cli.addresses, vec!["東京都千代田区千代田1-1"]);
    }

    #[test]
    fn defaults_to_town_level() {
        let cli = Cli::try_parse_from(["ja_address_cli"]).unwrap();
        assert_eq!(cli.level, 3);
        assert!(cli.addresses.is_empty());
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "ja_address_cli",
            "--api",
            "http://localhost:3000/api/ja",
            "--cache-size",
            "5",
        ])
        .unwrap();

        let file = ja_address_normalizer::config::parse_config("town_cache_ttl_secs = 30").unwrap();
        let config = cli.apply_flags(file);
        assert_eq!(config.api_base, "http://localhost:3000/api/ja");
        assert_eq!(config.town_cache_size, 5);
        assert_eq!(config.town_cache_ttl_secs, 30);
    }

    #[test]
    fn reads_non_blank_lines() {
        let input = "東京都千代田区千代田1-1\n\n  府中市宮西町一丁目1  \n";
        let addresses = read_addresses(input.as_bytes()).unwrap();
        assert_eq!(
            addresses,
            vec!["東京都千代田区千代田1-1", "府中市宮西町一丁目1"]
        );
    }

    #[test]
    fn renders_results_and_errors() {
        let ok = render(
            "東京都",
            Ok(NormalizeResult {
                pref: "東京都".to_string(),
                level: 1,
                ..NormalizeResult::default()
            }),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&ok).unwrap();
        assert_eq!(value["pref"], "東京都");
        assert_eq!(value["level"], 1);
        assert!(value["lat"].is_null());

        let err = render(
            "東京都港区",
            Err(NormalizeError::Gazetteer(
                ja_address_normalizer::gazetteer::GazetteerError::NotFound("東京都/港区".to_string()),
            )),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&err).unwrap();
        assert_eq!(value["input"], "東京都港区");
        assert!(value["error"].as_str().unwrap().contains("港区"));
    }
}
