//! Gazetteer access.
//!
//! The normalizer never reads address data directly; it asks a
//! [`GazetteerProvider`] for the prefecture table, the town list of a
//! city, and the residential block/house records of a town. The
//! pattern cache decides when to ask.
//!
//! [`HttpGazetteer`] serves the `japanese-addresses` JSON layout from an
//! `http(s)://` endpoint or a `file://` directory:
//!
//! - `{base}.json`: prefecture table
//! - `{base}/{pref}/{city}.json`: town list
//! - `{base}/{pref}/{city}/{town}.json`: residential records
//!
//! [`StaticGazetteer`] serves data held in memory.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ja_address_normalizer_models::{PrefectureTable, ResidentialRecord, TownRecord};
use reqwest::Url;
use serde::de::DeserializeOwned;

/// Errors from gazetteer fetches.
#[derive(Debug, thiserror::Error)]
pub enum GazetteerError {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// I/O error reading a local resource.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The payload was not the expected JSON shape.
    #[error("Malformed payload at {url}: {source}")]
    Json {
        /// Resource location.
        url: String,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// A required resource does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The configured base could not be turned into resource locations.
    #[error("Invalid gazetteer URI: {0}")]
    InvalidUri(String),

    /// Only `http`, `https` and `file` are supported.
    #[error("Unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
}

/// Source of gazetteer data.
///
/// Implementations may block on network or disk; every call is a
/// potential suspension point of the normalize pipeline.
#[async_trait]
pub trait GazetteerProvider: Send + Sync {
    /// Returns every prefecture with its city names.
    ///
    /// # Errors
    ///
    /// Returns [`GazetteerError`] if the table cannot be fetched or parsed.
    async fn prefectures(&self) -> Result<PrefectureTable, GazetteerError>;

    /// Returns the town/aza records of one city.
    ///
    /// # Errors
    ///
    /// Returns [`GazetteerError`] if the list cannot be fetched or parsed.
    async fn towns(&self, pref: &str, city: &str) -> Result<Vec<TownRecord>, GazetteerError>;

    /// Returns the residential records of one town, longest
    /// `gaiku-jyukyo` key first. Towns without residential addressing
    /// yield an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`GazetteerError`] if the list exists but cannot be
    /// fetched or parsed.
    async fn residentials(
        &self,
        pref: &str,
        city: &str,
        town: &str,
    ) -> Result<Vec<ResidentialRecord>, GazetteerError>;
}

/// Sorts residential records so longer keys are tried first.
pub fn sort_residentials(records: &mut [ResidentialRecord]) {
    records.sort_by_key(|r| std::cmp::Reverse(r.key().chars().count()));
}

/// Gazetteer backed by the `japanese-addresses` JSON API or a local
/// copy of it.
#[derive(Debug, Clone)]
pub struct HttpGazetteer {
    base: Url,
    client: reqwest::Client,
}

impl HttpGazetteer {
    /// Creates a gazetteer rooted at `api_base`.
    ///
    /// # Errors
    ///
    /// Returns [`GazetteerError`] if `api_base` is not a valid URI, uses
    /// an unsupported scheme, or the HTTP client cannot be built.
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, GazetteerError> {
        let base =
            Url::parse(api_base).map_err(|e| GazetteerError::InvalidUri(format!("{api_base}: {e}")))?;

        match base.scheme() {
            "http" | "https" | "file" => {}
            other => return Err(GazetteerError::UnsupportedScheme(other.to_string())),
        }

        let client = reqwest::Client::builder()
            .user_agent("ja-address-normalizer/0.1")
            .timeout(timeout)
            .build()?;

        Ok(Self { base, client })
    }

    /// The base URI this gazetteer reads from.
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// Builds the location of a resource below the base. With no
    /// segments the resource is `{base}.json`; otherwise the segments are
    /// appended as path components and the last one gets `.json`.
    fn resource_url(&self, segments: &[&str]) -> Result<Url, GazetteerError> {
        let mut url = self.base.clone();

        let Some((last, parents)) = segments.split_last() else {
            let path = format!("{}.json", url.path().trim_end_matches('/'));
            url.set_path(&path);
            return Ok(url);
        };

        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| GazetteerError::InvalidUri(self.base.to_string()))?;
            path.pop_if_empty();
            path.extend(parents);
            path.push(&format!("{last}.json"));
        }

        Ok(url)
    }

    /// Fetches and parses a resource. A missing resource is `Ok(None)`.
    async fn fetch<T: DeserializeOwned>(&self, url: &Url) -> Result<Option<T>, GazetteerError> {
        let bytes = match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| GazetteerError::InvalidUri(url.to_string()))?;

                log::debug!("Reading gazetteer file {}", path.display());

                match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                    Err(e) => {
                        return Err(GazetteerError::Io {
                            path: path.display().to_string(),
                            source: e,
                        });
                    }
                }
            }
            _ => {
                log::debug!("Fetching {url}");

                let response = self.client.get(url.clone()).send().await?;

                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !response.status().is_success() {
                    return Err(GazetteerError::HttpStatus {
                        url: url.to_string(),
                        status: response.status().as_u16(),
                    });
                }

                response.bytes().await?.to_vec()
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| GazetteerError::Json {
                url: url.to_string(),
                source: e,
            })
    }

    async fn fetch_required<T: DeserializeOwned>(&self, url: Url) -> Result<T, GazetteerError> {
        self.fetch(&url)
            .await?
            .ok_or_else(|| GazetteerError::NotFound(url.to_string()))
    }
}

#[async_trait]
impl GazetteerProvider for HttpGazetteer {
    async fn prefectures(&self) -> Result<PrefectureTable, GazetteerError> {
        let url = self.resource_url(&[])?;
        log::info!("Loading prefecture table from {url}");
        self.fetch_required(url).await
    }

    async fn towns(&self, pref: &str, city: &str) -> Result<Vec<TownRecord>, GazetteerError> {
        let url = self.resource_url(&[pref, city])?;
        log::info!("Loading towns of {pref}{city}");
        self.fetch_required(url).await
    }

    async fn residentials(
        &self,
        pref: &str,
        city: &str,
        town: &str,
    ) -> Result<Vec<ResidentialRecord>, GazetteerError> {
        let url = self.resource_url(&[pref, city, town])?;
        log::info!("Loading residential records of {pref}{city}{town}");

        let mut records: Vec<ResidentialRecord> = self.fetch(&url).await?.unwrap_or_default();
        sort_residentials(&mut records);
        Ok(records)
    }
}

/// Gazetteer held entirely in memory.
///
/// Missing town lists are reported as [`GazetteerError::NotFound`], the
/// same way [`HttpGazetteer`] reports them; missing residential lists are
/// empty.
#[derive(Debug, Default)]
pub struct StaticGazetteer {
    prefectures: PrefectureTable,
    towns: BTreeMap<(String, String), Vec<TownRecord>>,
    residentials: BTreeMap<(String, String, String), Vec<ResidentialRecord>>,
    fetches: AtomicUsize,
}

impl StaticGazetteer {
    /// Creates a gazetteer from a prefecture table with no towns.
    #[must_use]
    pub fn new(prefectures: PrefectureTable) -> Self {
        Self {
            prefectures,
            ..Self::default()
        }
    }

    /// Registers the town list of `(pref, city)`.
    #[must_use]
    pub fn with_towns(mut self, pref: &str, city: &str, towns: Vec<TownRecord>) -> Self {
        self.towns
            .insert((pref.to_string(), city.to_string()), towns);
        self
    }

    /// Registers the residential records of `(pref, city, town)`.
    #[must_use]
    pub fn with_residentials(
        mut self,
        pref: &str,
        city: &str,
        town: &str,
        mut records: Vec<ResidentialRecord>,
    ) -> Self {
        sort_residentials(&mut records);
        self.residentials.insert(
            (pref.to_string(), city.to_string(), town.to_string()),
            records,
        );
        self
    }

    /// Number of provider calls served so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

#[async_trait]
impl GazetteerProvider for StaticGazetteer {
    async fn prefectures(&self) -> Result<PrefectureTable, GazetteerError> {
        self.record_fetch().await;
        Ok(self.prefectures.clone())
    }

    async fn towns(&self, pref: &str, city: &str) -> Result<Vec<TownRecord>, GazetteerError> {
        self.record_fetch().await;
        self.towns
            .get(&(pref.to_string(), city.to_string()))
            .cloned()
            .ok_or_else(|| GazetteerError::NotFound(format!("{pref}/{city}")))
    }

    async fn residentials(
        &self,
        pref: &str,
        city: &str,
        town: &str,
    ) -> Result<Vec<ResidentialRecord>, GazetteerError> {
        self.record_fetch().await;
        Ok(self
            .residentials
            .get(&(pref.to_string(), city.to_string(), town.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_base(dir: &std::path::Path) -> String {
        Url::from_file_path(dir.join("ja")).unwrap().to_string()
    }

    #[test]
    fn builds_resource_urls() {
        let gazetteer = HttpGazetteer::new(
            "https://example.com/api/ja",
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(gazetteer.base().as_str(), "https://example.com/api/ja");
        assert_eq!(
            gazetteer.resource_url(&[]).unwrap().as_str(),
            "https://example.com/api/ja.json"
        );

        let towns = gazetteer.resource_url(&["東京都", "千代田区"]).unwrap();
        assert!(towns.as_str().starts_with("https://example.com/api/ja/"));
        assert!(towns.as_str().ends_with(".json"));
        assert_eq!(
            towns.path_segments().unwrap().count(),
            4,
            "api, ja, pref, city: {towns}"
        );
    }

    #[test]
    fn rejects_unsupported_schemes() {
        let err = HttpGazetteer::new("ftp://example.com/ja", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, GazetteerError::UnsupportedScheme(s) if s == "ftp"));

        let err = HttpGazetteer::new("not a uri", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, GazetteerError::InvalidUri(_)));
    }

    #[tokio::test]
    async fn reads_local_files() {
        let tmp = std::env::temp_dir().join("ja_address_gazetteer_test_files");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(tmp.join("ja").join("東京都").join("千代田区")).unwrap();

        std::fs::write(tmp.join("ja.json"), r#"{"東京都":["千代田区"]}"#).unwrap();
        std::fs::write(
            tmp.join("ja").join("東京都").join("千代田区.json"),
            r#"[{"town":"千代田","koaza":"","lat":"35.684","lng":"139.754"}]"#,
        )
        .unwrap();
        std::fs::write(
            tmp.join("ja")
                .join("東京都")
                .join("千代田区")
                .join("千代田.json"),
            r#"[{"gaiku":"1","jyukyo":"1","lat":"35.1","lng":"139.1"},
                {"gaiku":"1","jyukyo":"10","lat":"35.2","lng":"139.2"}]"#,
        )
        .unwrap();

        let gazetteer = HttpGazetteer::new(&file_base(&tmp), Duration::from_secs(5)).unwrap();

        let table = gazetteer.prefectures().await.unwrap();
        assert_eq!(table.cities("東京都").unwrap(), &["千代田区".to_string()]);

        let towns = gazetteer.towns("東京都", "千代田区").await.unwrap();
        assert_eq!(towns.len(), 1);
        assert_eq!(towns[0].town, "千代田");

        let residentials = gazetteer
            .residentials("東京都", "千代田区", "千代田")
            .await
            .unwrap();
        assert_eq!(residentials[0].key(), "1-10");
        assert_eq!(residentials[1].key(), "1-1");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn missing_files_are_errors_except_residentials() {
        let tmp = std::env::temp_dir().join("ja_address_gazetteer_test_missing");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let gazetteer = HttpGazetteer::new(&file_base(&tmp), Duration::from_secs(5)).unwrap();

        assert!(matches!(
            gazetteer.towns("東京都", "千代田区").await,
            Err(GazetteerError::NotFound(_))
        ));
        assert!(
            gazetteer
                .residentials("東京都", "千代田区", "千代田")
                .await
                .unwrap()
                .is_empty()
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn malformed_payload_is_reported() {
        let tmp = std::env::temp_dir().join("ja_address_gazetteer_test_malformed");
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        std::fs::write(tmp.join("ja.json"), "[1, 2, 3]").unwrap();

        let gazetteer = HttpGazetteer::new(&file_base(&tmp), Duration::from_secs(5)).unwrap();

        assert!(matches!(
            gazetteer.prefectures().await,
            Err(GazetteerError::Json { .. })
        ));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn static_gazetteer_counts_fetches() {
        let gazetteer = StaticGazetteer::new(PrefectureTable::new(vec![(
            "東京都".to_string(),
            vec!["千代田区".to_string()],
        )]))
        .with_towns("東京都", "千代田区", Vec::new());

        gazetteer.prefectures().await.unwrap();
        gazetteer.towns("東京都", "千代田区").await.unwrap();
        assert!(gazetteer.towns("東京都", "港区").await.is_err());
        assert_eq!(gazetteer.fetch_count(), 3);
    }
}
