#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the Japanese address normalizer.
//!
//! This crate contains only data types, configuration structs, and the
//! serde glue for the gazetteer payloads. It has no I/O and no regex
//! machinery.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Default gazetteer location. Prefecture data lives at `{base}.json`,
/// town lists at `{base}/{pref}/{city}.json`.
pub const DEFAULT_API_BASE: &str = "https://japanese-addresses.geolonia.com/api/ja";

/// Resolution level reached when the residential block/house number was
/// matched.
pub const LEVEL_RESIDENTIAL: u8 = 8;

/// Level used when the caller does not ask for anything specific.
pub const DEFAULT_LEVEL: u8 = 3;

/// Prefecture name mapped to its city names, in gazetteer order.
///
/// The upstream payload is a JSON object; deserialization keeps the
/// object's key order rather than sorting it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefectureTable(Vec<(String, Vec<String>)>);

impl PrefectureTable {
    /// Builds a table from `(prefecture, cities)` pairs.
    #[must_use]
    pub const fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        Self(entries)
    }

    /// Prefecture names in table order.
    pub fn prefectures(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(pref, _)| pref.as_str())
    }

    /// City names for a prefecture, or `None` if the prefecture is unknown.
    #[must_use]
    pub fn cities(&self, pref: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(name, _)| name == pref)
            .map(|(_, cities)| cities.as_slice())
    }

    /// Iterates `(prefecture, cities)` in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(pref, cities)| (pref.as_str(), cities.as_slice()))
    }

    /// Number of prefectures.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the table holds no prefectures.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for PrefectureTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = PrefectureTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping prefecture names to city lists")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(47));
                while let Some((pref, cities)) = map.next_entry::<String, Vec<String>>()? {
                    entries.push((pref, cities));
                }
                Ok(PrefectureTable(entries))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// A town/aza record from the gazetteer.
///
/// `lat` and `lng` are kept as the text the gazetteer supplied; the
/// pipeline parses them when building a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TownRecord {
    /// Town name used for matching. For a derived alias this is the
    /// abbreviated form.
    pub town: String,
    /// Set only on derived aliases: the name of the record the alias was
    /// derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_town: Option<String>,
    /// Sub-area (koaza) code.
    #[serde(default)]
    pub koaza: String,
    /// Latitude as supplied.
    #[serde(default, deserialize_with = "string_or_number")]
    pub lat: String,
    /// Longitude as supplied.
    #[serde(default, deserialize_with = "string_or_number")]
    pub lng: String,
}

impl TownRecord {
    /// The canonical name to report: the original name for aliases,
    /// otherwise the record's own name.
    #[must_use]
    pub fn canonical_name(&self) -> &str {
        self.original_town.as_deref().unwrap_or(&self.town)
    }
}

/// A residential block/house-number record (街区符号・住居番号).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentialRecord {
    /// Block number.
    #[serde(deserialize_with = "string_or_number")]
    pub gaiku: String,
    /// House number.
    #[serde(deserialize_with = "string_or_number")]
    pub jyukyo: String,
    /// Latitude as supplied.
    #[serde(default, deserialize_with = "string_or_number")]
    pub lat: String,
    /// Longitude as supplied.
    #[serde(default, deserialize_with = "string_or_number")]
    pub lng: String,
}

impl ResidentialRecord {
    /// The `gaiku-jyukyo` key matched against residual address text.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}-{}", self.gaiku, self.jyukyo)
    }
}

/// Options for a single normalize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// How far to resolve: 1 prefecture, 2 city, 3 town/aza, anything
    /// above 3 also tries the residential block/house number.
    pub level: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
        }
    }
}

/// The structured outcome of normalizing one address string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeResult {
    /// Prefecture (都道府県), empty when unresolved.
    pub pref: String,
    /// City/ward/town/village (市区町村), empty when unresolved.
    pub city: String,
    /// Town/aza (町丁目), empty when unresolved.
    pub town: String,
    /// Residual address text after the resolved parts.
    pub addr: String,
    /// Residential block number, set only at level 8.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaiku: Option<String>,
    /// Residential house number, set only at level 8.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jyukyo: Option<String>,
    /// Latitude (WGS84) of the most precise resolved level.
    pub lat: Option<f64>,
    /// Longitude (WGS84) of the most precise resolved level.
    pub lng: Option<f64>,
    /// 0 nothing, 1 prefecture, 2 city, 3 town/aza, 8 residential.
    pub level: u8,
}

/// Runtime configuration for the normalizer and its caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Base URI of the gazetteer. `http://`, `https://` and `file://`
    /// are supported.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Maximum number of (prefecture, city) town pattern lists kept in
    /// memory. The same bound applies to residential lists.
    #[serde(default = "default_town_cache_size")]
    pub town_cache_size: usize,

    /// Seconds before a cached town pattern list expires.
    /// Defaults to 7 days.
    #[serde(default = "default_town_cache_ttl_secs")]
    pub town_cache_ttl_secs: u64,

    /// Per-request timeout for HTTP gazetteer fetches.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

const fn default_town_cache_size() -> usize {
    1_000
}

const fn default_town_cache_ttl_secs() -> u64 {
    60 * 60 * 24 * 7 // 7 days
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            town_cache_size: default_town_cache_size(),
            town_cache_ttl_secs: default_town_cache_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Accepts either a JSON string or a JSON number and keeps it as text.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct TextVisitor;

    impl Visitor<'_> for TextVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or a number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(TextVisitor)
}
