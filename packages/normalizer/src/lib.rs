#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Japanese address normalizer.
//!
//! Turns free-form address strings (typed, copied, or OCR'd) into
//! prefecture / city / town / residual form by matching against the
//! `japanese-addresses` gazetteer:
//!
//! 1. **Pre-normalization**: width, whitespace and dash cleanup
//!    ([`normalize::prenormalize`]).
//! 2. **Prefecture**: explicit, or recovered from the city name when
//!    omitted. Cities found in several prefectures (`府中市`) are told
//!    apart by which one has a matching town.
//! 3. **City**, then **town**, each by the first matching pattern from
//!    the [`cache::PatternCache`].
//! 4. **Residual**: block/house numbers rewritten to `N-M`
//!    ([`normalize::postprocess_residual`]), then matched against
//!    residential block records when requested.
//!
//! A stage that finds nothing is not an error; the result's `level`
//! reports how far resolution got. Only gazetteer failures are errors.

pub mod cache;
pub mod config;
pub mod dict;
pub mod gazetteer;
pub mod normalize;
pub mod numeral;
pub mod patch;
pub mod patterns;

use std::sync::Arc;
use std::time::Duration;

use ja_address_normalizer_models::{
    LEVEL_RESIDENTIAL, NormalizeOptions, NormalizeResult, NormalizerConfig, PrefectureTable,
    ResidentialRecord,
};
use regex::NoExpand;
use thiserror::Error;

use crate::cache::{CacheConfig, PatternCache};
use crate::gazetteer::{GazetteerError, GazetteerProvider, HttpGazetteer};
use crate::normalize::BlockNumbers;
use crate::patterns::MatchPattern;

/// Errors from normalization.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Gazetteer data could not be loaded.
    #[error("Gazetteer error: {0}")]
    Gazetteer(#[from] GazetteerError),

    /// A generated pattern failed to compile.
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

/// A town resolved from the start of an address remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TownMatch {
    /// Canonical town name (the full name when an alias matched).
    pub town: String,
    /// Text after the town, with held-aside block numbers restored.
    pub addr: String,
    /// Town latitude as written in the gazetteer.
    pub lat: String,
    /// Town longitude as written in the gazetteer.
    pub lng: String,
}

struct CityCandidate {
    pref: String,
    city: String,
    rest: String,
}

/// Address normalizer over a gazetteer provider.
///
/// Cheap to share: wrap in an [`Arc`] and call [`Normalizer::normalize`]
/// from as many tasks as needed.
pub struct Normalizer {
    cache: PatternCache,
}

impl Normalizer {
    #[must_use]
    pub fn new(provider: Arc<dyn GazetteerProvider>, config: CacheConfig) -> Self {
        Self {
            cache: PatternCache::new(provider, config),
        }
    }

    /// Builds a normalizer over the HTTP or `file://` gazetteer named in
    /// `config`.
    ///
    /// # Errors
    ///
    /// * If the gazetteer URI is invalid or uses an unsupported scheme
    /// * If the HTTP client fails to build
    pub fn from_config(config: &NormalizerConfig) -> Result<Self, NormalizeError> {
        let provider = HttpGazetteer::new(
            &config.api_base,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(Arc::new(provider), CacheConfig::from(config)))
    }

    /// The pattern cache behind this normalizer, e.g. to `clear()` it
    /// after the gazetteer data changes.
    #[must_use]
    pub const fn cache(&self) -> &PatternCache {
        &self.cache
    }

    /// Normalizes one address.
    ///
    /// # Errors
    ///
    /// * If gazetteer data needed by a stage cannot be fetched
    /// * If a generated pattern fails to compile
    pub async fn normalize(
        &self,
        input: &str,
        options: NormalizeOptions,
    ) -> Result<NormalizeResult, NormalizeError> {
        let mut addr = normalize::prenormalize(input);
        log::trace!("Prenormalized {input:?} to {addr:?}");

        let data = self.cache.prefecture_data().await?;

        if let Some(same_named) = data.same_named.iter().find(|p| p.pattern.is_match(&addr)) {
            log::debug!("Restoring omitted prefecture: {}", same_named.entity);
            addr = same_named
                .pattern
                .replace(&addr, NoExpand(&same_named.entity))
                .into_owned();
        }

        let mut pref = String::new();
        if let Some((name, end)) = first_match(&data.prefecture_patterns, &addr) {
            pref.clone_from(name);
            addr = addr[end..].to_string();
        } else {
            addr = addr.trim().to_string();
            if let Some(recovered) = self.recover_prefecture(&data.table, &addr).await? {
                log::debug!("Recovered omitted prefecture {recovered}");
                pref = recovered;
            }
        }

        let mut city = String::new();
        if !pref.is_empty() && options.level >= 2 {
            let cities = data.table.cities(&pref).unwrap_or_default();
            let patterns = self.cache.city_patterns(&pref, cities)?;
            addr = addr.trim().to_string();
            if let Some((name, end)) = first_match(&patterns, &addr) {
                city.clone_from(name);
                addr = addr[end..].to_string();
            }
        }

        let mut town = String::new();
        let mut coordinates = (None, None);
        if !city.is_empty() && options.level >= 3 {
            if let Some(found) = self.try_resolve_town(&addr, &pref, &city).await? {
                coordinates = parse_coordinates(&found.lat, &found.lng);
                town = found.town;
                addr = found.addr;
            }
            addr = normalize::postprocess_residual(&addr);
        }

        addr = patch::patch_addr(&pref, &city, &town, &addr);

        let mut level: u8 = [&pref, &city, &town]
            .iter()
            .filter(|s| !s.is_empty())
            .count()
            .try_into()
            .unwrap_or(0);

        let mut result = NormalizeResult {
            lat: coordinates.0,
            lng: coordinates.1,
            ..NormalizeResult::default()
        };

        if options.level > 3 && !town.is_empty() {
            let records = self.cache.residentials(&pref, &city, &town).await?;
            if let Some((record, rest)) = match_residential(&records, &addr) {
                log::trace!("Matched residential block {}", record.key());
                (result.lat, result.lng) = parse_coordinates(&record.lat, &record.lng);
                result.gaiku = Some(record.gaiku.clone());
                result.jyukyo = Some(record.jyukyo.clone());
                addr = rest.to_string();
                level = LEVEL_RESIDENTIAL;
            }
        }

        log::debug!("Normalized {input:?} to level {level}: {pref}{city}{town} {addr:?}");

        Ok(NormalizeResult {
            pref,
            city,
            town,
            addr,
            level,
            ..result
        })
    }

    /// Matches a town at the start of `addr` within `(pref, city)`.
    ///
    /// A leading `大字` is dropped first, and block/house numbers are held
    /// aside so a town name cannot run into them. If nothing matches with
    /// the numbers held aside, the untouched text is tried once more.
    ///
    /// # Errors
    ///
    /// * If the town list cannot be fetched
    /// * If a pattern fails to compile
    pub async fn try_resolve_town(
        &self,
        addr: &str,
        pref: &str,
        city: &str,
    ) -> Result<Option<TownMatch>, NormalizeError> {
        let addr = addr.trim();
        let addr = addr.strip_prefix("大字").unwrap_or(addr);
        let patterns = self.cache.town_patterns(pref, city).await?;

        let (held_text, held) = BlockNumbers::hold_aside(addr);
        if let Some((record, end)) = first_match(&patterns, &held_text) {
            return Ok(Some(TownMatch {
                town: record.canonical_name().to_string(),
                addr: held.restore(&held_text[end..]),
                lat: record.lat.clone(),
                lng: record.lng.clone(),
            }));
        }

        if held.is_empty() {
            return Ok(None);
        }

        Ok(first_match(&patterns, addr).map(|(record, end)| TownMatch {
            town: record.canonical_name().to_string(),
            addr: addr[end..].to_string(),
            lat: record.lat.clone(),
            lng: record.lng.clone(),
        }))
    }

    /// Finds the prefecture of an address that starts with a city name.
    ///
    /// Every city of every prefecture is tried. A single hit decides the
    /// prefecture; with several, the first candidate whose remainder also
    /// resolves to a town wins.
    async fn recover_prefecture(
        &self,
        table: &PrefectureTable,
        addr: &str,
    ) -> Result<Option<String>, NormalizeError> {
        let mut candidates = Vec::new();
        for (pref, cities) in table.iter() {
            let patterns = self.cache.city_patterns(pref, cities)?;
            for pattern in patterns.iter() {
                if let Some(m) = pattern.pattern.find(addr) {
                    candidates.push(CityCandidate {
                        pref: pref.to_string(),
                        city: pattern.entity.clone(),
                        rest: addr[m.end()..].to_string(),
                    });
                }
            }
        }

        match candidates.len() {
            0 => Ok(None),
            1 => Ok(candidates.pop().map(|c| c.pref)),
            n => {
                log::debug!("{n} prefectures have a city matching {addr:?}");
                for candidate in candidates {
                    if self
                        .try_resolve_town(&candidate.rest, &candidate.pref, &candidate.city)
                        .await?
                        .is_some()
                    {
                        return Ok(Some(candidate.pref));
                    }
                }
                Ok(None)
            }
        }
    }
}

/// Returns the entity of the first pattern matching `text` and the byte
/// offset where its match ends.
fn first_match<'a, T>(patterns: &'a [MatchPattern<T>], text: &str) -> Option<(&'a T, usize)> {
    patterns
        .iter()
        .find_map(|p| p.pattern.find(text).map(|m| (&p.entity, m.end())))
}

/// Finds the first record whose `gaiku-jyukyo` key starts `addr` and is
/// not followed by another digit. Returns the record and the trimmed
/// remainder.
fn match_residential<'a, 'b>(
    records: &'a [ResidentialRecord],
    addr: &'b str,
) -> Option<(&'a ResidentialRecord, &'b str)> {
    records.iter().find_map(|record| {
        let rest = addr.strip_prefix(record.key().as_str())?;
        if rest.starts_with(|c: char| c.is_ascii_digit()) {
            None
        } else {
            Some((record, rest.trim()))
        }
    })
}

/// Both coordinates when both parse, otherwise neither.
fn parse_coordinates(lat: &str, lng: &str) -> (Option<f64>, Option<f64>) {
    match (lat.trim().parse::<f64>(), lng.trim().parse::<f64>()) {
        (Ok(lat), Ok(lng)) => (Some(lat), Some(lng)),
        _ => (None, None),
    }
}
