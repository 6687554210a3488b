//! Pattern and gazetteer caches.
//!
//! Prefecture and city patterns are built once and kept for the life of
//! the [`PatternCache`]. Town patterns and residential lists are far more
//! numerous, so they live in a bounded LRU with a time-to-live. All
//! loads are single-flight: concurrent requests for the same key share
//! one gazetteer fetch and one compilation.

use std::collections::BTreeMap;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use ja_address_normalizer_models::{NormalizerConfig, PrefectureTable, ResidentialRecord};
use lru::LruCache;
use tokio::sync::OnceCell;

use crate::gazetteer::GazetteerProvider;
use crate::patterns::{
    self, CityPattern, PrefecturePattern, SameNamedPattern, TownPattern,
};
use crate::NormalizeError;

/// Bounds for the town and residential caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of cities whose town patterns are kept.
    pub capacity: usize,
    /// How long an entry stays valid after it is loaded.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from(&NormalizerConfig::default())
    }
}

impl From<&NormalizerConfig> for CacheConfig {
    fn from(config: &NormalizerConfig) -> Self {
        Self {
            capacity: config.town_cache_size,
            ttl: Duration::from_secs(config.town_cache_ttl_secs),
        }
    }
}

/// Least-recently-used map whose entries also expire after a fixed TTL.
///
/// A capacity of zero disables caching entirely.
pub struct TimedLru<K: Hash + Eq, V> {
    entries: Option<LruCache<K, (V, Instant)>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TimedLru<K, V> {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
            ttl,
        }
    }

    /// Returns a live entry and marks it as most recently used. Expired
    /// entries are dropped.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let entries = self.entries.as_mut()?;

        let expired = entries
            .peek(key)
            .is_some_and(|(_, inserted_at)| inserted_at.elapsed() >= self.ttl);
        if expired {
            log::trace!("Dropping expired cache entry");
            entries.pop(key);
            return None;
        }

        entries.get(key).map(|(value, _)| value.clone())
    }

    /// Inserts an entry, evicting the least recently used one when full.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(entries) = self.entries.as_mut() {
            entries.put(key, (value, Instant::now()));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        if let Some(entries) = self.entries.as_mut() {
            entries.clear();
        }
    }
}

/// Deduplicates concurrent loads of the same key.
///
/// The first caller runs the load; everyone arriving while it is in
/// flight awaits the same result. Once finished the key is forgotten, so
/// a failed load is retried by the next caller.
pub struct SingleFlight<K, V> {
    inflight: Mutex<BTreeMap<K, Arc<OnceCell<V>>>>,
}

impl<K: Ord + Clone, V: Clone> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<K: Ord + Clone, V: Clone> SingleFlight<K, V> {
    /// Runs `load` for `key` unless a load for it is already running.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `load`.
    pub async fn run<E, F, Fut>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            inflight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell.get_or_try_init(load).await.cloned();

        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if inflight
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            inflight.remove(&key);
        }

        result
    }
}

/// Prefecture-level data, loaded once per cache.
#[derive(Debug)]
pub struct PrefectureData {
    pub table: PrefectureTable,
    pub prefecture_patterns: Vec<PrefecturePattern>,
    pub same_named: Vec<SameNamedPattern>,
}

type TownKey = (String, String);
type ResidentialKey = (String, String, String);

/// Compiled patterns and gazetteer lists, shared across normalizations.
pub struct PatternCache {
    provider: Arc<dyn GazetteerProvider>,
    prefecture_data: Mutex<Option<Arc<PrefectureData>>>,
    prefecture_flight: SingleFlight<(), Arc<PrefectureData>>,
    cities: Mutex<BTreeMap<String, Arc<Vec<CityPattern>>>>,
    towns: Mutex<TimedLru<TownKey, Arc<Vec<TownPattern>>>>,
    town_flight: SingleFlight<TownKey, Arc<Vec<TownPattern>>>,
    residentials: Mutex<TimedLru<ResidentialKey, Arc<Vec<ResidentialRecord>>>>,
    residential_flight: SingleFlight<ResidentialKey, Arc<Vec<ResidentialRecord>>>,
}

impl PatternCache {
    #[must_use]
    pub fn new(provider: Arc<dyn GazetteerProvider>, config: CacheConfig) -> Self {
        Self {
            provider,
            prefecture_data: Mutex::new(None),
            prefecture_flight: SingleFlight::default(),
            cities: Mutex::new(BTreeMap::new()),
            towns: Mutex::new(TimedLru::new(config.capacity, config.ttl)),
            town_flight: SingleFlight::default(),
            residentials: Mutex::new(TimedLru::new(config.capacity, config.ttl)),
            residential_flight: SingleFlight::default(),
        }
    }

    fn cached_prefecture_data(&self) -> Option<Arc<PrefectureData>> {
        self.prefecture_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the prefecture table with its prefecture and same-name
    /// patterns, loading them on first use.
    ///
    /// # Errors
    ///
    /// * If the prefecture table cannot be fetched
    /// * If a pattern fails to compile
    pub async fn prefecture_data(&self) -> Result<Arc<PrefectureData>, NormalizeError> {
        if let Some(data) = self.cached_prefecture_data() {
            return Ok(data);
        }

        self.prefecture_flight
            .run::<NormalizeError, _, _>((), || async {
                if let Some(data) = self.cached_prefecture_data() {
                    return Ok(data);
                }

                log::debug!("Loading prefecture table");
                let table = self.provider.prefectures().await?;
                let prefecture_patterns = patterns::prefecture_patterns(table.prefectures())?;
                let same_named = patterns::same_named_prefecture_city_patterns(&table)?;
                log::debug!(
                    "Loaded {} prefectures, {} same-name city patterns",
                    table.len(),
                    same_named.len()
                );

                let data = Arc::new(PrefectureData {
                    table,
                    prefecture_patterns,
                    same_named,
                });
                *self
                    .prefecture_data
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(data.clone());
                Ok(data)
            })
            .await
    }

    /// Returns the city patterns of one prefecture, compiling them on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn city_patterns(
        &self,
        pref: &str,
        cities: &[String],
    ) -> Result<Arc<Vec<CityPattern>>, NormalizeError> {
        let mut cache = self.cities.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(found) = cache.get(pref) {
            return Ok(found.clone());
        }

        let compiled = Arc::new(patterns::city_patterns(cities)?);
        cache.insert(pref.to_string(), compiled.clone());
        drop(cache);
        Ok(compiled)
    }

    fn cached_towns(&self, key: &TownKey) -> Option<Arc<Vec<TownPattern>>> {
        self.towns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
    }

    /// Returns the town patterns of one city, fetching and compiling them
    /// on a cache miss.
    ///
    /// # Errors
    ///
    /// * If the town list cannot be fetched
    /// * If a pattern fails to compile
    pub async fn town_patterns(
        &self,
        pref: &str,
        city: &str,
    ) -> Result<Arc<Vec<TownPattern>>, NormalizeError> {
        let key = (pref.to_string(), city.to_string());
        if let Some(found) = self.cached_towns(&key) {
            return Ok(found);
        }

        self.town_flight
            .run::<NormalizeError, _, _>(key.clone(), || async {
                if let Some(found) = self.cached_towns(&key) {
                    return Ok(found);
                }

                log::debug!("Loading towns for {pref}{city}");
                let records = self.provider.towns(pref, city).await?;
                let compiled = Arc::new(patterns::town_patterns(city, &records)?);
                log::trace!(
                    "Compiled {} town patterns for {pref}{city}",
                    compiled.len()
                );

                self.towns
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key.clone(), compiled.clone());
                Ok(compiled)
            })
            .await
    }

    fn cached_residentials(&self, key: &ResidentialKey) -> Option<Arc<Vec<ResidentialRecord>>> {
        self.residentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
    }

    /// Returns the residential blocks of one town, longest key first.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be fetched.
    pub async fn residentials(
        &self,
        pref: &str,
        city: &str,
        town: &str,
    ) -> Result<Arc<Vec<ResidentialRecord>>, NormalizeError> {
        let key = (pref.to_string(), city.to_string(), town.to_string());
        if let Some(found) = self.cached_residentials(&key) {
            return Ok(found);
        }

        self.residential_flight
            .run::<NormalizeError, _, _>(key.clone(), || async {
                if let Some(found) = self.cached_residentials(&key) {
                    return Ok(found);
                }

                log::debug!("Loading residential blocks for {pref}{city}{town}");
                let records = Arc::new(self.provider.residentials(pref, city, town).await?);

                self.residentials
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key.clone(), records.clone());
                Ok(records)
            })
            .await
    }

    /// Drops every cached table and pattern.
    pub fn clear(&self) {
        log::debug!("Clearing pattern cache");
        *self
            .prefecture_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.cities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.towns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.residentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gazetteer::StaticGazetteer;
    use ja_address_normalizer_models::TownRecord;

    fn town(name: &str) -> TownRecord {
        TownRecord {
            town: name.to_string(),
            original_town: None,
            koaza: String::new(),
            lat: "35.0".to_string(),
            lng: "139.0".to_string(),
        }
    }

    fn gazetteer() -> Arc<StaticGazetteer> {
        Arc::new(
            StaticGazetteer::new(PrefectureTable::new(vec![(
                "東京都".to_string(),
                vec!["千代田区".to_string(), "中央区".to_string()],
            )]))
            .with_towns("東京都", "千代田区", vec![town("千代田"), town("丸の内一丁目")])
            .with_towns("東京都", "中央区", vec![town("銀座一丁目")]),
        )
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let mut lru = TimedLru::new(2, Duration::from_secs(60));
        lru.insert("a", 1);
        lru.insert("b", 2);
        assert_eq!(lru.get(&"a"), Some(1));

        lru.insert("c", 3);

        assert_eq!(lru.len(), 2);
        assert_eq!(lru.get(&"b"), None);
        assert_eq!(lru.get(&"a"), Some(1));
        assert_eq!(lru.get(&"c"), Some(3));
    }

    #[test]
    fn lru_replaces_existing_key_without_eviction() {
        let mut lru = TimedLru::new(2, Duration::from_secs(60));
        lru.insert("a", 1);
        lru.insert("b", 2);
        lru.insert("a", 10);

        assert_eq!(lru.len(), 2);
        assert_eq!(lru.get(&"a"), Some(10));
        assert_eq!(lru.get(&"b"), Some(2));
    }

    #[test]
    fn lru_entries_expire() {
        let mut lru = TimedLru::new(2, Duration::ZERO);
        lru.insert("a", 1);
        assert_eq!(lru.get(&"a"), None);
        assert!(lru.is_empty());
    }

    #[test]
    fn lru_with_zero_capacity_stores_nothing() {
        let mut lru = TimedLru::new(0, Duration::from_secs(60));
        lru.insert("a", 1);
        assert!(lru.is_empty());
    }

    #[tokio::test]
    async fn single_flight_retries_after_failure() {
        let flight: SingleFlight<&str, u32> = SingleFlight::default();

        let failed: Result<u32, &str> = flight.run("k", || async { Err("boom") }).await;
        assert_eq!(failed, Err("boom"));

        let ok: Result<u32, &str> = flight.run("k", || async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
    }

    #[tokio::test]
    async fn town_patterns_are_cached() {
        let gazetteer = gazetteer();
        let cache = PatternCache::new(gazetteer.clone(), CacheConfig::default());

        let first = cache.town_patterns("東京都", "千代田区").await.unwrap();
        let second = cache.town_patterns("東京都", "千代田区").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(gazetteer.fetch_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_town_loads_share_one_fetch() {
        let gazetteer = gazetteer();
        let cache = PatternCache::new(gazetteer.clone(), CacheConfig::default());

        let results = futures::future::join_all(
            (0..8).map(|_| cache.town_patterns("東京都", "千代田区")),
        )
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(gazetteer.fetch_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_prefecture_loads_share_one_fetch() {
        let gazetteer = gazetteer();
        let cache = PatternCache::new(gazetteer.clone(), CacheConfig::default());

        let results = futures::future::join_all((0..8).map(|_| cache.prefecture_data())).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(gazetteer.fetch_count(), 1);
    }

    #[tokio::test]
    async fn evicted_towns_are_refetched() {
        let gazetteer = gazetteer();
        let config = CacheConfig {
            capacity: 1,
            ttl: Duration::from_secs(60),
        };
        let cache = PatternCache::new(gazetteer.clone(), config);

        cache.town_patterns("東京都", "千代田区").await.unwrap();
        cache.town_patterns("東京都", "中央区").await.unwrap();
        cache.town_patterns("東京都", "千代田区").await.unwrap();

        assert_eq!(gazetteer.fetch_count(), 3);
    }

    #[tokio::test]
    async fn clear_forces_reload() {
        let gazetteer = gazetteer();
        let cache = PatternCache::new(gazetteer.clone(), CacheConfig::default());

        cache.prefecture_data().await.unwrap();
        cache.town_patterns("東京都", "千代田区").await.unwrap();
        cache.clear();
        cache.prefecture_data().await.unwrap();
        cache.town_patterns("東京都", "千代田区").await.unwrap();

        assert_eq!(gazetteer.fetch_count(), 4);
    }

    #[tokio::test]
    async fn missing_towns_are_not_cached() {
        let gazetteer = gazetteer();
        let cache = PatternCache::new(gazetteer.clone(), CacheConfig::default());

        assert!(cache.town_patterns("東京都", "港区").await.is_err());
        assert!(cache.town_patterns("東京都", "港区").await.is_err());

        assert_eq!(gazetteer.fetch_count(), 2);
    }

    #[test]
    fn city_patterns_compile_once_per_prefecture() {
        let cache = PatternCache::new(gazetteer(), CacheConfig::default());
        let cities = vec!["千代田区".to_string()];

        let first = cache.city_patterns("東京都", &cities).unwrap();
        let second = cache.city_patterns("東京都", &[]).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }
}
