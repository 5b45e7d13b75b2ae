//! Tiered weather lookup: memory tier, then persistent tier, then provider,
//! with stale persistent data as the last resort when the provider fails.

use common::errors::WeatherError;
use common::models::{
    ApiStats, CacheStats, CityMatch, CurrentDocument, DataSource, ForecastDocument, Sourced,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::api_client::WeatherApiClient;
use crate::cache::MemoryCache;
use crate::db::{UsageLog, WeatherCacheStore};

pub const WEATHER_CACHE_HIT: &str = "weather_cache_hit";
pub const WEATHER_DB_CACHE_HIT: &str = "weather_db_cache_hit";
pub const WEATHER_API_CALL: &str = "weather_api_call";
pub const WEATHER_STALE_FALLBACK: &str = "weather_stale_fallback";
pub const WEATHER_API_ERROR: &str = "weather_api_error";
pub const CURRENT_WEATHER_CACHE_HIT: &str = "current_weather_cache_hit";
pub const CURRENT_WEATHER_API_CALL: &str = "current_weather_api_call";
pub const CURRENT_WEATHER_API_ERROR: &str = "current_weather_api_error";
pub const CITY_SEARCH_CACHE_HIT: &str = "city_search_cache_hit";
pub const CITY_SEARCH_API_CALL: &str = "city_search_api_call";
pub const CITY_SEARCH_API_ERROR: &str = "city_search_api_error";

pub fn weather_key(city: &str) -> String {
    format!("weather:{}", city.to_lowercase())
}

pub fn current_weather_key(city: &str) -> String {
    format!("current_weather:{}", city.to_lowercase())
}

pub fn search_key(query: &str) -> String {
    format!("search:{}", query.to_lowercase())
}

/// Expiry policy for each kind of cached document
#[derive(Debug, Clone, PartialEq)]
pub struct CacheTtls {
    pub forecast_memory: Duration,
    pub forecast_persistent_minutes: i64,
    pub current_memory: Duration,
    pub search_memory: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            forecast_memory: Duration::from_secs(30 * 60),
            forecast_persistent_minutes: 60,
            current_memory: Duration::from_secs(15 * 60),
            search_memory: Duration::from_secs(60 * 60),
        }
    }
}

/// Outcome of warming a list of cities
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrefillSummary {
    pub warmed: usize,
    pub failed: usize,
}

pub struct WeatherService {
    client: Arc<WeatherApiClient>,
    memory: Arc<MemoryCache>,
    store: WeatherCacheStore,
    usage: UsageLog,
    ttls: CacheTtls,
    stats_window_hours: i64,
}

impl WeatherService {
    pub fn new(
        client: Arc<WeatherApiClient>,
        memory: Arc<MemoryCache>,
        store: WeatherCacheStore,
        usage: UsageLog,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            client,
            memory,
            store,
            usage,
            ttls,
            stats_window_hours: 24,
        }
    }

    pub fn with_stats_window(mut self, hours: i64) -> Self {
        self.stats_window_hours = hours;
        self
    }

    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    pub fn store(&self) -> &WeatherCacheStore {
        &self.store
    }

    /// Forecast for `city`. Pass `use_cache = false` to force a provider call.
    pub async fn get_weather_data(
        &self,
        city: &str,
        use_cache: bool,
    ) -> Result<ForecastDocument, WeatherError> {
        self.get_weather_data_with_source(city, use_cache)
            .await
            .map(Sourced::into_inner)
    }

    /// Same as [`get_weather_data`](Self::get_weather_data), tagged with the tier
    /// that answered so callers can tell stale fallback data apart.
    #[instrument(skip(self), fields(city = %city))]
    pub async fn get_weather_data_with_source(
        &self,
        city: &str,
        use_cache: bool,
    ) -> Result<Sourced<ForecastDocument>, WeatherError> {
        let started = Instant::now();
        let key = weather_key(city);

        if use_cache {
            if let Some(cached) = self.memory.get(&key).await {
                info!(city = %city, "Weather data served from memory cache");
                self.record(WEATHER_CACHE_HIT, city, started, 200).await;
                return Ok(Sourced::new(cached, DataSource::Memory));
            }

            match self.store.get_fresh(city).await {
                Ok(Some(row)) => {
                    info!(city = %city, "Weather data served from database cache");
                    self.memory
                        .set(key, row.payload.clone(), self.ttls.forecast_memory)
                        .await;
                    self.record(WEATHER_DB_CACHE_HIT, city, started, 200).await;
                    return Ok(Sourced::new(row.payload, DataSource::Database));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        city = %city,
                        error = %e,
                        "Database cache lookup failed, treating as miss"
                    );
                }
            }
        }

        info!(city = %city, "Fetching fresh weather data");

        match self.client.fetch_forecast(city).await {
            Ok(forecast) => {
                self.memory
                    .set(key, forecast.clone(), self.ttls.forecast_memory)
                    .await;
                if let Err(e) = self
                    .store
                    .put(city, &forecast, self.ttls.forecast_persistent_minutes)
                    .await
                {
                    warn!(city = %city, error = %e, "Failed to persist weather data");
                }
                self.record(WEATHER_API_CALL, city, started, 200).await;
                Ok(Sourced::new(forecast, DataSource::Upstream))
            }
            Err(upstream) => {
                let status = upstream.status_code();

                match self.store.get_stale(city).await {
                    Ok(Some(stale)) => {
                        warn!(
                            city = %city,
                            error = %upstream,
                            cached_at = %stale.cached_at,
                            "Serving stale weather data due to API error"
                        );
                        self.record(WEATHER_STALE_FALLBACK, city, started, status).await;
                        return Ok(Sourced::new(stale.payload, DataSource::Stale));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(city = %city, error = %e, "Stale cache lookup failed");
                    }
                }

                error!(city = %city, error = %upstream, "Weather API error");
                self.record(WEATHER_API_ERROR, city, started, status).await;
                Err(upstream)
            }
        }
    }

    /// Current conditions, cached in the memory tier only.
    #[instrument(skip(self), fields(city = %city))]
    pub async fn get_current_weather(
        &self,
        city: &str,
        use_cache: bool,
    ) -> Result<CurrentDocument, WeatherError> {
        let started = Instant::now();
        let key = current_weather_key(city);

        if use_cache && let Some(cached) = self.memory.get(&key).await {
            self.record(CURRENT_WEATHER_CACHE_HIT, city, started, 200).await;
            return Ok(cached);
        }

        match self.client.fetch_current(city).await {
            Ok(current) => {
                self.memory
                    .set(key, current.clone(), self.ttls.current_memory)
                    .await;
                self.record(CURRENT_WEATHER_API_CALL, city, started, 200).await;
                Ok(current)
            }
            Err(e) => {
                warn!(city = %city, error = %e, "Current weather API error");
                self.record(CURRENT_WEATHER_API_ERROR, city, started, e.status_code())
                    .await;
                Err(e)
            }
        }
    }

    /// Provider city search, cached in the memory tier only.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn search_cities(&self, query: &str) -> Result<Vec<CityMatch>, WeatherError> {
        let started = Instant::now();
        let key = search_key(query);

        if let Some(cached) = self.memory.get(&key).await {
            match serde_json::from_value::<Vec<CityMatch>>(cached) {
                Ok(matches) => {
                    self.record(CITY_SEARCH_CACHE_HIT, query, started, 200).await;
                    return Ok(matches);
                }
                Err(e) => {
                    warn!(
                        query = %query,
                        error = %e,
                        "Discarding unreadable cached search results"
                    );
                    self.memory.delete(&key).await;
                }
            }
        }

        match self.client.search_cities(query).await {
            Ok(matches) => {
                self.memory
                    .set(key, serde_json::to_value(&matches)?, self.ttls.search_memory)
                    .await;
                self.record(CITY_SEARCH_API_CALL, query, started, 200).await;
                Ok(matches)
            }
            Err(e) => {
                warn!(query = %query, error = %e, "City search API error");
                self.record(CITY_SEARCH_API_ERROR, query, started, e.status_code())
                    .await;
                Err(e)
            }
        }
    }

    /// Drop memory-tier weather entries for one city, or for every city.
    pub async fn clear_weather_cache(&self, city: Option<&str>) -> usize {
        match city {
            Some(city) => {
                let mut removed = 0;
                for key in [weather_key(city), current_weather_key(city)] {
                    if self.memory.delete(&key).await {
                        removed += 1;
                    }
                }
                removed
            }
            // "weather:" also matches every "current_weather:" key.
            None => self.memory.clear_matching("weather:").await,
        }
    }

    /// Delete the persisted row for one city, or purge every expired row.
    pub async fn clear_database_cache(&self, city: Option<&str>) -> u64 {
        let result = match city {
            Some(city) => self.store.delete_city(city).await,
            None => self.store.purge_expired().await,
        };

        result.unwrap_or_else(|e| {
            error!(error = %e, "Failed to clear database cache");
            0
        })
    }

    /// Usage summary over the configured window; `None` if the log is unreadable.
    pub async fn get_api_stats(&self) -> Option<ApiStats> {
        match self.usage.summarize(self.stats_window_hours).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(error = %e, "Failed to get API stats");
                None
            }
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.memory.stats().await
    }

    /// Fetch fresh forecasts for `cities`, refreshing both tiers.
    pub async fn prefill(&self, cities: &[String]) -> PrefillSummary {
        info!(count = cities.len(), "Starting cache prefill");

        let mut summary = PrefillSummary::default();
        for city in cities {
            match self.get_weather_data_with_source(city, false).await {
                Ok(result) if !result.is_stale() => summary.warmed += 1,
                Ok(_) => {
                    warn!(city = %city, "Provider unavailable during prefill, kept stale data");
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(city = %city, error = %e, "Failed to fetch weather during prefill");
                    summary.failed += 1;
                }
            }
        }

        info!(warmed = summary.warmed, failed = summary.failed, "Cache prefill completed");
        summary
    }

    async fn record(&self, endpoint: &str, city: &str, started: Instant, status_code: u16) {
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.usage
            .record(endpoint, Some(city), elapsed_ms, status_code)
            .await;
    }
}
