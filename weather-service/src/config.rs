use common::tracing::LogFormat;
use std::env;
use std::time::Duration;

use crate::service::CacheTtls;

pub struct Config {
    pub weather_api_key: Option<String>,
    pub weather_api_url: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub http_max_retries: u32,
    pub ttls: CacheTtls,
    pub cache_check_period: Duration,
    pub maintenance_interval: Duration,
    pub prefill_cities: Vec<String>,
    pub stats_window_hours: i64,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            weather_api_key: env::var("WEATHER_API_KEY").ok(),
            weather_api_url: env::var("WEATHER_API_URL")
                .unwrap_or_else(|_| "https://api.weatherapi.com/v1".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/weather.db".to_string()),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 5),
            http_max_retries: parsed("HTTP_MAX_RETRIES", 2),
            ttls: CacheTtls {
                forecast_memory: Duration::from_secs(parsed("MEMORY_TTL_SECONDS", 1800)),
                forecast_persistent_minutes: parsed("DB_CACHE_TTL_MINUTES", 60),
                current_memory: Duration::from_secs(parsed("CURRENT_TTL_SECONDS", 900)),
                search_memory: Duration::from_secs(parsed("SEARCH_TTL_SECONDS", 3600)),
            },
            cache_check_period: Duration::from_secs(
                parsed::<u64>("CACHE_CHECK_PERIOD_SECONDS", 600).max(1),
            ),
            maintenance_interval: Duration::from_secs(
                parsed::<u64>("MAINTENANCE_INTERVAL_SECONDS", 3600).max(1),
            ),
            prefill_cities: env::var("PREFILL_CITIES")
                .map(|raw| split_cities(&raw))
                .unwrap_or_default(),
            stats_window_hours: parsed("STATS_WINDOW_HOURS", 24),
            log_format: env::var("LOG_FORMAT")
                .ok()
                .and_then(|f| f.parse().ok())
                .unwrap_or_default(),
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_cities(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|city| !city.is_empty())
        .map(str::to_string)
        .collect()
}
