use chrono::{DateTime, Utc};
use common::errors::WeatherError;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::info;

use super::{from_millis, now_millis};

#[derive(sqlx::FromRow)]
struct WeatherCacheRow {
    weather_data: String,
    cached_at: i64,
    expires_at: i64,
}

/// A persisted forecast that has not yet expired
#[derive(Debug, Clone, PartialEq)]
pub struct CachedWeather {
    pub payload: Value,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The most recent persisted forecast, regardless of expiry
#[derive(Debug, Clone, PartialEq)]
pub struct StaleWeather {
    pub payload: Value,
    pub cached_at: DateTime<Utc>,
}

/// Durable per-city forecast cache; one row per city, keyed exactly as given.
#[derive(Clone)]
pub struct WeatherCacheStore {
    pool: SqlitePool,
}

impl WeatherCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_fresh(&self, city: &str) -> Result<Option<CachedWeather>, WeatherError> {
        let row = sqlx::query_as::<_, WeatherCacheRow>(
            r#"
            SELECT weather_data, cached_at, expires_at
            FROM weather_cache
            WHERE city = ? AND expires_at > ?
            "#,
        )
        .bind(city)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(CachedWeather {
            payload: serde_json::from_str(&row.weather_data)?,
            cached_at: from_millis(row.cached_at),
            expires_at: from_millis(row.expires_at),
        }))
    }

    /// Fallback read used only when the provider is unreachable.
    pub async fn get_stale(&self, city: &str) -> Result<Option<StaleWeather>, WeatherError> {
        let row = sqlx::query_as::<_, WeatherCacheRow>(
            r#"
            SELECT weather_data, cached_at, expires_at
            FROM weather_cache
            WHERE city = ?
            ORDER BY cached_at DESC
            LIMIT 1
            "#,
        )
        .bind(city)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(StaleWeather {
            payload: serde_json::from_str(&row.weather_data)?,
            cached_at: from_millis(row.cached_at),
        }))
    }

    /// Insert or replace the row for `city` in a single statement.
    pub async fn put(
        &self,
        city: &str,
        payload: &Value,
        ttl_minutes: i64,
    ) -> Result<(), WeatherError> {
        let cached_at = now_millis();
        let expires_at = cached_at.saturating_add(ttl_minutes.saturating_mul(60 * 1000));

        sqlx::query(
            r#"
            INSERT INTO weather_cache (city, weather_data, cached_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (city) DO UPDATE SET
                weather_data = excluded.weather_data,
                cached_at = excluded.cached_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(city)
        .bind(serde_json::to_string(payload)?)
        .bind(cached_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<u64, WeatherError> {
        let result = sqlx::query("DELETE FROM weather_cache WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(&self.pool)
            .await?;

        let purged = result.rows_affected();
        info!(purged, "Cleared expired cache entries");
        Ok(purged)
    }

    pub async fn delete_city(&self, city: &str) -> Result<u64, WeatherError> {
        let result = sqlx::query("DELETE FROM weather_cache WHERE city = ?")
            .bind(city)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<i64, WeatherError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM weather_cache")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
