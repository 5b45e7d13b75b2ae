use common::models::ApiStats;
use sqlx::SqlitePool;
use tracing::{error, instrument};

use super::now_millis;

#[derive(sqlx::FromRow)]
struct ApiStatsRow {
    total_requests: i64,
    avg_response_time: Option<f64>,
    error_count: i64,
}

/// Append-only log of every outbound attempt, cache hits included.
#[derive(Clone)]
pub struct UsageLog {
    pool: SqlitePool,
}

impl UsageLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one usage record. Storage failures are logged, never returned.
    pub async fn record(
        &self,
        endpoint: &str,
        city: Option<&str>,
        response_time_ms: i64,
        status_code: u16,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO api_usage (endpoint, city, timestamp, response_time, status_code)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(endpoint)
        .bind(city)
        .bind(now_millis())
        .bind(response_time_ms)
        .bind(i64::from(status_code))
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            error!(endpoint, error = %e, "Failed to log API usage");
        }
    }

    /// Count, mean latency and error count (status >= 400) over the last `window_hours`.
    #[instrument(skip(self))]
    pub async fn summarize(&self, window_hours: i64) -> Result<ApiStats, sqlx::Error> {
        let since = now_millis().saturating_sub(window_hours.saturating_mul(60 * 60 * 1000));

        let row = sqlx::query_as::<_, ApiStatsRow>(
            r#"
            SELECT
                COUNT(*) AS total_requests,
                AVG(response_time) AS avg_response_time,
                COUNT(CASE WHEN status_code >= 400 THEN 1 END) AS error_count
            FROM api_usage
            WHERE timestamp >= ?
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(ApiStats {
            total_requests: row.total_requests,
            avg_response_time_ms: row.avg_response_time,
            error_count: row.error_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;

    async fn usage_log() -> UsageLog {
        let pool = create_pool("sqlite::memory:", 1)
            .await
            .expect("in-memory database");
        UsageLog::new(pool)
    }

    #[tokio::test]
    async fn empty_window_summarizes_to_zero() {
        let usage = usage_log().await;
        let stats = usage.summarize(24).await.expect("summary");

        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.error_count, 0);
        assert_eq!(stats.avg_response_time_ms, None);
    }

    #[tokio::test]
    async fn summary_counts_errors_and_averages_latency() {
        let usage = usage_log().await;
        usage.record("weather_cache_hit", Some("Oslo"), 2, 200).await;
        usage.record("weather_api_call", Some("Oslo"), 100, 200).await;
        usage.record("weather_api_error", Some("Zzzzqx"), 30, 400).await;
        usage.record("city_search_api_error", None, 28, 500).await;

        let stats = usage.summarize(24).await.expect("summary");

        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.error_count, 2);
        assert_eq!(stats.avg_response_time_ms, Some(40.0));
    }

    #[tokio::test]
    async fn huge_window_covers_everything_without_overflow() {
        let usage = usage_log().await;
        usage.record("weather_api_call", Some("Oslo"), 10, 200).await;

        let stats = usage.summarize(i64::MAX / 1000).await.expect("summary");
        assert_eq!(stats.total_requests, 1);

        let stats = usage.summarize(i64::MAX).await.expect("summary");
        assert_eq!(stats.total_requests, 1);
    }

    #[tokio::test]
    async fn record_swallows_storage_failures() {
        let usage = usage_log().await;
        usage.pool.close().await;

        // Must not panic or surface an error.
        usage.record("weather_api_call", Some("Oslo"), 10, 200).await;
    }
}
