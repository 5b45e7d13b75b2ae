use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};

use crate::service::WeatherService;

/// Periodic upkeep: purge expired persistent rows, refresh warm cities and
/// report usage. Stops when `cancel` fires.
pub fn spawn(
    service: Arc<WeatherService>,
    interval: Duration,
    warm_cities: Vec<String>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; startup already warmed the caches.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_once(&service, &warm_cities).await;
                    }
                    _ = cancel.cancelled() => {
                        debug!("Maintenance loop stopped");
                        break;
                    }
                }
            }
        }
        .instrument(info_span!("maintenance")),
    )
}

/// One maintenance pass.
pub async fn run_once(service: &WeatherService, warm_cities: &[String]) {
    let purged = service.clear_database_cache(None).await;

    if !warm_cities.is_empty() {
        service.prefill(warm_cities).await;
    }

    let cache = service.cache_stats().await;
    match service.get_api_stats().await {
        Some(api) => info!(
            purged,
            total_requests = api.total_requests,
            avg_response_time_ms = api.avg_response_time_ms.unwrap_or_default(),
            error_count = api.error_count,
            cache_hits = cache.hits,
            cache_misses = cache.misses,
            cache_keys = cache.keys,
            "Maintenance pass completed"
        ),
        None => info!(
            purged,
            cache_hits = cache.hits,
            cache_misses = cache.misses,
            cache_keys = cache.keys,
            "Maintenance pass completed without usage stats"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::WeatherApiClient;
    use crate::cache::MemoryCache;
    use crate::db::{UsageLog, WeatherCacheStore, create_pool};
    use crate::service::{CacheTtls, weather_key};
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    async fn service_for(mock_server: &MockServer) -> Arc<WeatherService> {
        let pool = create_pool("sqlite::memory:", 1)
            .await
            .expect("in-memory database");
        let client = WeatherApiClient::new(
            format!("{}/v1", mock_server.uri()),
            Some("test-key".to_string()),
            0,
        );

        Arc::new(WeatherService::new(
            Arc::new(client),
            Arc::new(MemoryCache::new()),
            WeatherCacheStore::new(pool.clone()),
            UsageLog::new(pool),
            CacheTtls::default(),
        ))
    }

    async fn mount_oslo(mock_server: &MockServer, calls: impl Into<wiremock::Times>) {
        Mock::given(method("GET"))
            .and(path("/v1/forecast.json"))
            .and(query_param("q", "Oslo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "temp": 5 })))
            .expect(calls)
            .mount(mock_server)
            .await;
    }

    #[tokio::test]
    async fn pass_purges_expired_rows_and_refreshes_warm_cities() {
        let mock_server = MockServer::start().await;
        mount_oslo(&mock_server, 1u64).await;
        let service = service_for(&mock_server).await;

        service.store().put("Old", &json!({}), 0).await.expect("seed");
        service.store().put("Oslo", &json!({ "temp": -1 }), 0).await.expect("seed");

        run_once(&service, &["Oslo".to_string()]).await;

        assert_eq!(service.store().count().await.expect("count"), 1);
        let row = service
            .store()
            .get_fresh("Oslo")
            .await
            .expect("query")
            .expect("refreshed row");
        assert_eq!(row.payload, json!({ "temp": 5 }));
        assert_eq!(
            service.memory().get(&weather_key("Oslo")).await,
            Some(json!({ "temp": 5 }))
        );
    }

    #[tokio::test]
    async fn pass_without_warm_cities_only_purges() {
        let mock_server = MockServer::start().await;
        mount_oslo(&mock_server, 0u64).await;
        let service = service_for(&mock_server).await;

        service.store().put("Old", &json!({}), 0).await.expect("seed");

        run_once(&service, &[]).await;

        assert_eq!(service.store().count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn loop_runs_passes_until_cancelled() {
        let mock_server = MockServer::start().await;
        mount_oslo(&mock_server, 1u64..).await;
        let service = service_for(&mock_server).await;

        let cancel = CancellationToken::new();
        let handle = spawn(
            service.clone(),
            Duration::from_millis(50),
            vec!["Oslo".to_string()],
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop stops after cancellation")
            .expect("loop task exits cleanly");
        assert!(service.store().get_fresh("Oslo").await.expect("query").is_some());
    }

    #[tokio::test]
    async fn cancellation_stops_an_idle_loop_promptly() {
        let mock_server = MockServer::start().await;
        mount_oslo(&mock_server, 0u64).await;
        let service = service_for(&mock_server).await;

        let cancel = CancellationToken::new();
        let handle = spawn(
            service,
            Duration::from_secs(3600),
            vec!["Oslo".to_string()],
            cancel.clone(),
        );

        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop stops after cancellation")
            .expect("loop task exits cleanly");
    }
}
