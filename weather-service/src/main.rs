use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weather_service::config::Config;
use weather_service::db::{self, UsageLog, WeatherCacheStore};
use weather_service::{MemoryCache, WeatherApiClient, WeatherService, maintenance};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    common::tracing::init(config.log_format);

    let cancellation_token = CancellationToken::new();
    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;

    let memory = Arc::new(MemoryCache::new());
    let sweeper = memory
        .clone()
        .spawn_sweeper(config.cache_check_period, cancellation_token.clone());

    let client = Arc::new(WeatherApiClient::new(
        config.weather_api_url.clone(),
        config.weather_api_key.clone(),
        config.http_max_retries,
    ));
    let service = Arc::new(
        WeatherService::new(
            client,
            memory,
            WeatherCacheStore::new(pool.clone()),
            UsageLog::new(pool.clone()),
            config.ttls.clone(),
        )
        .with_stats_window(config.stats_window_hours),
    );

    if !config.prefill_cities.is_empty() {
        info!("Prefilling weather cache on startup...");
        service.prefill(&config.prefill_cities).await;
    }

    let upkeep = maintenance::spawn(
        service.clone(),
        config.maintenance_interval,
        config.prefill_cities.clone(),
        cancellation_token.clone(),
    );

    info!(database = %config.database_url, "Weather cache service started");

    shutdown_signal(cancellation_token).await;

    for task in [sweeper, upkeep] {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }
    pool.close().await;

    info!("Weather cache service stopped");
    Ok(())
}

async fn shutdown_signal(cancellation_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }

    // Stop sweepers and the maintenance loop
    cancellation_token.cancel();
    warn!("Cancelled background tasks, shutting down gracefully...");
}
