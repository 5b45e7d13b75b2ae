pub mod api_client;
pub mod cache;
pub mod config;
pub mod db;
pub mod maintenance;
pub mod service;

pub use api_client::WeatherApiClient;
pub use cache::MemoryCache;
pub use service::{CacheTtls, WeatherService};
