use serde::{Deserialize, Serialize};

/// Multi-day forecast document, kept exactly as the provider returned it
pub type ForecastDocument = serde_json::Value;

/// Current-conditions document, kept exactly as the provider returned it
pub type CurrentDocument = serde_json::Value;

/// One entry of a provider city search
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CityMatch {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub url: Option<String>,
}

/// Aggregate of the usage log over a trailing window
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApiStats {
    pub total_requests: i64,
    pub avg_response_time_ms: Option<f64>,
    pub error_count: i64,
}

/// Memory-tier counters
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub keys: usize,
    pub hit_ratio: f64,
}

/// Where a returned document came from
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Memory,
    Database,
    Upstream,
    /// Persistent row served because the provider call failed
    Stale,
}

/// A document tagged with the tier that produced it
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Sourced<T> {
    pub data: T,
    pub source: DataSource,
}

impl<T> Sourced<T> {
    pub fn new(data: T, source: DataSource) -> Self {
        Self { data, source }
    }

    pub fn is_stale(&self) -> bool {
        self.source == DataSource::Stale
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}
