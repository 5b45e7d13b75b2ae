use common::errors::{ProviderError, WeatherError};
use common::http_client::HttpClient;
use common::models::{CityMatch, CurrentDocument, ForecastDocument};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Value shipped in the sample `.env`; treated the same as no key at all.
pub const PLACEHOLDER_API_KEY: &str = "your_weatherapi_key_here";

const FORECAST_TIMEOUT: Duration = Duration::from_secs(10);
const CURRENT_TIMEOUT: Duration = Duration::from_secs(8);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(5);
const FORECAST_DAYS: u8 = 5;

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    code: i64,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the WeatherAPI.com forecast, current and search endpoints
pub struct WeatherApiClient {
    http_client: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl WeatherApiClient {
    pub fn new(base_url: String, api_key: Option<String>, max_retries: u32) -> Self {
        let api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty() && key != PLACEHOLDER_API_KEY);

        if api_key.is_none() {
            warn!("Weather API key is missing or still the placeholder; upstream calls will fail");
        }

        Self {
            http_client: HttpClient::new(max_retries),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, WeatherError> {
        self.api_key.as_deref().ok_or(WeatherError::Unconfigured)
    }

    #[instrument(skip(self), fields(city = %city))]
    pub async fn fetch_forecast(&self, city: &str) -> Result<ForecastDocument, WeatherError> {
        let key = self.api_key()?;
        let url = format!(
            "{}/forecast.json?key={}&q={}&days={}&aqi=no&alerts=no",
            self.base_url,
            urlencoding::encode(key),
            urlencoding::encode(city),
            FORECAST_DAYS
        );

        info!(city = %city, "Fetching forecast from API");
        self.get(&url, FORECAST_TIMEOUT, city).await
    }

    #[instrument(skip(self), fields(city = %city))]
    pub async fn fetch_current(&self, city: &str) -> Result<CurrentDocument, WeatherError> {
        let key = self.api_key()?;
        let url = format!(
            "{}/current.json?key={}&q={}&aqi=no",
            self.base_url,
            urlencoding::encode(key),
            urlencoding::encode(city)
        );

        info!(city = %city, "Fetching current conditions from API");
        self.get(&url, CURRENT_TIMEOUT, city).await
    }

    #[instrument(skip(self), fields(query = %query))]
    pub async fn search_cities(&self, query: &str) -> Result<Vec<CityMatch>, WeatherError> {
        let key = self.api_key()?;
        let url = format!(
            "{}/search.json?key={}&q={}",
            self.base_url,
            urlencoding::encode(key),
            urlencoding::encode(query)
        );

        info!(query = %query, "Searching cities via API");
        self.get(&url, SEARCH_TIMEOUT, query)
            .await
            .map_err(|e| match e {
                WeatherError::Provider {
                    status,
                    kind: ProviderError::CityNotFound(query),
                } => WeatherError::provider(status, ProviderError::NoCitiesMatching(query)),
                other => other,
            })
    }

    async fn get<T>(&self, url: &str, deadline: Duration, subject: &str) -> Result<T, WeatherError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.http_client
            .get_json(url, deadline)
            .await
            .map_err(|e| classify(e, subject))
    }
}

/// Turn a raw non-success response into the provider's failure classification.
fn classify(err: WeatherError, subject: &str) -> WeatherError {
    let (status, message) = match err {
        WeatherError::HttpError { status, message } => (status, message),
        other => return other,
    };

    let kind = match serde_json::from_str::<ProviderErrorBody>(&message) {
        Ok(body) => ProviderError::from_code(body.error.code, subject, body.error.message),
        Err(_) => ProviderError::Unknown(format!(
            "Failed to fetch weather data (HTTP {status}). Please try again later."
        )),
    };

    warn!(status, subject, error = %kind, "Weather provider returned an error");
    WeatherError::provider(status, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    fn client(server: &MockServer) -> WeatherApiClient {
        WeatherApiClient::new(format!("{}/v1", server.uri()), Some("test-key".to_string()), 0)
    }

    #[test]
    fn placeholder_and_blank_keys_are_unconfigured() {
        let base = "http://localhost".to_string();
        assert!(!WeatherApiClient::new(base.clone(), None, 0).is_configured());
        assert!(!WeatherApiClient::new(base.clone(), Some("  ".into()), 0).is_configured());
        let placeholder = Some(PLACEHOLDER_API_KEY.to_string());
        assert!(!WeatherApiClient::new(base.clone(), placeholder, 0).is_configured());
        assert!(WeatherApiClient::new(base, Some("abc".into()), 0).is_configured());
    }

    #[test]
    fn classify_reads_provider_error_body() {
        let body = json!({ "error": { "code": 2007, "message": "quota" } }).to_string();
        let err = classify(WeatherError::http(403, body), "Oslo");

        assert_eq!(err.provider_kind(), Some(&ProviderError::QuotaExceeded));
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn classify_without_provider_body_is_unknown() {
        let err = classify(WeatherError::http(502, "<html>bad gateway</html>"), "Oslo");
        assert!(matches!(err.provider_kind(), Some(ProviderError::Unknown(_))));

        let passthrough = classify(WeatherError::timeout("slow"), "Oslo");
        assert!(matches!(passthrough, WeatherError::TransportTimeout(_)));
    }

    #[tokio::test]
    async fn forecast_sends_expected_parameters() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/forecast.json"))
            .and(query_param("key", "test-key"))
            .and(query_param("q", "New York"))
            .and(query_param("days", "5"))
            .and(query_param("aqi", "no"))
            .and(query_param("alerts", "no"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "location": { "name": "New York" },
                "forecast": { "forecastday": [] }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let forecast = client(&mock_server)
            .fetch_forecast("New York")
            .await
            .expect("forecast");

        assert_eq!(forecast["location"]["name"], "New York");
    }

    #[tokio::test]
    async fn unknown_city_is_classified_as_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/current.json"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 1006, "message": "No matching location found." }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = client(&mock_server)
            .fetch_current("Zzzzqx")
            .await
            .expect_err("unknown city");

        assert_eq!(
            err.provider_kind(),
            Some(&ProviderError::CityNotFound("Zzzzqx".to_string()))
        );
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn search_parses_city_matches_in_order() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/search.json"))
            .and(query_param("q", "lon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "name": "London", "region": "City of London", "country": "United Kingdom", "lat": 51.52, "lon": -0.11, "url": "london-city-of-london-greater-london-united-kingdom" },
                { "id": 2, "name": "Londrina", "region": "Parana", "country": "Brazil", "lat": -23.3, "lon": -51.15 }
            ])))
            .mount(&mock_server)
            .await;

        let matches = client(&mock_server).search_cities("lon").await.expect("search");

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].name, "London");
        assert_eq!(matches[1].country, "Brazil");
        assert_eq!(matches[1].url, None);
    }

    #[tokio::test]
    async fn search_without_matches_reports_the_query() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/search.json"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 1006, "message": "No matching location found." }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = client(&mock_server)
            .search_cities("lon")
            .await
            .expect_err("no matches");

        assert!(err.is_not_found());
        assert_eq!(
            err.provider_kind(),
            Some(&ProviderError::NoCitiesMatching("lon".to_string()))
        );
        assert!(err.to_string().contains("No cities found matching \"lon\""));
    }

    #[tokio::test]
    async fn unconfigured_client_never_touches_the_network() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = WeatherApiClient::new(format!("{}/v1", mock_server.uri()), None, 0);

        assert!(matches!(
            client.fetch_forecast("Oslo").await,
            Err(WeatherError::Unconfigured)
        ));
        assert!(matches!(
            client.search_cities("Os").await,
            Err(WeatherError::Unconfigured)
        ));
    }
}
