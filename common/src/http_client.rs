use crate::errors::WeatherError;
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// HTTP client with transport-level retries inside a per-call deadline
pub struct HttpClient {
    client: Client,
    max_retries: u32,
}

impl HttpClient {
    pub fn new(max_retries: u32) -> Self {
        Self {
            client: Client::new(),
            max_retries,
        }
    }

    /// Fetch JSON from `url`, giving up once `deadline` has elapsed.
    ///
    /// Transport failures and gateway-style statuses are retried with
    /// exponential backoff; any other non-success response is returned as
    /// `WeatherError::HttpError` carrying the raw body so callers can classify it.
    #[instrument(skip(self, url), fields(endpoint = %redact(url)))]
    pub async fn get_json<T>(&self, url: &str, deadline: Duration) -> Result<T, WeatherError>
    where
        T: serde::de::DeserializeOwned,
    {
        tokio::time::timeout(deadline, self.get_with_retries(url, deadline))
            .await
            .map_err(|_| {
                WeatherError::timeout(format!(
                    "Request to {} timed out after {}ms",
                    redact(url),
                    deadline.as_millis()
                ))
            })?
    }

    async fn get_with_retries<T>(&self, url: &str, deadline: Duration) -> Result<T, WeatherError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut attempt = 0;

        loop {
            match self.fetch(url, deadline).await {
                Ok(response) => {
                    info!(target_url = %redact(url), attempt = attempt + 1, "Request successful");
                    return Ok(response);
                }
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    let backoff = Duration::from_millis(2_u64.pow(attempt) * 100);
                    warn!(
                        target_url = %redact(url),
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis(),
                        error = %e,
                        "Request failed, retrying with exponential backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    if is_retryable(&e) {
                        error!(
                            target_url = %redact(url),
                            attempts = attempt + 1,
                            "All retry attempts exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn fetch<T>(&self, url: &str, deadline: Duration) -> Result<T, WeatherError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .get(url)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WeatherError::timeout(format!("Request to {} timed out", redact(url)))
                } else {
                    WeatherError::Transport(e)
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(WeatherError::Transport)?;

        if !status.is_success() {
            return Err(WeatherError::http(status.as_u16(), text));
        }

        let json: T = serde_json::from_str(&text)?;
        Ok(json)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(2)
    }
}

fn is_retryable(err: &WeatherError) -> bool {
    match err {
        WeatherError::Transport(_) => true,
        WeatherError::HttpError { status, .. } => matches!(*status, 502..=504),
        _ => false,
    }
}

/// Strip the query string so credentials never reach the logs.
pub fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
