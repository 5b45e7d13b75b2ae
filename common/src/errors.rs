use thiserror::Error;

/// Failure classification reported by the weather provider's error body
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("City \"{0}\" not found. Please check the spelling and try again.")]
    CityNotFound(String),

    /// Not-found as reported for a city search rather than a single city.
    #[error("No cities found matching \"{0}\". Please try a different search term.")]
    NoCitiesMatching(String),

    #[error("Invalid API key. Please check your Weather API configuration.")]
    InvalidCredentials,

    #[error("API key has exceeded calls per month quota.")]
    QuotaExceeded,

    #[error("API key has been disabled.")]
    CredentialsDisabled,

    #[error("Weather service is temporarily unavailable. Please try again later.")]
    ServiceUnavailable,

    #[error("{0}")]
    Unknown(String),
}

impl ProviderError {
    /// Map a provider error code to its classification.
    ///
    /// `subject` is the city or search query the request was about; `message`
    /// is the provider's own text, used only for codes we don't recognise.
    pub fn from_code(code: i64, subject: &str, message: Option<String>) -> Self {
        match code {
            1006 => Self::CityNotFound(subject.to_string()),
            2006 => Self::InvalidCredentials,
            2007 => Self::QuotaExceeded,
            2008 => Self::CredentialsDisabled,
            9999 => Self::ServiceUnavailable,
            _ => Self::Unknown(
                message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Failed to fetch weather data".to_string()),
            ),
        }
    }
}

/// Structured error types for the weather core
#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("Weather API key is not configured")]
    Unconfigured,

    #[error("Provider error ({status}): {kind}")]
    Provider { status: u16, kind: ProviderError },

    #[error("Timeout error: {0}")]
    TransportTimeout(String),

    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl WeatherError {
    pub fn provider(status: u16, kind: ProviderError) -> Self {
        Self::Provider { status, kind }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::HttpError {
            status,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::TransportTimeout(message.into())
    }

    /// Status code recorded for this failure in the usage log.
    pub fn status_code(&self) -> u16 {
        match self {
            WeatherError::Provider { status, .. } | WeatherError::HttpError { status, .. } => {
                *status
            }
            WeatherError::TransportTimeout(_) => 504,
            WeatherError::Transport(e) => e.status().map(|s| s.as_u16()).unwrap_or(500),
            WeatherError::Unconfigured
            | WeatherError::ParseError(_)
            | WeatherError::DatabaseError(_) => 500,
        }
    }

    pub fn provider_kind(&self) -> Option<&ProviderError> {
        match self {
            WeatherError::Provider { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// True when the caller asked about a location the provider doesn't know.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.provider_kind(),
            Some(ProviderError::CityNotFound(_) | ProviderError::NoCitiesMatching(_))
        )
    }
}

impl From<sqlx::Error> for WeatherError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_codes_are_classified() {
        assert_eq!(
            ProviderError::from_code(1006, "Zzzzqx", None),
            ProviderError::CityNotFound("Zzzzqx".to_string())
        );
        assert_eq!(
            ProviderError::from_code(2006, "x", None),
            ProviderError::InvalidCredentials
        );
        assert_eq!(
            ProviderError::from_code(2007, "x", None),
            ProviderError::QuotaExceeded
        );
        assert_eq!(
            ProviderError::from_code(2008, "x", None),
            ProviderError::CredentialsDisabled
        );
        assert_eq!(
            ProviderError::from_code(9999, "x", None),
            ProviderError::ServiceUnavailable
        );
    }

    #[test]
    fn unknown_codes_keep_the_provider_message() {
        assert_eq!(
            ProviderError::from_code(1003, "x", Some("Parameter q is missing.".to_string())),
            ProviderError::Unknown("Parameter q is missing.".to_string())
        );
        assert_eq!(
            ProviderError::from_code(1003, "x", Some(String::new())),
            ProviderError::Unknown("Failed to fetch weather data".to_string())
        );
    }

    #[test]
    fn status_codes_for_usage_log() {
        let not_found = WeatherError::provider(400, ProviderError::CityNotFound("Oslo".into()));
        assert_eq!(not_found.status_code(), 400);
        assert!(not_found.is_not_found());

        let no_matches = WeatherError::provider(400, ProviderError::NoCitiesMatching("xq".into()));
        assert!(no_matches.is_not_found());
        assert_eq!(
            no_matches.provider_kind().map(ToString::to_string).as_deref(),
            Some("No cities found matching \"xq\". Please try a different search term.")
        );

        assert_eq!(WeatherError::timeout("slow").status_code(), 504);
        assert_eq!(WeatherError::Unconfigured.status_code(), 500);
        assert!(!WeatherError::Unconfigured.is_not_found());
    }
}
