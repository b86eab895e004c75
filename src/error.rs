use thiserror::Error;

/// Type alias for Result with CampaignError
pub type Result<T> = std::result::Result<T, CampaignError>;

/// Error types for the campaign dispatcher
///
/// Setup-phase errors (auth, label, source, config) abort the run;
/// per-recipient errors are recorded in the run report and processing
/// continues.
#[derive(Error, Debug)]
pub enum CampaignError {
    /// Authentication failed - fatal for the run
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Label resolution failed - fatal unless no-label mode
    #[error("Label error: {0}")]
    LabelError(String),

    /// Recipient source could not be read or is malformed - fatal
    #[error("Recipient source error: {0}")]
    SourceError(String),

    /// External content generation failed - recoverable via template fallback
    #[error("Content generation failed: {0}")]
    GenerationError(String),

    /// Send failed permanently for one recipient - recorded, not raised
    #[error("Send failed: {0}")]
    SendError(String),

    /// Rate limit exceeded - transient, retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Server returned 5xx - transient
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Network-related error (connection issues, timeouts) - transient
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Bad request (400) - permanent, e.g. invalid recipient address
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403) - permanent, missing scope or permission
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Sending quota exhausted with no retry window - permanent
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Gmail API returned an error not covered by a more specific variant
    #[error("Mail provider error: {0}")]
    ProviderError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CampaignError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CampaignError::RateLimitExceeded { .. }
                | CampaignError::ServerError { .. }
                | CampaignError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The header is either delay-seconds (e.g. "120") or an HTTP date.
/// Returns seconds to wait, defaulting to 5 when missing or invalid.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    if let Some(retry_after_value) = response.headers().get("retry-after") {
        if let Ok(retry_after_str) = retry_after_value.to_str() {
            if let Ok(seconds) = retry_after_str.parse::<u64>() {
                return seconds;
            }

            if let Ok(http_date) = httpdate::parse_http_date(retry_after_str) {
                let now = std::time::SystemTime::now();
                if let Ok(duration) = http_date.duration_since(now) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

impl From<google_gmail1::Error> for CampaignError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // HTTP response with status code (non-success responses)
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    // Rate limiting - transient
                    429 => {
                        let retry_after = parse_retry_after_header(response);
                        CampaignError::RateLimitExceeded { retry_after }
                    }
                    404 => CampaignError::NotFound("Resource not found".to_string()),
                    400 => CampaignError::BadRequest(message),
                    403 => CampaignError::Forbidden(message),
                    // Server errors - transient
                    500..=599 => CampaignError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => CampaignError::ProviderError(message),
                }
            }
            // Error body from the server. Quota exhaustion arrives here with
            // a reason code rather than a distinct HTTP status
            google_gmail1::Error::BadRequest(ref err) => {
                let reason = err
                    .pointer("/error/errors/0/reason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("");
                match reason {
                    "quotaExceeded" | "dailyLimitExceeded" => {
                        CampaignError::QuotaExceeded(format!("{}", err))
                    }
                    _ => CampaignError::BadRequest(format!("{}", err)),
                }
            }
            // Network/connection errors - transient
            google_gmail1::Error::HttpError(ref err) => {
                CampaignError::NetworkError(format!("Connection error: {}", err))
            }
            // IO errors - transient
            google_gmail1::Error::Io(err) => CampaignError::NetworkError(err.to_string()),
            _ => CampaignError::ProviderError(error.to_string()),
        }
    }
}
