//! Error type shared by the REST and MQTT paths.

use thiserror::Error;

/// Result type for client operations.
pub type NomikuResult<T> = Result<T, NomikuError>;

/// Error type for every client operation.
///
/// Errors are always returned as values; nothing is retried.
#[derive(Debug, Error)]
pub enum NomikuError {
    /// A caller-supplied argument is missing or invalid. No I/O was performed.
    #[error("Bad parameters: {0}")]
    BadParameters(String),

    /// The operation needs a token and/or user id that is not established yet.
    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    /// Transport-level HTTP failure (DNS, connection refused, TLS, ...).
    #[error("HTTP request failed: {0}")]
    BadHttpRequest(#[from] reqwest::Error),

    /// An HTTP reply arrived with a status other than the expected one.
    #[error("Unexpected HTTP response code: {0}")]
    BadHttpResponseCode(u16),

    /// A reply arrived with the expected status but not the documented shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Connection-level MQTT failure, carrying the stringified client error.
    #[error("MQTT error: {0}")]
    Mqtt(String),

    /// The MQTT round trip did not complete in time.
    #[error("Operation timeout after {0}ms")]
    Timeout(u64),
}

impl NomikuError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadParameters(_) => "BAD_FUNCTION_PARAMETERS",
            Self::AuthenticationRequired(_) => "FAILURE_TO_AUTHENTICATE",
            Self::BadHttpRequest(_) => "BAD_HTTP_REQUEST",
            Self::BadHttpResponseCode(_) => "BAD_HTTP_RESPONSE_CODE",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
            Self::Mqtt(_) => "MQTT_ERROR",
            Self::Timeout(_) => "TIMEOUT",
        }
    }

    /// HTTP status carried by [`NomikuError::BadHttpResponseCode`].
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::BadHttpResponseCode(code) => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn missing(what: &str) -> Self {
        Self::BadParameters(format!("No {} specified!", what))
    }

    pub(crate) fn not_authenticated() -> Self {
        Self::AuthenticationRequired("You must authenticate first!".to_string())
    }
}
