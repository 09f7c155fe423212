// Error handling module
// Classified errors returned by the request pipeline

use serde_json::Value;
use thiserror::Error;

/// Status reported for connectivity failures (no HTTP exchange happened)
pub const NETWORK_ERROR_STATUS: u16 = 0;

/// Status reported when an attempt exceeds its deadline
pub const TIMEOUT_STATUS: u16 = 408;

/// Status reported for failures that fit no other category
pub const UNKNOWN_ERROR_STATUS: u16 = 500;

/// Terminal failure value of the request pipeline.
///
/// Callers match on the variant instead of inspecting message text. Once
/// returned by [`crate::http_client::ApiClient::execute`] the error is final:
/// retries have either been exhausted or were not allowed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Connectivity failure before any response arrived
    #[error("Network error: {message}")]
    Network { message: String },

    /// The attempt did not finish before its deadline
    #[error("Request timed out: {message}")]
    Timeout { message: String },

    /// Well-formed non-2xx response from the backend
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        code: Option<String>,
        details: Option<Value>,
    },

    /// Successful status but the body was not valid JSON
    #[error("Invalid response body (HTTP {status}): {message}")]
    Parse { status: u16, message: String },

    /// Anything else
    #[error("Unexpected error: {message}")]
    Unknown { message: String },
}

impl ApiError {
    /// Numeric status carried by the error
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Network { .. } => NETWORK_ERROR_STATUS,
            ApiError::Timeout { .. } => TIMEOUT_STATUS,
            ApiError::Http { status, .. } | ApiError::Parse { status, .. } => *status,
            ApiError::Unknown { .. } => UNKNOWN_ERROR_STATUS,
        }
    }

    /// Human readable message
    pub fn message(&self) -> &str {
        match self {
            ApiError::Network { message }
            | ApiError::Timeout { message }
            | ApiError::Http { message, .. }
            | ApiError::Parse { message, .. }
            | ApiError::Unknown { message } => message,
        }
    }

    /// Machine code: the backend-supplied code for HTTP errors when present,
    /// otherwise the classification name.
    pub fn code(&self) -> String {
        match self {
            ApiError::Network { .. } => "NETWORK_ERROR".to_string(),
            ApiError::Timeout { .. } => "TIMEOUT".to_string(),
            ApiError::Parse { .. } => "PARSE_ERROR".to_string(),
            ApiError::Unknown { .. } => "UNKNOWN_ERROR".to_string(),
            ApiError::Http { status, code, .. } => {
                code.clone().unwrap_or_else(|| format!("HTTP_{}", status))
            }
        }
    }

    /// Extra details from the backend error payload
    pub fn details(&self) -> Option<&Value> {
        match self {
            ApiError::Http { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Whether another attempt may be made.
    ///
    /// Client errors (HTTP 4xx responses) are final, and so is an unreadable
    /// success body since the backend already handled the request. Timeouts
    /// carry 408 but are transient and stay retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Http { status, .. } => !(400..500).contains(status),
            ApiError::Parse { .. } => false,
            _ => true,
        }
    }

    /// Copy suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network { .. } => {
                "Unable to reach the server. Please check your connection.".to_string()
            }
            ApiError::Timeout { .. } => "The server took too long to respond.".to_string(),
            ApiError::Http { status: 401, .. } => "Invalid credentials.".to_string(),
            other => other.message().to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout {
                message: e.to_string(),
            }
        } else if e.is_connect() || e.is_request() || e.is_body() || e.is_redirect() {
            ApiError::Network {
                message: e.to_string(),
            }
        } else {
            ApiError::Unknown {
                message: e.to_string(),
            }
        }
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
