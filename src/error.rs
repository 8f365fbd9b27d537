// =============================================================================
// Fetch error taxonomy
// =============================================================================
//
// `FetchError` describes why a single attempt failed. The executor retries
// every variant; `FetchFailure` is the terminal outcome once the attempt
// budget is spent. An empty chart is not an error at all: it is the
// `SeriesOutcome::Empty` variant returned by the source adapter.
// =============================================================================

use reqwest::StatusCode;

/// Why a single request attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Connection, TLS, timeout or body-read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The response decoded but is structurally unusable (empty array,
    /// missing field, wrong JSON shape).
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl FetchError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Network-level failures that are expected to clear on their own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::InvalidPayload(_) => false,
        }
    }

    /// Short message suitable for showing next to a retry button.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Status { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS => {
                "API rate limit exceeded. Please try again in a few minutes."
            }
            Self::Status { status, .. } if *status == StatusCode::NOT_FOUND => {
                "API endpoint not found."
            }
            Self::Status { status, .. } if status.is_server_error() => {
                "Server error. Please try again later."
            }
            _ => "Unable to load market data.",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidPayload(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// Terminal outcome of a request whose every attempt failed.
#[derive(Debug, thiserror::Error)]
#[error("{label}: all {attempts} attempts failed, last error: {last_error}")]
pub struct FetchFailure {
    pub label: String,
    pub attempts: u32,
    #[source]
    pub last_error: FetchError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let limited = FetchError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        };
        assert!(limited.is_transient());
        assert!(limited.user_message().contains("rate limit"));

        let missing = FetchError::Status {
            status: StatusCode::NOT_FOUND,
            body: "coin not found".into(),
        };
        assert!(!missing.is_transient());
        assert_eq!(missing.user_message(), "API endpoint not found.");

        let upstream = FetchError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        assert!(upstream.is_transient());
        assert!(upstream.user_message().starts_with("Server error"));
    }

    #[test]
    fn failure_display_names_attempts() {
        let failure = FetchFailure {
            label: "ohlc bitcoin/30d".into(),
            attempts: 3,
            last_error: FetchError::invalid("empty array"),
        };
        let text = failure.to_string();
        assert!(text.contains("all 3 attempts failed"));
        assert!(text.contains("empty array"));
    }
}
