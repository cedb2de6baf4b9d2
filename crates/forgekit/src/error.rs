//! Error types for forge API calls.
//!
//! Errors are categorized so that the engine can tell a rate limit (retry)
//! from a rejected request (fail) from a vanished object (drop on refresh).

use declarative::ApiError;
use std::fmt;
use std::time::Duration;

/// Result type alias for forge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of forge errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection failure, timeout or server error (transient, retryable).
    Network,
    /// Primary or secondary rate limit (transient, retryable).
    RateLimit,
    /// The object does not exist.
    NotFound,
    /// Bad or under-scoped token.
    Auth,
    /// Validation failure or conflict.
    Rejected,
    /// Unparseable response or local encoding failure.
    Format,
    /// Resource type this provider does not manage.
    Unsupported,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimit)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::RateLimit => "API rate limit exceeded",
            Self::NotFound => "Remote object not found",
            Self::Auth => "Authentication or permission failure",
            Self::Rejected => "Request rejected",
            Self::Format => "Invalid response or payload",
            Self::Unsupported => "Unsupported resource type",
        }
    }

}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to GitHub or GitLab.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Non-2xx response.
    #[error("HTTP {status} for {path}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Request path.
        path: String,
        /// Message extracted from the response body.
        message: String,
        /// Server-provided `Retry-After`.
        retry_after: Option<Duration>,
        /// The rate limit quota is exhausted.
        rate_limited: bool,
    },

    /// Connection could not be established or was dropped.
    #[error("network error: {0}")]
    Network(String),

    /// The call exceeded the agent timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Invalid response from API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// A required property was not declared.
    #[error("{resource} is missing property '{property}'")]
    MissingProperty {
        /// Resource type.
        resource: String,
        /// Property name.
        property: String,
    },

    /// Secret could not be sealed.
    #[error("secret encryption failed: {0}")]
    Encryption(String),

    /// Resource type not managed by this provider.
    #[error("unsupported resource type: {0}")]
    UnsupportedType(String),
}

impl Error {
    /// Create an HTTP error without rate limit metadata.
    pub fn http(status: u16, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            path: path.into(),
            message: message.into(),
            retry_after: None,
            rate_limited: false,
        }
    }

    pub fn missing(resource: impl Into<String>, property: impl Into<String>) -> Self {
        Self::MissingProperty {
            resource: resource.into(),
            property: property.into(),
        }
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http {
                status,
                retry_after,
                rate_limited,
                ..
            } => match status {
                404 | 410 => ErrorCategory::NotFound,
                429 => ErrorCategory::RateLimit,
                403 if *rate_limited || retry_after.is_some() => ErrorCategory::RateLimit,
                401 | 403 => ErrorCategory::Auth,
                408 | 500..=599 => ErrorCategory::Network,
                _ => ErrorCategory::Rejected,
            },
            Self::Network(_) | Self::Timeout(_) => ErrorCategory::Network,
            Self::InvalidResponse(_) | Self::Encryption(_) => ErrorCategory::Format,
            Self::MissingProperty { .. } => ErrorCategory::Rejected,
            Self::UnsupportedType(_) => ErrorCategory::Unsupported,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// HTTP status code, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Convert to the engine's error type, naming the object involved.
    pub fn into_api(self, resource_type: &str, id: &str) -> ApiError {
        match self.category() {
            ErrorCategory::NotFound => ApiError::not_found(resource_type, id),
            ErrorCategory::Network | ErrorCategory::RateLimit => {
                let retry_after = match &self {
                    Self::Http { retry_after, .. } => *retry_after,
                    _ => None,
                };
                ApiError::Transient {
                    message: self.to_string(),
                    retry_after,
                }
            }
            ErrorCategory::Unsupported => ApiError::Unsupported(self.to_string()),
            ErrorCategory::Auth | ErrorCategory::Rejected | ErrorCategory::Format => {
                ApiError::Permanent {
                    status: self.status(),
                    message: self.to_string(),
                }
            }
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::http(code, "", format!("HTTP {code}")),
            ureq::Error::Timeout(t) => Self::Timeout(t.to_string()),
            ureq::Error::Io(e) => Self::Network(e.to_string()),
            ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
                Self::Network(err.to_string())
            }
            ureq::Error::Json(e) => Self::InvalidResponse(e.to_string()),
            other => Self::Network(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_limited(status: u16) -> Error {
        Error::Http {
            status,
            path: "/repos/o/r".into(),
            message: "API rate limit exceeded".into(),
            retry_after: None,
            rate_limited: true,
        }
    }

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::Rejected.is_retryable());
        assert!(!ErrorCategory::Format.is_retryable());
        assert!(!ErrorCategory::Unsupported.is_retryable());
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(Error::http(404, "/x", "").category(), ErrorCategory::NotFound);
        assert_eq!(Error::http(429, "/x", "").category(), ErrorCategory::RateLimit);
        assert_eq!(Error::http(408, "/x", "").category(), ErrorCategory::Network);
        assert_eq!(Error::http(502, "/x", "").category(), ErrorCategory::Network);
        assert_eq!(Error::http(401, "/x", "").category(), ErrorCategory::Auth);
        assert_eq!(Error::http(403, "/x", "").category(), ErrorCategory::Auth);
        assert_eq!(Error::http(422, "/x", "").category(), ErrorCategory::Rejected);
        assert_eq!(rate_limited(403).category(), ErrorCategory::RateLimit);
    }

    #[test]
    fn test_secondary_rate_limit_with_retry_after() {
        let err = Error::Http {
            status: 403,
            path: "/repos/o/r/labels".into(),
            message: "You have exceeded a secondary rate limit".into(),
            retry_after: Some(Duration::from_secs(60)),
            rate_limited: false,
        };
        assert!(err.is_retryable());
        let api = err.into_api("github_issue_label", "r:docker");
        assert_eq!(api.retry_after(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_into_api_error() {
        let api = Error::http(404, "/repos/o/r", "Not Found").into_api("github_repository", "r");
        assert_eq!(api, ApiError::not_found("github_repository", "r"));

        let api = Error::http(422, "/repos/o/r/labels", "already_exists")
            .into_api("github_issue_label", "r:docker");
        assert!(matches!(api, ApiError::Permanent { status: Some(422), .. }));

        let api = Error::Timeout("30s".into()).into_api("gitlab_project", "1");
        assert!(api.is_retryable());

        let api = Error::UnsupportedType("aws_s3_bucket".into()).into_api("aws_s3_bucket", "b");
        assert!(matches!(api, ApiError::Unsupported(_)));
    }

    #[test]
    fn test_error_display() {
        let err = Error::missing("github_issue_label", "color");
        assert_eq!(
            err.to_string(),
            "github_issue_label is missing property 'color'"
        );
        let display = format!("{}", ErrorCategory::RateLimit);
        assert!(display.contains("rate limit"));
    }
}
