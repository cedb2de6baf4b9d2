//! Error types for declaration, reconciliation and remote calls.
//!
//! Declaration-time errors ([`DeclarationError`]) are always fatal and are
//! raised before any remote call. Remote errors ([`ApiError`]) are
//! categorized so the executor can decide whether to retry.

use crate::types::ResourceKey;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while building or reconciling a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    /// The name is already declared in this type namespace
    #[error("duplicate resource: {key} is already declared")]
    DuplicateName {
        /// The offending key
        key: ResourceKey,
    },

    /// Adding the edge would close a cycle
    #[error("dependency cycle: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// The cycle, starting and ending at the same resource
        cycle: Vec<ResourceKey>,
    },

    /// A dependency is neither declared nor present in observed state
    #[error("{resource} depends on {dependency}, which is neither declared nor observed")]
    UnresolvedDependency {
        /// The dependent resource
        resource: ResourceKey,
        /// The missing dependency
        dependency: ResourceKey,
    },

    /// An edge refers to a resource that was never declared
    #[error("unknown resource: {0}")]
    UnknownResource(ResourceKey),
}

fn format_cycle(cycle: &[ResourceKey]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Categories of remote API errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rate limit, timeout, server error (retryable)
    Transient,
    /// The remote object does not exist
    NotFound,
    /// Rejected request, bad credentials, validation failure
    Permanent,
    /// No provider handles the resource type or operation
    Unsupported,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Transient API failure",
            Self::NotFound => "Remote resource not found",
            Self::Permanent => "Request rejected by the API",
            Self::Unsupported => "Unsupported resource type",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transient => "Wait for the rate limit to reset or check connectivity, then retry",
            Self::NotFound => "Run refresh to drop resources deleted outside of mirrorstack",
            Self::Permanent => "Check tokens, permissions and property values",
            Self::Unsupported => "Configure the token for the provider that owns this type",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors returned by a [`Provider`](crate::context::Provider).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The remote object does not exist
    #[error("{resource_type} '{id}' not found")]
    NotFound {
        /// Resource type that was queried
        resource_type: String,
        /// Remote identifier that was queried
        id: String,
    },

    /// Retryable failure (rate limit, timeout, 5xx)
    #[error("transient API error: {message}")]
    Transient {
        /// Error message
        message: String,
        /// Server-provided hint for when to retry
        retry_after: Option<Duration>,
    },

    /// Non-retryable failure
    #[error("API error: {message}")]
    Permanent {
        /// Error message
        message: String,
        /// HTTP status code if available
        status: Option<u16>,
    },

    /// No provider handles this resource type or operation
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ApiError {
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            status: None,
        }
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Transient { .. } => ErrorCategory::Transient,
            Self::Permanent { .. } => ErrorCategory::Permanent,
            Self::Unsupported(_) => ErrorCategory::Unsupported,
        }
    }

    /// Whether this error should be retried.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Server-provided retry delay, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A remote read failed while refreshing observed state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to refresh {key}: {source}")]
pub struct RefreshError {
    /// Resource being refreshed or looked up
    pub key: ResourceKey,
    /// Underlying API error
    #[source]
    pub source: ApiError,
}
