//! Blocking REST client shared by the providers.
//!
//! Wraps a `ureq` agent configured to return non-2xx responses as values so
//! that status codes, `Retry-After` and rate limit headers can be turned
//! into categorized [`Error`]s.

use crate::error::{Error, Result};
use serde_json::Value as Json;
use std::time::Duration;
use url::Url;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("mirrorstack/", env!("CARGO_PKG_VERSION"));

/// How the token is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    /// `Authorization: Bearer <token>` (GitHub)
    Bearer,
    /// `PRIVATE-TOKEN: <token>` (GitLab)
    PrivateToken,
}

/// HTTP methods used by the providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Authenticated JSON client for one API base.
pub struct RestClient {
    agent: ureq::Agent,
    api_base: String,
    token: String,
    auth: Auth,
    accept: &'static str,
}

impl RestClient {
    /// Create a client with the given base URL, token and timeout.
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        auth: Auth,
        timeout: Duration,
    ) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            auth,
            accept: "application/json",
        }
    }

    /// Override the `Accept` header.
    pub fn with_accept(mut self, accept: &'static str) -> Self {
        self.accept = accept;
        self
    }

    /// Get the current API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Build an URL from path segments; each segment is percent-encoded.
    ///
    /// A segment containing `/` (a GitLab group path) becomes a single
    /// encoded segment.
    pub fn url(&self, segments: &[&str]) -> Result<String> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| Error::InvalidResponse(format!("bad API base {}: {e}", self.api_base)))?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidResponse(format!("API base {} cannot have a path", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.to_string())
    }

    pub fn get(&self, segments: &[&str]) -> Result<Json> {
        self.request(Method::Get, segments, None)
    }

    pub fn post(&self, segments: &[&str], body: &Json) -> Result<Json> {
        self.request(Method::Post, segments, Some(body))
    }

    pub fn put(&self, segments: &[&str], body: &Json) -> Result<Json> {
        self.request(Method::Put, segments, Some(body))
    }

    pub fn patch(&self, segments: &[&str], body: &Json) -> Result<Json> {
        self.request(Method::Patch, segments, Some(body))
    }

    pub fn delete(&self, segments: &[&str]) -> Result<()> {
        self.request(Method::Delete, segments, None).map(|_| ())
    }

    /// Send one request; returns the parsed body (`Null` when empty).
    pub fn request(&self, method: Method, segments: &[&str], body: Option<&Json>) -> Result<Json> {
        let url = self.url(segments)?;
        let path = format!("/{}", segments.join("/"));
        log::debug!("{method:?} {url}");

        let response = match (method, body) {
            (Method::Get, _) => self.authorize(self.agent.get(&url)).call(),
            (Method::Delete, _) => self.authorize(self.agent.delete(&url)).call(),
            (Method::Post, Some(b)) => self.authorize(self.agent.post(&url)).send_json(b),
            (Method::Put, Some(b)) => self.authorize(self.agent.put(&url)).send_json(b),
            (Method::Patch, Some(b)) => self.authorize(self.agent.patch(&url)).send_json(b),
            (Method::Post, None) => self.authorize(self.agent.post(&url)).send_empty(),
            (Method::Put, None) => self.authorize(self.agent.put(&url)).send_empty(),
            (Method::Patch, None) => self.authorize(self.agent.patch(&url)).send_empty(),
        };
        let mut response = response.map_err(|e| match Error::from(e) {
            Error::Http {
                status, message, ..
            } => Error::http(status, &path, message),
            other => other,
        })?;

        let status = response.status().as_u16();
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let retry_after = header("retry-after").as_deref().and_then(parse_retry_after);
        let remaining = header("x-ratelimit-remaining");

        let text = response
            .body_mut()
            .read_to_string()
            .map_err(Error::from)?;

        if (200..300).contains(&status) {
            if text.trim().is_empty() {
                return Ok(Json::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        Err(Error::Http {
            status,
            path,
            message: error_message(&text),
            retry_after,
            rate_limited: remaining.as_deref() == Some("0"),
        })
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let request = request
            .header("Accept", self.accept)
            .header("User-Agent", USER_AGENT);
        match self.auth {
            Auth::Bearer => request.header("Authorization", &format!("Bearer {}", self.token)),
            Auth::PrivateToken => request.header("PRIVATE-TOKEN", &self.token),
        }
    }
}

/// Parse `Retry-After` given in seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Best-effort message from an error body.
///
/// GitHub answers `{"message": ...}`, GitLab `{"message": ...}` or
/// `{"error": ...}`; validation details are appended when present.
fn error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Json>(body) else {
        return body.trim().chars().take(200).collect();
    };
    let mut message = match json.get("message").or_else(|| json.get("error")) {
        Some(Json::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => json.to_string(),
    };
    if let Some(Json::Array(errors)) = json.get("errors") {
        let details: Vec<String> = errors
            .iter()
            .map(|e| match e {
                Json::String(s) => s.clone(),
                other => other
                    .get("message")
                    .or_else(|| other.get("code"))
                    .and_then(Json::as_str)
                    .map_or_else(|| other.to_string(), str::to_string),
            })
            .collect();
        if !details.is_empty() {
            message = format!("{message} ({})", details.join("; "));
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> RestClient {
        RestClient::new(base, "token", Auth::Bearer, DEFAULT_TIMEOUT)
    }

    #[test]
    fn test_url_encodes_segments() {
        let c = client("https://api.github.com");
        assert_eq!(
            c.url(&["repos", "octo", "desired-state", "labels", "docker dependencies"])
                .unwrap(),
            "https://api.github.com/repos/octo/desired-state/labels/docker%20dependencies"
        );
    }

    #[test]
    fn test_url_keeps_base_path() {
        let c = client("https://gitlab.com/api/v4/");
        assert_eq!(c.api_base(), "https://gitlab.com/api/v4");
        assert_eq!(
            c.url(&["groups", "mirror-e/github-softwaredevelop"]).unwrap(),
            "https://gitlab.com/api/v4/groups/mirror-e%2Fgithub-softwaredevelop"
        );
    }

    #[test]
    fn test_bad_base_url() {
        let c = client("not a url");
        assert!(c.url(&["x"]).is_err());
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("60"), Some(Duration::from_secs(60)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"message":"Validation Failed","errors":[{"resource":"Label","code":"already_exists"}]}"#),
            "Validation Failed (already_exists)"
        );
        assert_eq!(
            error_message(r#"{"message":{"name":["has already been taken"]}}"#),
            r#"{"name":["has already been taken"]}"#
        );
        assert_eq!(error_message(r#"{"error":"insufficient_scope"}"#), "insufficient_scope");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
