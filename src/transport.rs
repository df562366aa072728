//! HTTP transport seam.
//!
//! The gateway only needs "POST this JSON, give me status, `Retry-After` and
//! body". [`ReqwestTransport`] is the production implementation; tests plug in
//! scripted transports.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::{header, StatusCode};

/// Raw upstream answer, before classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed `Retry-After` header (delta-seconds form).
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// Category of a failure that happened before a response was received.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?} transport error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}

/// Sends a JSON body to the completion endpoint.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn post_json(&self, body: &serde_json::Value) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    url: String,
    authorization: String,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("url", &self.url)
            .field("authorization", &"<redacted>")
            .finish()
    }
}

impl ReqwestTransport {
    pub fn new(url: impl Into<String>, authorization: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            authorization: authorization.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, body: &serde_json::Value) -> Result<HttpResponse, TransportError> {
        let response = self
            .http
            .post(&self.url)
            .header(header::AUTHORIZATION, &self.authorization)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let retry_after = retry_after(response.headers(), status);
        let body = response.text().await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            retry_after,
            body,
        })
    }
}

fn retry_after(headers: &header::HeaderMap, status: StatusCode) -> Option<Duration> {
    if status != StatusCode::TOO_MANY_REQUESTS && status != StatusCode::SERVICE_UNAVAILABLE {
        return None;
    }
    headers
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after)
}

/// Parses the delta-seconds form of `Retry-After`, fractional values included.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds = value.trim().parse::<f64>().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::{
        header::{HeaderMap, HeaderValue, RETRY_AFTER},
        StatusCode,
    };

    use super::{parse_retry_after, retry_after, ReqwestTransport};

    #[test]
    fn retry_after_parses_seconds() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1_500)));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn retry_after_only_read_for_throttling_statuses() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("5"));
        assert_eq!(
            retry_after(&headers, StatusCode::TOO_MANY_REQUESTS),
            Some(Duration::from_secs(5))
        );
        assert_eq!(retry_after(&headers, StatusCode::OK), None);
    }

    #[test]
    fn debug_redacts_authorization_value() {
        let transport = ReqwestTransport::new("https://api/v1/chat/completions", "Bearer sk-secret");
        let debug = format!("{transport:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("sk-secret"));
    }
}
