//! Base HTTP client with shared logic

use crate::infrastructure::model::types::ModelError;
use regex::Regex;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use std::time::Duration;

/// Extra slack added to a retry hint parsed from an error body.
const BODY_HINT_SLACK: Duration = Duration::from_millis(500);

/// Longest retry hint taken from a service response.
pub const MAX_RETRY_HINT: Duration = Duration::from_secs(3600);

/// Base HTTP client with shared functionality
#[derive(Clone)]
pub struct HttpClientBase {
    pub id: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub http: Client,
}

impl HttpClientBase {
    pub fn new(id: String, endpoint: String, api_key: Option<String>) -> Self {
        Self {
            id,
            endpoint,
            api_key,
            http: Client::new(),
        }
    }

    /// Build URL from endpoint and path
    pub fn build_url(&self, path: &str) -> String {
        let base = self.endpoint.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Post JSON with bearer auth
    pub async fn post_with_bearer<Req, Res>(
        &self,
        url: &str,
        body: &Req,
        timeout: Option<Duration>,
    ) -> Result<Res, ModelError>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let api_key = self.require_api_key()?;

        let mut builder: RequestBuilder = self
            .http
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let response = self.check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ModelError::invalid_response(&self.id, e.to_string()))
    }

    /// Map non-success statuses onto the classified error variants.
    async fn check_status(&self, response: Response) -> Result<Response, ModelError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let header_hint = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.unwrap_or_default();

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => ModelError::rate_limited(
                &self.id,
                parse_retry_after(header_hint.as_deref(), &body),
                body,
            ),
            StatusCode::REQUEST_TIMEOUT => ModelError::timeout(&self.id),
            other => ModelError::service(&self.id, other.as_u16(), body),
        })
    }

    fn transport_error(&self, error: reqwest::Error) -> ModelError {
        if error.is_timeout() {
            ModelError::timeout(&self.id)
        } else {
            ModelError::network(&self.id, error)
        }
    }

    fn require_api_key(&self) -> Result<&str, ModelError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ModelError::missing_api_key(&self.id))
    }
}

/// Retry hint from a `Retry-After` header (seconds) or, failing that, an
/// `after N seconds` phrase in the error body. Hints are capped at
/// [`MAX_RETRY_HINT`].
pub fn parse_retry_after(header: Option<&str>, body: &str) -> Option<Duration> {
    if let Some(seconds) = header.and_then(|value| value.trim().parse::<f64>().ok()) {
        if seconds.is_finite() && seconds >= 0.0 {
            let hint = Duration::try_from_secs_f64(seconds).unwrap_or(MAX_RETRY_HINT);
            return Some(hint.min(MAX_RETRY_HINT));
        }
    }

    static AFTER_SECONDS: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = AFTER_SECONDS
        .get_or_init(|| Regex::new(r"after (\d+) seconds").ok())
        .as_ref()?;
    let seconds: u64 = pattern.captures(body)?.get(1)?.as_str().parse().ok()?;
    Some(
        Duration::from_secs(seconds)
            .saturating_add(BODY_HINT_SLACK)
            .min(MAX_RETRY_HINT),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_hint_takes_precedence() {
        assert_eq!(
            parse_retry_after(Some("7"), "please try again after 3 seconds"),
            Some(Duration::from_secs(7))
        );
    }

    #[test]
    fn body_hint_adds_slack() {
        assert_eq!(
            parse_retry_after(None, "rate limited, try again after 3 seconds"),
            Some(Duration::from_millis(3500))
        );
        assert_eq!(parse_retry_after(Some("soon"), "no hint here"), None);
    }

    #[test]
    fn oversized_hints_are_capped() {
        assert_eq!(parse_retry_after(Some("1e30"), ""), Some(MAX_RETRY_HINT));
        assert_eq!(
            parse_retry_after(None, "try again after 18446744073709551615 seconds"),
            Some(MAX_RETRY_HINT)
        );
        assert_eq!(parse_retry_after(Some("NaN"), "no hint here"), None);
    }

    #[test]
    fn builds_url_without_duplicate_slashes() {
        let base = HttpClientBase::new("p".into(), "https://api.example.com/".into(), None);
        assert_eq!(
            base.build_url("/v1/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }
}
