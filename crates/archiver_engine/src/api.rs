use std::time::Duration;

use archiver_core::ChannelInfo;
use archiver_logging::{archiver_debug, archiver_warn};
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;

use crate::types::{map_reqwest_error, ApiBody, ApiError};

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Added on top of every server-directed rate-limit delay.
    pub rate_limit_margin: Duration,
    /// Used when a 429 carries no usable delay.
    pub default_retry_after: Duration,
    pub user_agent: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://discord.com/api/v10".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            rate_limit_margin: Duration::from_millis(250),
            default_retry_after: Duration::from_secs(1),
            user_agent: format!("archiver/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ApiSettings {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }
}

/// Authenticated access to the chat platform's REST API.
///
/// Stateless between calls; the only automatic retry is waiting out rate
/// limits.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    settings: ApiSettings,
}

impl ApiClient {
    pub fn new(settings: ApiSettings) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|err| ApiError::Network(err.to_string()))?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    /// Underlying HTTP client, shared with the asset downloader.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Absolute URL for an API path such as `/users/@me/guilds`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url, path.trim_start_matches('/'))
    }

    /// Issue one request, waiting out any number of rate limits.
    pub async fn request(
        &self,
        token: &str,
        url: &str,
        method: Method,
    ) -> Result<ApiBody, ApiError> {
        let parsed = Url::parse(url).map_err(|_| ApiError::InvalidUrl(url.to_string()))?;
        let mut rate_limited: u32 = 0;

        loop {
            let response = self
                .http
                .request(method.clone(), parsed.clone())
                .header(AUTHORIZATION, token.trim())
                .timeout(self.settings.request_timeout)
                .send()
                .await
                .map_err(map_reqwest_error)?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                rate_limited += 1;
                let header_delay = retry_after_from_headers(response.headers());
                let body = response.text().await.unwrap_or_default();
                let delay = header_delay
                    .or_else(|| retry_after_from_body(&body))
                    .unwrap_or(self.settings.default_retry_after)
                    + self.settings.rate_limit_margin;
                archiver_warn!(
                    "Rate limited url={} attempt={} wait_ms={}",
                    parsed.path(),
                    rate_limited,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_failure(status, parsed.path(), body));
            }

            archiver_debug!("{} {} -> {}", method, parsed.path(), status.as_u16());
            return read_body(response).await;
        }
    }

    pub async fn get_json(&self, token: &str, url: &str) -> Result<Value, ApiError> {
        match self.request(token, url, Method::GET).await? {
            ApiBody::Json(value) => Ok(value),
            ApiBody::Text(text) => Err(ApiError::Decode(format!(
                "expected JSON from {url}, got {} bytes of text",
                text.len()
            ))),
            ApiBody::Empty => Err(ApiError::Decode(format!("empty body from {url}"))),
        }
    }

    pub async fn get_channel(&self, token: &str, channel_id: &str) -> Result<ChannelInfo, ApiError> {
        let url = self.endpoint(&format!("/channels/{channel_id}"));
        let value = self.get_json(token, &url).await?;
        serde_json::from_value(value).map_err(|err| ApiError::Decode(err.to_string()))
    }

    pub async fn list_guilds(&self, token: &str) -> Result<Value, ApiError> {
        self.get_json(token, &self.endpoint("/users/@me/guilds")).await
    }

    pub async fn list_guild_channels(&self, token: &str, guild_id: &str) -> Result<Value, ApiError> {
        let url = self.endpoint(&format!("/guilds/{guild_id}/channels"));
        self.get_json(token, &url).await
    }

    pub async fn list_active_threads(&self, token: &str, guild_id: &str) -> Result<Value, ApiError> {
        let url = self.endpoint(&format!("/guilds/{guild_id}/threads/active"));
        self.get_json(token, &url).await
    }

    pub async fn list_archived_threads(
        &self,
        token: &str,
        channel_id: &str,
    ) -> Result<Value, ApiError> {
        let url = self.endpoint(&format!("/channels/{channel_id}/threads/archived/public"));
        self.get_json(token, &url).await
    }
}

async fn read_body(response: reqwest::Response) -> Result<ApiBody, ApiError> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(ApiBody::Empty);
    }
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
    let text = response.text().await.map_err(map_reqwest_error)?;
    if text.trim().is_empty() {
        return Ok(ApiBody::Empty);
    }
    if is_json {
        serde_json::from_str(&text)
            .map(ApiBody::Json)
            .map_err(|err| ApiError::Decode(err.to_string()))
    } else {
        Ok(ApiBody::Text(text))
    }
}

fn classify_failure(status: StatusCode, path: &str, body: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::Forbidden(path.to_string()),
        StatusCode::NOT_FOUND => ApiError::NotFound(path.to_string()),
        _ => {
            let mut body = body;
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            ApiError::Status {
                status: status.as_u16(),
                body,
            }
        }
    }
}

fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .and_then(seconds_to_duration)
}

fn retry_after_from_body(body: &str) -> Option<Duration> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("retry_after")?
        .as_f64()
        .and_then(seconds_to_duration)
}

fn seconds_to_duration(secs: f64) -> Option<Duration> {
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retry_after_header_accepts_fractions() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("1.5"));
        assert_eq!(
            retry_after_from_headers(&headers),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn retry_after_body_is_a_fallback() {
        assert_eq!(
            retry_after_from_body(r#"{"message":"slow down","retry_after":0.25,"global":false}"#),
            Some(Duration::from_millis(250))
        );
        assert_eq!(retry_after_from_body("not json"), None);
        assert_eq!(retry_after_from_body(r#"{"retry_after":-3}"#), None);
    }

    #[test]
    fn failures_are_classified_by_status() {
        assert_eq!(
            classify_failure(StatusCode::UNAUTHORIZED, "/x", String::new()),
            ApiError::Unauthorized
        );
        assert_eq!(
            classify_failure(StatusCode::FORBIDDEN, "/x", String::new()),
            ApiError::Forbidden("/x".into())
        );
        let err = classify_failure(StatusCode::BAD_GATEWAY, "/x", "é".repeat(600));
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 502);
                assert!(body.len() <= MAX_ERROR_BODY);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
