use archiver_core::MAX_BATCH_SIZE;
use serde_json::Value;
use url::Url;

use crate::api::ApiClient;
use crate::types::{ApiBody, ApiError};

/// One page of channel history, newest first, as raw JSON.
pub type MessageBatch = Vec<Value>;

/// Pages backwards through a channel's history with a `before` cursor.
#[derive(Debug, Clone)]
pub struct MessageFetcher {
    client: ApiClient,
}

impl MessageFetcher {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Fetch up to `limit` (at most 100) messages older than `before`.
    ///
    /// An empty batch means the history is exhausted.
    pub async fn fetch_batch(
        &self,
        token: &str,
        channel_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<MessageBatch, ApiError> {
        let base = self
            .client
            .endpoint(&format!("/channels/{channel_id}/messages"));
        let mut url = Url::parse(&base).map_err(|_| ApiError::InvalidUrl(base.clone()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.clamp(1, MAX_BATCH_SIZE).to_string());
            if let Some(cursor) = before {
                query.append_pair("before", cursor);
            }
        }

        match self.client.request(token, url.as_str(), reqwest::Method::GET).await? {
            ApiBody::Json(Value::Array(messages)) => Ok(messages),
            ApiBody::Empty => Ok(Vec::new()),
            ApiBody::Json(other) => Err(ApiError::Decode(format!(
                "expected a message array, got {}",
                json_kind(&other)
            ))),
            ApiBody::Text(_) => Err(ApiError::Decode("expected a message array, got text".into())),
        }
    }
}

/// Cursor for the next page: the id of the oldest message in `batch`.
pub fn next_cursor(batch: &[Value]) -> Option<String> {
    batch
        .last()
        .and_then(|message| message.get("id"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
