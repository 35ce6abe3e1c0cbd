//! Video search adapter: turns a text query into a single media ID.

use std::time::Duration;

use serde_json::Value;

use crate::error::AppError;

const SEARCH_ROOT: &str = "https://www.googleapis.com/youtube/v3/search";

/// Interface over the video-search boundary consumed by the resolver.
pub trait VideoSearch: Send + Sync {
    /// Returns the media ID of the first search result.
    fn search(&self, query: &str) -> Result<String, AppError>;
}

/// YouTube search adapter backed by `ureq`.
pub struct YoutubeClient {
    http_client: ureq::Agent,
    api_key: String,
}

impl YoutubeClient {
    /// Creates a new search adapter.
    pub fn new(api_key: String) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self {
            http_client,
            api_key,
        }
    }
}

/// Extracts the first result's video ID from a search response payload.
fn parse_search_payload(payload: &Value, query: &str) -> Result<String, AppError> {
    if let Some(error) = payload.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("video search returned an error");
        return Err(AppError::SourceApi(message.to_string()));
    }
    let items = match payload.get("items") {
        Some(Value::Array(items)) => items,
        _ => return Err(AppError::NoResult(query.to_string())),
    };
    items
        .first()
        .and_then(|item| item.get("id"))
        .and_then(|id| id.get("videoId"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| AppError::NoResult(query.to_string()))
}

impl VideoSearch for YoutubeClient {
    fn search(&self, query: &str) -> Result<String, AppError> {
        let url = format!(
            "{}?key={}&type=video&maxResults=1&q={}",
            SEARCH_ROOT,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(query)
        );
        // Error payloads arrive with non-2xx statuses; read the body anyway.
        let response = match self.http_client.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => {
                return Err(AppError::Transport(format!(
                    "video search request failed: {err}"
                )))
            }
        };
        let payload: Value = response
            .into_json()
            .map_err(|err| AppError::Parse(format!("video search response parse failed: {err}")))?;
        parse_search_payload(&payload, query)
    }
}
