use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub const YOUTUBE_SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no API key configured for {service}")]
    MissingKey { service: &'static str },
    #[error("request failed")]
    Http(#[from] reqwest::Error),
}

/// Google services available to commands
#[async_trait]
pub trait GoogleApi: Send + Sync {
    /// Links to the first `max` videos matching `query`
    async fn search_videos(&self, query: &str, max: usize) -> Result<Vec<String>, ApiError>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: ItemId,
}

#[derive(Deserialize)]
struct ItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

impl SearchResponse {
    fn video_links(self) -> Vec<String> {
        self.items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            .collect()
    }
}

pub struct GoogleApiClient {
    http: reqwest::Client,
    key: Option<String>,
    search_url: String,
}

impl GoogleApiClient {
    pub fn new(key: Option<&str>) -> Result<Self, ApiError> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            key: key.map(str::to_owned),
            search_url: YOUTUBE_SEARCH_URL.to_owned(),
        })
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }
}

#[async_trait]
impl GoogleApi for GoogleApiClient {
    async fn search_videos(&self, query: &str, max: usize) -> Result<Vec<String>, ApiError> {
        let key = self
            .key
            .as_deref()
            .ok_or(ApiError::MissingKey { service: "youtube" })?;
        let max = max.clamp(1, 50).to_string();
        let response = self
            .http
            .get(&self.search_url)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", max.as_str()),
                ("q", query),
                ("key", key),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(reqwest::Error::without_url)?
            .json::<SearchResponse>()
            .await?;
        Ok(response.video_links())
    }
}
