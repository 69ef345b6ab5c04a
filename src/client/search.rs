// HTTP client for the thread / news search service

use super::{check_status, decode_json, http_client, ServiceError, ThreadSearch};
use crate::utils::join_url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Response of `POST /search?topic=`
///
/// Thread elements stay undecoded so `threads::build_from_values` can
/// reject a bad one without losing the rest of the response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub threads: Vec<Value>,
    /// Fallback single tweets when no threads matched
    #[serde(default)]
    pub top_tweets: Option<Vec<Value>>,
}

impl SearchResponse {
    /// Decode a response body; reply chains may nest deeper than serde_json's default limit
    pub fn from_slice(body: &[u8]) -> Result<Self, ServiceError> {
        decode_json(body)
    }
}

/// A scraped news article, passed through untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsArticle {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Response of `GET /search/news?topic=`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsResponse {
    #[serde(default)]
    pub articles: Vec<NewsArticle>,
}

pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl SearchClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: http_client(timeout),
            base_url: base_url.into(),
        }
    }
}

impl ThreadSearch for SearchClient {
    async fn search_threads(&self, keyword: &str) -> Result<SearchResponse, ServiceError> {
        let url = join_url(&self.base_url, "search");
        log::info!("Searching threads for '{}'", keyword);

        let response = self
            .http
            .post(&url)
            .query(&[("topic", keyword)])
            .send()
            .await
            .map_err(ServiceError::from_reqwest)?;
        let response = check_status(response).await?;

        let body = response.bytes().await.map_err(ServiceError::from_reqwest)?;
        SearchResponse::from_slice(&body)
    }

    async fn search_news(&self, keyword: &str) -> Result<NewsResponse, ServiceError> {
        let url = join_url(&self.base_url, "search/news");
        log::info!("Searching news for '{}'", keyword);

        let response = self
            .http
            .get(&url)
            .query(&[("topic", keyword)])
            .send()
            .await
            .map_err(ServiceError::from_reqwest)?;
        let response = check_status(response).await?;

        response
            .json::<NewsResponse>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}
