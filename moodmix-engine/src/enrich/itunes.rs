//! iTunes Search API stage
//!
//! Queries `?term=<name artist>&limit=1&media=music` and takes the preview
//! clip and album artwork of the first result. The API only advertises
//! 100px artwork; the size token in the URL is rewritten to the configured
//! size to get a larger image.

use super::rate_limit::RateLimiter;
use super::stage::{ExternalLookupError, LookupQuery, LookupStage, StageHit, StageOutcome};
use super::EnrichmentSource;
use async_trait::async_trait;
use moodmix_common::config::EnrichmentConfig;
use moodmix_common::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Size token embedded in artwork URLs returned by the API
const ADVERTISED_ARTWORK_SIZE: &str = "100x100bb";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    artwork_url100: Option<String>,
    artwork_url60: Option<String>,
    preview_url: Option<String>,
}

/// Extract the hit from a search response body
///
/// Returns `Ok(None)` when the response holds no results.
pub fn parse_search_body(
    body: &str,
    artwork_size: &str,
) -> std::result::Result<Option<StageHit>, ExternalLookupError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| ExternalLookupError::Parse(e.to_string()))?;

    let first = match response.results.into_iter().next() {
        Some(r) => r,
        None => return Ok(None),
    };

    let artwork = first
        .artwork_url100
        .or(first.artwork_url60)
        .filter(|url| !url.is_empty())
        .map(|url| url.replace(ADVERTISED_ARTWORK_SIZE, artwork_size));
    let preview = first.preview_url.filter(|url| !url.is_empty());

    Ok(Some(StageHit {
        artwork,
        preview,
        video_url: None,
    }))
}

/// Provider stage backed by the iTunes Search API
pub struct ItunesProvider {
    http_client: reqwest::Client,
    base_url: String,
    artwork_size: String,
    timeout: Duration,
    rate_limiter: RateLimiter,
}

impl ItunesProvider {
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.provider_timeout_ms);
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.provider_base_url.clone(),
            artwork_size: config.artwork_size.clone(),
            timeout,
            rate_limiter: RateLimiter::new(
                "itunes",
                Duration::from_millis(config.provider_rate_limit_ms),
            ),
        })
    }

    async fn search(
        &self,
        query: &LookupQuery,
    ) -> std::result::Result<Option<StageHit>, ExternalLookupError> {
        let term = query.term();
        tracing::debug!(term = %term, url = %self.base_url, "Querying iTunes Search API");

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[("term", term.as_str()), ("limit", "1"), ("media", "music")])
            .send()
            .await
            .map_err(|e| ExternalLookupError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ExternalLookupError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExternalLookupError::Network(e.to_string()))?;
        parse_search_body(&body, &self.artwork_size)
    }
}

#[async_trait]
impl LookupStage for ItunesProvider {
    fn name(&self) -> &'static str {
        "itunes"
    }

    fn source(&self) -> EnrichmentSource {
        EnrichmentSource::Provider
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn acquire(&self) {
        self.rate_limiter.wait().await;
    }

    async fn lookup(&self, query: &LookupQuery) -> StageOutcome {
        self.search(query).await.into()
    }
}
