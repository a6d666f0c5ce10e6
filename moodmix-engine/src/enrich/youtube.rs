//! YouTube video fallback stage
//!
//! Fetches the public results page for `"<name> <artist> audio"` and picks
//! the first video id embedded in the page data. No API key is involved.

use super::stage::{ExternalLookupError, LookupQuery, LookupStage, StageHit, StageOutcome};
use super::EnrichmentSource;
use async_trait::async_trait;
use moodmix_common::config::EnrichmentConfig;
use moodmix_common::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

static VIDEO_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""videoId"\s*:\s*"([A-Za-z0-9_-]{11})""#).unwrap());

/// First 11-character video id found in a results page
pub fn extract_video_id(html: &str) -> Option<&str> {
    VIDEO_ID
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub fn watch_url(video_id: &str) -> String {
    format!("{}{}", WATCH_URL, video_id)
}

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://img.youtube.com/vi/{}/hqdefault.jpg", video_id)
}

/// Video fallback stage backed by the YouTube results page
pub struct YoutubeSearch {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl YoutubeSearch {
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.video_timeout_ms);
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.video_base_url.clone(),
            timeout,
        })
    }

    async fn search(
        &self,
        query: &LookupQuery,
    ) -> std::result::Result<Option<StageHit>, ExternalLookupError> {
        let search_query = format!("{} audio", query.term());
        tracing::debug!(query = %search_query, "Searching YouTube results page");

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[("search_query", search_query.as_str())])
            .send()
            .await
            .map_err(|e| ExternalLookupError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExternalLookupError::Status(status.as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ExternalLookupError::Network(e.to_string()))?;

        Ok(extract_video_id(&html).map(|id| StageHit {
            artwork: Some(thumbnail_url(id)),
            preview: None,
            video_url: Some(watch_url(id)),
        }))
    }
}

#[async_trait]
impl LookupStage for YoutubeSearch {
    fn name(&self) -> &'static str {
        "youtube"
    }

    fn source(&self) -> EnrichmentSource {
        EnrichmentSource::VideoFallback
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn lookup(&self, query: &LookupQuery) -> StageOutcome {
        self.search(query).await.into()
    }
}
