//! Metadata enricher
//!
//! Attaches artwork, a preview clip and a fallback video link to
//! recommended tracks. Sources are consulted as an ordered chain of
//! [`LookupStage`]s; the first stage that yields something playable ends the
//! chain. Every stage call is time bounded and its failures are absorbed, so
//! enrichment always produces a result.
//!
//! Results are memoized in a bounded, expiring concurrent cache keyed by the
//! normalized (name, primary artist) pair. A resolution produced while some
//! stage failed is returned but not cached, so a later query retries.

mod itunes;
mod rate_limit;
mod stage;
mod youtube;

pub use itunes::{parse_search_body, ItunesProvider};
pub use stage::{ExternalLookupError, LookupQuery, LookupStage, StageHit, StageOutcome};
pub use youtube::{extract_video_id, thumbnail_url, watch_url, YoutubeSearch};

use crate::dataset::TrackRecord;
use futures::future::join_all;
use moka::future::Cache;
use moodmix_common::config::EnrichmentConfig;
use moodmix_common::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Which part of the chain produced the playable media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentSource {
    Provider,
    VideoFallback,
    None,
}

impl EnrichmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentSource::Provider => "provider",
            EnrichmentSource::VideoFallback => "video_fallback",
            EnrichmentSource::None => "none",
        }
    }
}

/// Media attached to one recommended track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub artwork: String,
    pub preview: Option<String>,
    pub fallback_video: Option<String>,
    pub source: EnrichmentSource,
}

impl Enrichment {
    /// Result carried when nothing playable was found
    pub fn unavailable(artwork: impl Into<String>) -> Self {
        Self {
            artwork: artwork.into(),
            preview: None,
            fallback_video: None,
            source: EnrichmentSource::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    name: String,
    artist: String,
}

impl CacheKey {
    fn new(query: &LookupQuery) -> Self {
        Self {
            name: query.name.trim().to_lowercase(),
            artist: query.artist.trim().to_lowercase(),
        }
    }
}

/// Stage chain plus result cache
pub struct MetadataEnricher {
    stages: Vec<Box<dyn LookupStage>>,
    cache: Cache<CacheKey, Enrichment>,
    placeholder: String,
    enabled: bool,
}

impl MetadataEnricher {
    /// Enricher over an explicit stage list
    pub fn new(
        stages: Vec<Box<dyn LookupStage>>,
        placeholder: impl Into<String>,
        cache_capacity: u64,
        cache_ttl: Duration,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(cache_capacity)
            .time_to_live(cache_ttl)
            .build();

        Self {
            stages,
            cache,
            placeholder: placeholder.into(),
            enabled: true,
        }
    }

    /// Provider stage followed by the video fallback, or a disabled
    /// enricher when the configuration turns lookups off
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled(config.placeholder_artwork.clone()));
        }

        let stages: Vec<Box<dyn LookupStage>> = vec![
            Box::new(ItunesProvider::from_config(config)?),
            Box::new(YoutubeSearch::from_config(config)?),
        ];

        Ok(Self::new(
            stages,
            config.placeholder_artwork.clone(),
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        ))
    }

    /// Enricher that makes no external calls
    pub fn disabled(placeholder: impl Into<String>) -> Self {
        let mut enricher = Self::new(Vec::new(), placeholder, 1, Duration::from_secs(1));
        enricher.enabled = false;
        enricher
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Number of cached resolutions
    pub async fn cached_entries(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn resolve(&self, track: &TrackRecord) -> Enrichment {
        self.resolve_query(&LookupQuery::for_track(track)).await
    }

    /// Resolve media for a (name, artist) pair
    pub async fn resolve_query(&self, query: &LookupQuery) -> Enrichment {
        if !self.enabled {
            return Enrichment::unavailable(self.placeholder.clone());
        }

        let key = CacheKey::new(query);
        if let Some(cached) = self.cache.get(&key).await {
            debug!(track = %query.name, artist = %query.artist, "Enrichment cache hit");
            return cached;
        }

        let (enrichment, complete) = self.run_chain(query).await;
        if complete {
            self.cache.insert(key, enrichment.clone()).await;
        }
        enrichment
    }

    /// Resolve a batch concurrently; output order matches input order
    pub async fn resolve_many(&self, tracks: &[&TrackRecord]) -> Vec<Enrichment> {
        join_all(tracks.iter().map(|t| self.resolve(t))).await
    }

    /// Walk the stage list; the flag is false when any stage failed
    async fn run_chain(&self, query: &LookupQuery) -> (Enrichment, bool) {
        let mut artwork: Option<String> = None;
        let mut complete = true;

        for stage in &self.stages {
            stage.acquire().await;
            let outcome = match tokio::time::timeout(stage.timeout(), stage.lookup(query)).await {
                Ok(outcome) => outcome,
                Err(_) => StageOutcome::Failed(ExternalLookupError::Timeout(stage.timeout())),
            };

            match outcome {
                StageOutcome::Found(hit) => {
                    debug!(
                        stage = stage.name(),
                        track = %query.name,
                        playable = hit.is_playable(),
                        "Lookup stage found media"
                    );
                    let playable = hit.is_playable();
                    if artwork.is_none() {
                        artwork = hit.artwork;
                    }
                    if playable {
                        return (
                            Enrichment {
                                artwork: artwork.unwrap_or_else(|| self.placeholder.clone()),
                                preview: hit.preview,
                                fallback_video: hit.video_url,
                                source: stage.source(),
                            },
                            complete,
                        );
                    }
                }
                StageOutcome::NotFound => {
                    debug!(stage = stage.name(), track = %query.name, "Lookup stage found nothing");
                }
                StageOutcome::Failed(e) => {
                    warn!(
                        stage = stage.name(),
                        track = %query.name,
                        artist = %query.artist,
                        error = %e,
                        "Lookup stage failed"
                    );
                    complete = false;
                }
            }
        }

        (
            Enrichment::unavailable(artwork.unwrap_or_else(|| self.placeholder.clone())),
            complete,
        )
    }
}
