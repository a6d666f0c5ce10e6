//! Lookup stage seam
//!
//! One stage is one external source consulted by the enricher. Stages never
//! raise: every transport, status or parse problem is folded into
//! [`StageOutcome::Failed`] so the chain can move on to the next stage.

use super::EnrichmentSource;
use crate::dataset::TrackRecord;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single external lookup
#[derive(Debug, Clone, Error)]
pub enum ExternalLookupError {
    /// Stage did not answer within its time bound
    #[error("Lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response other than "not found"
    #[error("Unexpected status {0}")]
    Status(u16),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Track identity sent to external sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    pub name: String,
    pub artist: String,
}

impl LookupQuery {
    pub fn new(name: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artist: artist.into(),
        }
    }

    /// Query for a track by its name and primary artist
    pub fn for_track(track: &TrackRecord) -> Self {
        Self::new(track.name.clone(), track.primary_artist())
    }

    /// Free-text search term, e.g. `"Blinding Lights The Weeknd"`
    pub fn term(&self) -> String {
        format!("{} {}", self.name.trim(), self.artist.trim())
            .trim()
            .to_string()
    }
}

/// Media found by one stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageHit {
    pub artwork: Option<String>,
    pub preview: Option<String>,
    pub video_url: Option<String>,
}

impl StageHit {
    /// A hit is playable when it carries something the user can listen to
    pub fn is_playable(&self) -> bool {
        self.preview.is_some() || self.video_url.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.artwork.is_none() && !self.is_playable()
    }
}

/// Result of consulting one stage
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Found(StageHit),
    NotFound,
    Failed(ExternalLookupError),
}

impl From<Result<Option<StageHit>, ExternalLookupError>> for StageOutcome {
    fn from(result: Result<Option<StageHit>, ExternalLookupError>) -> Self {
        match result {
            Ok(Some(hit)) if !hit.is_empty() => StageOutcome::Found(hit),
            Ok(_) => StageOutcome::NotFound,
            Err(e) => StageOutcome::Failed(e),
        }
    }
}

/// One external metadata source
#[async_trait]
pub trait LookupStage: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Source tag reported when this stage produces the playable hit
    fn source(&self) -> EnrichmentSource;

    /// Upper bound on a single lookup
    fn timeout(&self) -> Duration;

    /// Wait for this stage's request slot; not counted against `timeout`
    async fn acquire(&self) {}

    async fn lookup(&self, query: &LookupQuery) -> StageOutcome;
}
