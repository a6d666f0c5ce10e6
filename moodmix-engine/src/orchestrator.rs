//! Query orchestrator
//!
//! The public query surface: title search, recommendation by track name and
//! recommendation by an ad hoc feature vector. Each query works on one model
//! snapshot, so a concurrent rebuild never mixes two models in one answer.

use crate::enrich::{Enrichment, EnrichmentSource, MetadataEnricher};
use crate::index::Neighbor;
use crate::model::{ModelHandle, RecommendationModel, TrackSummary};
use crate::search::Resolution;
use moodmix_common::config::TomlConfig;
use moodmix_common::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// One recommended track with its media
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationResult {
    #[serde(flatten)]
    pub track: TrackSummary,
    /// Cosine distance from the anchor
    pub distance: f64,
    pub artwork: String,
    pub preview: Option<String>,
    pub fallback_video: Option<String>,
    pub source: EnrichmentSource,
}

/// Answer to a recommend-by-name query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub resolved_track: TrackSummary,
    pub results: Vec<RecommendationResult>,
}

pub struct QueryOrchestrator {
    model: ModelHandle,
    enricher: Arc<MetadataEnricher>,
    fuzzy_cutoff: Option<f64>,
}

impl QueryOrchestrator {
    pub fn new(
        model: ModelHandle,
        enricher: Arc<MetadataEnricher>,
        fuzzy_cutoff: Option<f64>,
    ) -> Self {
        Self {
            model,
            enricher,
            fuzzy_cutoff,
        }
    }

    /// Orchestrator over `model` with the configured enricher and search
    /// settings
    pub fn from_config(config: &TomlConfig, model: ModelHandle) -> Result<Self> {
        let enricher = MetadataEnricher::from_config(&config.enrichment)?;
        Ok(Self::new(
            model,
            Arc::new(enricher),
            config.search.fuzzy_cutoff,
        ))
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn enricher(&self) -> &MetadataEnricher {
        &self.enricher
    }

    /// Tracks whose name matches `text`, best match first
    pub async fn search(&self, text: &str, limit: usize) -> Result<Vec<TrackSummary>> {
        if limit == 0 {
            return Err(Error::InvalidArgument(
                "limit must be at least 1".to_string(),
            ));
        }
        let model = self.model.snapshot().await;
        let matches = model.titles().search(text, limit);
        debug!(query = %text, matches = matches.len(), "Title search");
        Ok(matches
            .iter()
            .filter_map(|m| model.summary(m.index))
            .collect())
    }

    /// Tracks most similar to the one best matching `track_name`
    pub async fn recommend(&self, track_name: &str, top_n: usize) -> Result<Recommendation> {
        validate_top_n(top_n)?;
        let model = self.model.snapshot().await;

        let resolution = model
            .titles()
            .resolve(track_name, self.fuzzy_cutoff)
            .ok_or_else(|| Error::NotFound(format!("no track matches '{}'", track_name.trim())))?;
        if let Resolution::Fuzzy { index, similarity } = resolution {
            info!(query = %track_name, index, similarity, "Resolved track by fuzzy match");
        }

        let anchor = resolution.index();
        let resolved_track = model
            .summary(anchor)
            .ok_or_else(|| Error::NotFound(format!("track index {} is not indexed", anchor)))?;

        let neighbors = model.neighbors(anchor, top_n)?;
        let results = self.enrich_neighbors(&model, &neighbors).await;

        info!(
            track = %resolved_track.name,
            index = anchor,
            results = results.len(),
            "Recommendation served"
        );

        Ok(Recommendation {
            resolved_track,
            results,
        })
    }

    /// Tracks most similar to a raw feature vector given in schema order
    pub async fn recommend_for_features(
        &self,
        raw: &[f64],
        top_n: usize,
    ) -> Result<Vec<RecommendationResult>> {
        validate_top_n(top_n)?;
        let model = self.model.snapshot().await;
        let neighbors = model.neighbors_for_features(raw, top_n)?;
        Ok(self.enrich_neighbors(&model, &neighbors).await)
    }

    async fn enrich_neighbors(
        &self,
        model: &RecommendationModel,
        neighbors: &[Neighbor],
    ) -> Vec<RecommendationResult> {
        let tracks: Vec<_> = neighbors
            .iter()
            .filter_map(|n| model.track(n.index).map(|t| (n, t)))
            .collect();
        let records: Vec<_> = tracks.iter().map(|(_, t)| &t.record).collect();
        let enrichments = self.enricher.resolve_many(&records).await;

        tracks
            .iter()
            .zip(enrichments)
            .filter_map(|((neighbor, _), enrichment)| {
                model
                    .summary(neighbor.index)
                    .map(|track| result(track, neighbor.distance, enrichment))
            })
            .collect()
    }
}

fn result(track: TrackSummary, distance: f64, enrichment: Enrichment) -> RecommendationResult {
    RecommendationResult {
        track,
        distance,
        artwork: enrichment.artwork,
        preview: enrichment.preview,
        fallback_video: enrichment.fallback_video,
        source: enrichment.source,
    }
}

fn validate_top_n(top_n: usize) -> Result<()> {
    if top_n == 0 {
        return Err(Error::InvalidArgument(
            "top_n must be at least 1".to_string(),
        ));
    }
    Ok(())
}
