//! Recommendation model and its shared handle
//!
//! A [`RecommendationModel`] owns everything derived from one dataset load:
//! cleaned records, normalization parameters, cluster assignment with mood
//! labels, the similarity index and the title lookup table. It is built in
//! one pass and never mutated afterwards.
//!
//! [`ModelHandle`] is the process-wide access point. Readers take a cheap
//! `Arc` snapshot; a rebuild constructs a complete new model off the async
//! runtime and then swaps the pointer, so a partially built model is never
//! observable.

use crate::cluster::{self, ClusterModel, KMeansConfig};
use crate::dataset::{self, FeatureSchema, LoadOptions, TrackRecord};
use crate::index::{Neighbor, SimilarityIndex};
use crate::mood;
use crate::normalize::{self, NormalizationParameters};
use crate::search::TitleIndex;
use moodmix_common::config::{resolve_dataset_path, TomlConfig};
use moodmix_common::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::info;

/// Cleaned record plus its derived position in feature space
#[derive(Debug, Clone)]
pub struct IndexedTrack {
    pub record: TrackRecord,
    /// Normalized features, every component in [0, 1]
    pub normalized: Vec<f32>,
    pub cluster: usize,
}

/// Display form of a track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub index: usize,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub release_year: Option<i32>,
    /// `m:ss`
    pub duration: Option<String>,
    pub cluster: usize,
    pub cluster_mood: String,
}

/// Size and mood of one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    pub mood: String,
}

#[derive(Debug)]
pub struct RecommendationModel {
    schema: FeatureSchema,
    params: NormalizationParameters,
    tracks: Vec<IndexedTrack>,
    clusters: ClusterModel,
    moods: Vec<String>,
    index: SimilarityIndex,
    titles: TitleIndex,
}

impl RecommendationModel {
    /// Normalize, cluster, label and index `records`
    pub fn build(
        records: Vec<TrackRecord>,
        schema: FeatureSchema,
        kmeans: &KMeansConfig,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::Data(
                "cannot build a model from an empty dataset".to_string(),
            ));
        }
        if let Some(bad) = records
            .iter()
            .find(|r| r.features.len() != schema.dimension())
        {
            return Err(Error::Data(format!(
                "track {} has {} features, schema declares {}",
                bad.index,
                bad.features.len(),
                schema.dimension()
            )));
        }

        let started = Instant::now();
        let params = normalize::fit(&records)?;
        let normalized = records
            .iter()
            .map(|r| params.transform(&r.features))
            .collect::<Result<Vec<_>>>()?;

        let clusters = cluster::fit(&normalized, kmeans)?;
        let moods = mood::label_clusters(&schema, &normalized, &clusters.labels, clusters.k());
        let index = SimilarityIndex::build(&normalized)?;
        let titles = TitleIndex::build(&records);

        let tracks: Vec<IndexedTrack> = records
            .into_iter()
            .zip(normalized)
            .zip(&clusters.labels)
            .map(|((record, normalized), &cluster)| IndexedTrack {
                record,
                normalized,
                cluster,
            })
            .collect();

        info!(
            tracks = tracks.len(),
            dimension = schema.dimension(),
            k = clusters.k(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recommendation model built"
        );

        Ok(Self {
            schema,
            params,
            tracks,
            clusters,
            moods,
            index,
            titles,
        })
    }

    /// Load the dataset at `path` and build a model over it
    pub fn load(
        path: &Path,
        schema: FeatureSchema,
        options: &LoadOptions,
        kmeans: &KMeansConfig,
    ) -> Result<Self> {
        let records = dataset::load(path, &schema, options)?;
        Self::build(records, schema, kmeans)
    }

    /// Build from configuration; `dataset` overrides the configured path
    pub fn from_config(config: &TomlConfig, dataset: Option<&Path>) -> Result<Self> {
        let path = resolve_dataset_path(dataset, config)?;
        let schema = FeatureSchema::from_config(&config.schema)?;
        Self::load(
            &path,
            schema,
            &LoadOptions::from(&config.cleaning),
            &KMeansConfig::from(&config.clustering),
        )
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn params(&self) -> &NormalizationParameters {
        &self.params
    }

    pub fn tracks(&self) -> &[IndexedTrack] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&IndexedTrack> {
        self.tracks.get(index)
    }

    pub fn clusters(&self) -> &ClusterModel {
        &self.clusters
    }

    pub fn titles(&self) -> &TitleIndex {
        &self.titles
    }

    /// Mood label of a cluster id
    pub fn mood(&self, cluster: usize) -> &str {
        self.moods
            .get(cluster)
            .map(String::as_str)
            .unwrap_or(mood::UNLABELED)
    }

    /// Nearest neighbors of an indexed track, the track itself excluded
    pub fn neighbors(&self, index: usize, k: usize) -> Result<Vec<Neighbor>> {
        self.index.query_track(index, k)
    }

    /// Nearest neighbors of a raw feature vector in schema order
    pub fn neighbors_for_features(&self, raw: &[f64], k: usize) -> Result<Vec<Neighbor>> {
        let normalized = self.params.transform(raw)?;
        self.index.query(&normalized, k)
    }

    pub fn summary(&self, index: usize) -> Option<TrackSummary> {
        let track = self.track(index)?;
        let record = &track.record;
        Some(TrackSummary {
            index,
            name: record.name.clone(),
            artists: record.artists.clone(),
            album: record.album.clone(),
            release_year: record.release_year,
            duration: record.duration_display(),
            cluster: track.cluster,
            cluster_mood: self.mood(track.cluster).to_string(),
        })
    }

    /// Size and mood of every cluster, by cluster id
    pub fn cluster_report(&self) -> Vec<ClusterSummary> {
        self.clusters
            .sizes()
            .into_iter()
            .enumerate()
            .map(|(cluster, size)| ClusterSummary {
                cluster,
                size,
                mood: self.mood(cluster).to_string(),
            })
            .collect()
    }

    /// Approximate silhouette of the clustering over a seeded sample
    pub fn silhouette(&self, sample_size: usize, seed: u64) -> Option<f64> {
        let vectors: Vec<&[f32]> = self.tracks.iter().map(|t| t.normalized.as_slice()).collect();
        cluster::silhouette_sample(&vectors, &self.clusters.labels, sample_size, seed)
    }
}

/// Shared, atomically replaceable model pointer
#[derive(Debug, Clone)]
pub struct ModelHandle {
    inner: Arc<RwLock<Arc<RecommendationModel>>>,
}

impl ModelHandle {
    pub fn new(model: RecommendationModel) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(model))),
        }
    }

    /// Current model; stays valid across later rebuilds
    pub async fn snapshot(&self) -> Arc<RecommendationModel> {
        self.inner.read().await.clone()
    }

    /// Replace the current model
    pub async fn publish(&self, model: RecommendationModel) -> Arc<RecommendationModel> {
        let model = Arc::new(model);
        *self.inner.write().await = model.clone();
        info!(tracks = model.len(), "Recommendation model published");
        model
    }

    /// Run `build` on a blocking thread and publish its result
    ///
    /// On failure the current model stays in place.
    pub async fn rebuild_with<F>(&self, build: F) -> Result<Arc<RecommendationModel>>
    where
        F: FnOnce() -> Result<RecommendationModel> + Send + 'static,
    {
        let model = tokio::task::spawn_blocking(build)
            .await
            .map_err(|e| Error::Internal(format!("model build task failed: {}", e)))??;
        Ok(self.publish(model).await)
    }

    /// Reload the dataset and rebuild from configuration
    pub async fn rebuild(
        &self,
        config: TomlConfig,
        dataset: Option<PathBuf>,
    ) -> Result<Arc<RecommendationModel>> {
        self.rebuild_with(move || RecommendationModel::from_config(&config, dataset.as_deref()))
            .await
    }
}
