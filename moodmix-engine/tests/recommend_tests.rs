//! End-to-end tests: CSV on disk through model build to query answers

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moodmix_common::config::{SchemaConfig, TomlConfig};
use moodmix_common::Error;
use moodmix_engine::cluster::KMeansConfig;
use moodmix_engine::dataset::{FeatureSchema, LoadOptions};
use moodmix_engine::enrich::{
    EnrichmentSource, ExternalLookupError, LookupQuery, LookupStage, MetadataEnricher, StageHit,
    StageOutcome,
};
use moodmix_engine::metrics;
use moodmix_engine::{ModelHandle, QueryOrchestrator, RecommendationModel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::NamedTempFile;

const FEATURES: [&str; 4] = ["energy", "valence", "tempo", "danceability"];
const PLACEHOLDER: &str = "https://example.com/default_artwork.png";

fn write_dataset(rows: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "name,artists,album,year,duration_ms,energy,valence,tempo,danceability"
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(2024);
    for i in 0..rows {
        let name = if i == 0 {
            "Track A".to_string()
        } else {
            format!("Song {}", i)
        };
        writeln!(
            file,
            "{},\"['Artist {}']\",Album {},{},{},{:.4},{:.4},{:.2},{:.4}",
            name,
            i % 40,
            i % 25,
            1990 + (i % 30),
            150_000 + i * 100,
            rng.gen::<f64>(),
            rng.gen::<f64>(),
            rng.gen_range(60.0..200.0),
            rng.gen::<f64>(),
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

fn kmeans() -> KMeansConfig {
    KMeansConfig {
        k: 150,
        seed: 42,
        max_iterations: 300,
    }
}

fn build_model(file: &NamedTempFile) -> RecommendationModel {
    let schema = FeatureSchema::from_names(&FEATURES).unwrap();
    RecommendationModel::load(file.path(), schema, &LoadOptions::default(), &kmeans()).unwrap()
}

fn orchestrator(model: RecommendationModel) -> QueryOrchestrator {
    QueryOrchestrator::new(
        ModelHandle::new(model),
        Arc::new(MetadataEnricher::disabled(PLACEHOLDER)),
        Some(0.8),
    )
}

#[tokio::test]
async fn test_recommend_known_track() {
    let file = write_dataset(500);
    let orchestrator = orchestrator(build_model(&file));

    let recommendation = orchestrator.recommend("Track A", 5).await.unwrap();
    assert_eq!(recommendation.resolved_track.name, "Track A");
    assert_eq!(recommendation.resolved_track.index, 0);
    assert_eq!(recommendation.results.len(), 5);

    let results = &recommendation.results;
    assert!(results.iter().all(|r| r.track.name != "Track A"));
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));

    // Enrichment disabled: every result carries the exhausted-chain defaults
    for r in results {
        assert_eq!(r.source, EnrichmentSource::None);
        assert_eq!(r.artwork, PLACEHOLDER);
        assert!(r.preview.is_none());
        assert!(r.fallback_video.is_none());
    }
}

/// Stage that either errors or stalls past its timeout on every lookup
struct BrokenStage {
    source: EnrichmentSource,
    stall: bool,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl LookupStage for BrokenStage {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn source(&self) -> EnrichmentSource {
        self.source
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(50)
    }

    async fn lookup(&self, _query: &LookupQuery) -> StageOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            tokio::time::sleep(Duration::from_secs(2)).await;
            return StageOutcome::Found(StageHit {
                artwork: Some("late.jpg".into()),
                preview: Some("late.m4a".into()),
                video_url: None,
            });
        }
        StageOutcome::Failed(ExternalLookupError::Status(503))
    }
}

#[tokio::test]
async fn test_recommend_survives_every_stage_failing() {
    let file = write_dataset(500);
    let provider_calls = Arc::new(AtomicUsize::new(0));
    let video_calls = Arc::new(AtomicUsize::new(0));
    let stages: Vec<Box<dyn LookupStage>> = vec![
        Box::new(BrokenStage {
            source: EnrichmentSource::Provider,
            stall: false,
            calls: provider_calls.clone(),
        }),
        Box::new(BrokenStage {
            source: EnrichmentSource::VideoFallback,
            stall: true,
            calls: video_calls.clone(),
        }),
    ];
    let enricher = MetadataEnricher::new(stages, PLACEHOLDER, 100, Duration::from_secs(60));
    let orchestrator = QueryOrchestrator::new(
        ModelHandle::new(build_model(&file)),
        Arc::new(enricher),
        Some(0.8),
    );

    let recommendation = orchestrator.recommend("Track A", 5).await.unwrap();
    let results = &recommendation.results;
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.track.name != "Track A"));
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    for r in results {
        assert_eq!(r.source, EnrichmentSource::None);
        assert_eq!(r.artwork, PLACEHOLDER);
        assert!(r.preview.is_none());
        assert!(r.fallback_video.is_none());
    }

    // Each neighbor went through both stages
    assert_eq!(provider_calls.load(Ordering::SeqCst), 5);
    assert_eq!(video_calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_recommend_is_case_insensitive() {
    let file = write_dataset(100);
    let orchestrator = orchestrator(build_model(&file));

    let recommendation = orchestrator.recommend("  track a ", 3).await.unwrap();
    assert_eq!(recommendation.resolved_track.index, 0);
}

#[tokio::test]
async fn test_recommend_unknown_track_is_not_found() {
    let file = write_dataset(100);
    let orchestrator = orchestrator(build_model(&file));

    let err = orchestrator
        .recommend("nonexistent track xyz", 5)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_invalid_arguments() {
    let file = write_dataset(100);
    let orchestrator = orchestrator(build_model(&file));

    assert!(matches!(
        orchestrator.recommend("Track A", 0).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        orchestrator.search("Song", 0).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        orchestrator.recommend_for_features(&[0.5, 0.5], 3).await,
        Err(Error::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_search() {
    let file = write_dataset(100);
    let orchestrator = orchestrator(build_model(&file));

    assert!(orchestrator.search("", 10).await.unwrap().is_empty());
    assert!(orchestrator.search("   ", 10).await.unwrap().is_empty());
    assert!(orchestrator.search("no such title", 10).await.unwrap().is_empty());

    let hits = orchestrator.search("song 1", 5).await.unwrap();
    assert_eq!(hits.len(), 5);
    assert_eq!(hits[0].name, "Song 1");
    assert!(hits.iter().all(|h| h.name.to_lowercase().contains("song 1")));
}

#[tokio::test]
async fn test_recommend_for_features() {
    let file = write_dataset(200);
    let orchestrator = orchestrator(build_model(&file));

    let results = orchestrator
        .recommend_for_features(&[0.5, 0.5, 120.0, 0.5], 4)
        .await
        .unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[test]
fn test_normalized_components_in_unit_range() {
    let file = write_dataset(300);
    let model = build_model(&file);

    assert_eq!(model.len(), 300);
    for track in model.tracks() {
        assert_eq!(track.normalized.len(), FEATURES.len());
        assert!(track
            .normalized
            .iter()
            .all(|v| (0.0..=1.0).contains(v)));
    }
}

#[test]
fn test_every_cluster_is_populated() {
    let file = write_dataset(500);
    let model = build_model(&file);

    assert_eq!(model.clusters().k(), 150);
    assert!(model.cluster_report().iter().all(|c| c.size > 0));
}

#[test]
fn test_rebuild_is_deterministic() {
    let file = write_dataset(500);
    let first = build_model(&file);
    let second = build_model(&file);

    assert_eq!(first.clusters().labels, second.clusters().labels);
    assert_eq!(
        first.neighbors(0, 10).unwrap(),
        second.neighbors(0, 10).unwrap()
    );
}

#[test]
fn test_zero_variance_column_normalizes_to_zero() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "name,artists,energy,liveness").unwrap();
    for i in 0..20 {
        writeln!(file, "Song {},Artist,{:.2},0.35", i, i as f64 / 20.0).unwrap();
    }
    file.flush().unwrap();

    let schema = FeatureSchema::from_names(&["energy", "liveness"]).unwrap();
    let kmeans = KMeansConfig {
        k: 3,
        seed: 1,
        max_iterations: 100,
    };
    let model =
        RecommendationModel::load(file.path(), schema, &LoadOptions::default(), &kmeans).unwrap();

    assert!(model.tracks().iter().all(|t| t.normalized[1] == 0.0));
    assert_eq!(model.params().bounds()[1].min, 0.35);
}

#[test]
fn test_schema_mismatch_is_data_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "name,artists,energy").unwrap();
    writeln!(file, "Song,Artist,0.5").unwrap();
    file.flush().unwrap();

    let schema = FeatureSchema::from_names(&FEATURES).unwrap();
    let err = RecommendationModel::load(file.path(), schema, &LoadOptions::default(), &kmeans())
        .unwrap_err();
    assert!(matches!(err, Error::Data(_)));
}

#[test]
fn test_evaluate_reports_bounded_metrics() {
    let file = write_dataset(300);
    let model = build_model(&file);

    let report = metrics::evaluate(&model, 50, 5, 7).unwrap();
    assert_eq!(report.evaluated + report.skipped, 50);
    for value in [
        report.precision,
        report.recall,
        report.f1,
        report.ndcg,
        report.accuracy,
    ] {
        assert!((0.0..=1.0).contains(&value));
    }
}

#[tokio::test]
async fn test_handle_rebuild_from_config() {
    let file = write_dataset(200);
    let handle = ModelHandle::new(build_model(&file));
    let before = handle.snapshot().await;

    let mut config = TomlConfig::default();
    config.dataset_path = Some(file.path().to_path_buf());
    config.schema = SchemaConfig::from_names(&FEATURES);
    config.clustering.k = 150;
    config.clustering.seed = 42;

    let rebuilt = handle
        .rebuild(config, Some(file.path().to_path_buf()))
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&before, &rebuilt));
    assert_eq!(before.clusters().labels, rebuilt.clusters().labels);
}
