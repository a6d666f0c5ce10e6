//! moodmix engine
//!
//! Content-based song recommendation over tabular audio features:
//!
//! - `dataset`: CSV loading and cleaning against an explicit feature schema
//! - `normalize`: min-max scaling into [0, 1]
//! - `cluster`: seeded k-means with empty-cluster recovery
//! - `mood`: post-hoc cluster mood names
//! - `index`: exact cosine nearest-neighbor search
//! - `search`: title matching and resolution
//! - `enrich`: artwork, preview and video lookups behind a cached stage chain
//! - `model`: the immutable recommendation model and its swappable handle
//! - `orchestrator`: the query surface
//! - `metrics`: offline ranking evaluation

pub mod cluster;
pub mod dataset;
pub mod enrich;
pub mod index;
pub mod metrics;
pub mod model;
pub mod mood;
pub mod normalize;
pub mod orchestrator;
pub mod search;

pub use dataset::{FeatureSchema, TrackRecord};
pub use enrich::{Enrichment, EnrichmentSource, MetadataEnricher};
pub use model::{ModelHandle, RecommendationModel, TrackSummary};
pub use orchestrator::{QueryOrchestrator, Recommendation, RecommendationResult};
