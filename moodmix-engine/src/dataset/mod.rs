//! Dataset ingestion: feature schema, track records, loader/cleaner

pub mod loader;
pub mod record;
pub mod schema;

pub use loader::{load, load_from_reader, load_with_report, LoadOptions, LoadReport};
pub use record::{format_duration, parse_artists, TrackRecord};
pub use schema::{FeatureColumn, FeatureSchema};
