//! Dataset loader and cleaner
//!
//! Reads the tabular track dataset (CSV with a header row) and returns the
//! cleaned records in input order.
//!
//! Cleaning policy:
//! - rows without a track name are dropped
//! - unparseable, non-finite, or out-of-bounds feature values count as missing
//! - rows whose missing fraction exceeds `max_missing_fraction` are dropped;
//!   the remaining gaps are filled with the column mean of the kept rows
//! - duplicate (name, primary artist) pairs keep the first occurrence
//!
//! A missing required column, an unreadable file, or zero valid rows is a
//! fatal `Error::Data`.

use super::record::{parse_artists, TrackRecord};
use super::schema::FeatureSchema;
use moodmix_common::config::CleaningConfig;
use moodmix_common::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, trace, warn};

const NAME_COLUMN: &str = "name";
const ARTISTS_COLUMN: &str = "artists";
const ALBUM_COLUMN: &str = "album";
const YEAR_COLUMN: &str = "year";
const RELEASE_DATE_COLUMN: &str = "release_date";
const DURATION_COLUMN: &str = "duration_ms";

/// Cleaning options
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub max_missing_fraction: f64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_missing_fraction: 0.0,
        }
    }
}

impl From<&CleaningConfig> for LoadOptions {
    fn from(config: &CleaningConfig) -> Self {
        Self {
            max_missing_fraction: config.max_missing_fraction,
        }
    }
}

/// Per-reason counters from one load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_read: usize,
    pub dropped_malformed: usize,
    pub dropped_missing_name: usize,
    pub dropped_missing_features: usize,
    pub dropped_duplicates: usize,
    pub repaired_values: usize,
    pub kept: usize,
}

/// Column positions resolved from the header row
struct ColumnMap {
    name: usize,
    artists: usize,
    album: Option<usize>,
    year: Option<usize>,
    release_date: Option<usize>,
    duration: Option<usize>,
    features: Vec<usize>,
}

impl ColumnMap {
    fn resolve(headers: &csv::StringRecord, schema: &FeatureSchema) -> Result<Self> {
        let positions: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h, i))
            .collect();

        let mut missing = Vec::new();
        let mut required = |name: &str| -> usize {
            match positions.get(name) {
                Some(&i) => i,
                None => {
                    missing.push(name.to_string());
                    usize::MAX
                }
            }
        };

        let name = required(NAME_COLUMN);
        let artists = required(ARTISTS_COLUMN);
        let features: Vec<usize> = schema.names().map(&mut required).collect();

        if !missing.is_empty() {
            return Err(Error::Data(format!(
                "dataset schema mismatch: missing column(s) {}",
                missing.join(", ")
            )));
        }

        let ignored: Vec<&str> = headers
            .iter()
            .filter(|h| {
                ![
                    NAME_COLUMN,
                    ARTISTS_COLUMN,
                    ALBUM_COLUMN,
                    YEAR_COLUMN,
                    RELEASE_DATE_COLUMN,
                    DURATION_COLUMN,
                ]
                .contains(h)
                    && schema.position(h).is_none()
            })
            .collect();
        if !ignored.is_empty() {
            debug!(columns = ?ignored, "Ignoring dataset columns outside the schema");
        }

        Ok(Self {
            name,
            artists,
            album: positions.get(ALBUM_COLUMN).copied(),
            year: positions.get(YEAR_COLUMN).copied(),
            release_date: positions.get(RELEASE_DATE_COLUMN).copied(),
            duration: positions.get(DURATION_COLUMN).copied(),
            features,
        })
    }
}

/// Row that passed the name and missing-fraction filters
struct CandidateRow {
    name: String,
    artists: Vec<String>,
    album: String,
    release_year: Option<i32>,
    duration_ms: Option<u64>,
    features: Vec<Option<f64>>,
}

/// Load and clean the dataset at `path`
pub fn load(path: &Path, schema: &FeatureSchema, options: &LoadOptions) -> Result<Vec<TrackRecord>> {
    let (records, report) = load_with_report(path, schema, options)?;
    info!(
        path = %path.display(),
        rows_read = report.rows_read,
        kept = report.kept,
        dropped_malformed = report.dropped_malformed,
        dropped_missing_name = report.dropped_missing_name,
        dropped_missing_features = report.dropped_missing_features,
        dropped_duplicates = report.dropped_duplicates,
        repaired_values = report.repaired_values,
        "Dataset loaded"
    );
    Ok(records)
}

/// Load and clean the dataset at `path`, returning the cleaning counters
pub fn load_with_report(
    path: &Path,
    schema: &FeatureSchema,
    options: &LoadOptions,
) -> Result<(Vec<TrackRecord>, LoadReport)> {
    let file = File::open(path).map_err(|e| {
        Error::Data(format!("cannot open dataset {}: {}", path.display(), e))
    })?;
    load_from_reader(file, schema, options)
}

/// Load and clean CSV data from any reader
pub fn load_from_reader<R: Read>(
    reader: R,
    schema: &FeatureSchema,
    options: &LoadOptions,
) -> Result<(Vec<TrackRecord>, LoadReport)> {
    if !(0.0..=1.0).contains(&options.max_missing_fraction) {
        return Err(Error::InvalidArgument(format!(
            "max_missing_fraction must be within [0, 1], got {}",
            options.max_missing_fraction
        )));
    }

    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| Error::Data(format!("cannot read dataset header: {}", e)))?
        .clone();
    let columns = ColumnMap::resolve(&headers, schema)?;

    let dimension = schema.dimension();
    let mut report = LoadReport::default();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut candidates: Vec<CandidateRow> = Vec::new();

    for (row_number, result) in csv_reader.records().enumerate() {
        report.rows_read += 1;
        let row = match result {
            Ok(row) => row,
            Err(e) if e.is_io_error() => {
                return Err(Error::Data(format!("dataset read failed: {}", e)));
            }
            Err(e) => {
                trace!(row = row_number, error = %e, "Dropping malformed row");
                report.dropped_malformed += 1;
                continue;
            }
        };

        let name = row.get(columns.name).map(str::trim).unwrap_or("");
        if name.is_empty() {
            trace!(row = row_number, "Dropping row without a name");
            report.dropped_missing_name += 1;
            continue;
        }

        let features: Vec<Option<f64>> = schema
            .columns()
            .iter()
            .zip(&columns.features)
            .map(|(column, &pos)| {
                row.get(pos)
                    .and_then(parse_number)
                    .filter(|v| column.accepts(*v))
            })
            .collect();

        let missing = features.iter().filter(|v| v.is_none()).count();
        if missing > 0 && missing as f64 / dimension as f64 > options.max_missing_fraction {
            trace!(row = row_number, name = %name, missing, "Dropping row with missing features");
            report.dropped_missing_features += 1;
            continue;
        }

        let artists = row.get(columns.artists).map(parse_artists).unwrap_or_default();
        let key = dedup_key(name, artists.first().map(String::as_str).unwrap_or(""));
        if !seen.insert(key) {
            trace!(row = row_number, name = %name, "Dropping duplicate track");
            report.dropped_duplicates += 1;
            continue;
        }

        candidates.push(CandidateRow {
            name: name.to_string(),
            artists,
            album: columns
                .album
                .and_then(|i| row.get(i))
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            release_year: parse_release_year(&row, &columns),
            duration_ms: columns
                .duration
                .and_then(|i| row.get(i))
                .and_then(parse_number)
                .filter(|v| *v >= 0.0)
                .map(|v| v as u64),
            features,
        });
    }

    if candidates.is_empty() {
        return Err(Error::Data(format!(
            "dataset contains no valid rows ({} read)",
            report.rows_read
        )));
    }

    let fill = column_means(&candidates, dimension);
    let duration_feature = schema.position(DURATION_COLUMN);

    let records: Vec<TrackRecord> = candidates
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let features: Vec<f64> = row
                .features
                .iter()
                .enumerate()
                .map(|(i, v)| match v {
                    Some(v) => *v,
                    None => {
                        report.repaired_values += 1;
                        fill[i]
                    }
                })
                .collect();
            let duration_ms = row
                .duration_ms
                .or_else(|| duration_feature.map(|i| features[i].max(0.0) as u64));
            TrackRecord {
                index,
                name: row.name,
                artists: row.artists,
                album: row.album,
                release_year: row.release_year,
                duration_ms,
                features,
            }
        })
        .collect();

    report.kept = records.len();
    if report.repaired_values > 0 {
        warn!(
            repaired = report.repaired_values,
            "Filled missing feature values with column means"
        );
    }

    Ok((records, report))
}

/// Case-insensitive (name, primary artist) identity
fn dedup_key(name: &str, primary_artist: &str) -> (String, String) {
    (
        name.trim().to_lowercase(),
        primary_artist.trim().to_lowercase(),
    )
}

fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_release_year(row: &csv::StringRecord, columns: &ColumnMap) -> Option<i32> {
    let from_year = columns
        .year
        .and_then(|i| row.get(i))
        .and_then(parse_number)
        .map(|v| v as i32)
        .filter(|y| *y > 0);

    from_year.or_else(|| {
        columns
            .release_date
            .and_then(|i| row.get(i))
            .and_then(|s| s.trim().get(..4))
            .and_then(|s| s.parse::<i32>().ok())
            .filter(|y| *y > 0)
    })
}

/// Mean of each column over rows where the value is present
fn column_means(rows: &[CandidateRow], dimension: usize) -> Vec<f64> {
    let mut sums = vec![0.0_f64; dimension];
    let mut counts = vec![0_usize; dimension];
    for row in rows {
        for (i, v) in row.features.iter().enumerate() {
            if let Some(v) = v {
                sums[i] += v;
                counts[i] += 1;
            }
        }
    }
    sums.iter()
        .zip(&counts)
        .map(|(sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
        .collect()
}
