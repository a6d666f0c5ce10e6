//! Feature normalizer
//!
//! Min-max scaling of every feature column into [0, 1]. Clustering and the
//! nearest-neighbor search are distance based, so without this step columns
//! with a wide raw range (tempo in BPM) would dominate columns already in
//! [0, 1] (valence).
//!
//! Bounds are fitted once over the cleaned dataset and reused for every later
//! transform, including ad hoc query vectors.

use crate::dataset::TrackRecord;
use moodmix_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Observed (min, max) of one feature column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureBounds {
    pub min: f64,
    pub max: f64,
}

impl FeatureBounds {
    /// Scale one raw value; zero-variance columns map to 0
    pub fn scale(&self, value: f64) -> f32 {
        let range = self.max - self.min;
        if range <= 0.0 {
            return 0.0;
        }
        ((value - self.min) / range).clamp(0.0, 1.0) as f32
    }
}

/// Per-feature bounds, immutable after fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParameters {
    bounds: Vec<FeatureBounds>,
}

impl NormalizationParameters {
    pub fn dimension(&self) -> usize {
        self.bounds.len()
    }

    pub fn bounds(&self) -> &[FeatureBounds] {
        &self.bounds
    }

    /// Map a raw feature vector into the normalized space
    pub fn transform(&self, raw: &[f64]) -> Result<Vec<f32>> {
        if raw.len() != self.bounds.len() {
            return Err(Error::InvalidArgument(format!(
                "feature vector has {} components, expected {}",
                raw.len(),
                self.bounds.len()
            )));
        }
        if let Some(pos) = raw.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidArgument(format!(
                "feature component {} is not a finite number",
                pos
            )));
        }
        Ok(self
            .bounds
            .iter()
            .zip(raw)
            .map(|(b, &v)| b.scale(v))
            .collect())
    }
}

/// Fit bounds over the raw features of every record
pub fn fit(records: &[TrackRecord]) -> Result<NormalizationParameters> {
    fit_vectors(records.iter().map(|r| r.features.as_slice()))
}

/// Fit bounds over raw feature rows of equal dimension
pub fn fit_vectors<'a, I>(rows: I) -> Result<NormalizationParameters>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut bounds: Option<Vec<FeatureBounds>> = None;

    for row in rows {
        let current = bounds.get_or_insert_with(|| {
            vec![
                FeatureBounds {
                    min: f64::INFINITY,
                    max: f64::NEG_INFINITY,
                };
                row.len()
            ]
        });
        if row.len() != current.len() {
            return Err(Error::InvalidArgument(format!(
                "feature rows differ in dimension ({} vs {})",
                row.len(),
                current.len()
            )));
        }
        for (b, &v) in current.iter_mut().zip(row) {
            if !v.is_finite() {
                return Err(Error::InvalidArgument(
                    "cannot fit bounds over non-finite values".to_string(),
                ));
            }
            b.min = b.min.min(v);
            b.max = b.max.max(v);
        }
    }

    match bounds {
        Some(bounds) if !bounds.is_empty() => Ok(NormalizationParameters { bounds }),
        _ => Err(Error::InvalidArgument(
            "cannot fit normalization bounds over an empty dataset".to_string(),
        )),
    }
}

/// Free-function form of [`NormalizationParameters::transform`]
pub fn transform(raw: &[f64], params: &NormalizationParameters) -> Result<Vec<f32>> {
    params.transform(raw)
}
