//! Cluster assigner
//!
//! Partitions the normalized feature space with k-means (Lloyd iterations,
//! squared Euclidean distance). Cluster ids are arbitrary partition labels
//! in `[0, k)`; mood names are attached afterwards by [`crate::mood`].
//!
//! # Determinism
//! Initialization is k-means++ driven by a `StdRng` seeded from
//! [`KMeansConfig::seed`]. Every subsequent step is deterministic, so two
//! fits over identical input with the same seed produce identical labels.
//!
//! # Empty clusters
//! When a cluster loses all its members, it is reseeded from the point
//! farthest from its own centroid (taken only from clusters that keep at
//! least one member).

use moodmix_common::config::ClusteringConfig;
use moodmix_common::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

/// K-means parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KMeansConfig {
    pub k: usize,
    pub seed: u64,
    pub max_iterations: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 150,
            seed: 42,
            max_iterations: 300,
        }
    }
}

impl From<&ClusteringConfig> for KMeansConfig {
    fn from(config: &ClusteringConfig) -> Self {
        Self {
            k: config.k,
            seed: config.seed,
            max_iterations: config.max_iterations,
        }
    }
}

/// Result of a k-means fit
#[derive(Debug, Clone, Serialize)]
pub struct ClusterModel {
    /// Cluster id per input vector
    pub labels: Vec<usize>,
    /// Centroid per cluster id
    pub centroids: Vec<Vec<f32>>,
    /// Lloyd iterations run
    pub iterations: usize,
    /// False when the iteration cap was hit before labels stabilized
    pub converged: bool,
    /// Sum of squared distances to assigned centroids
    pub inertia: f64,
}

impl ClusterModel {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    /// Number of members per cluster id
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }
}

#[inline]
fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum()
}

/// Fit k-means over `vectors`
pub fn fit<V: AsRef<[f32]>>(vectors: &[V], config: &KMeansConfig) -> Result<ClusterModel> {
    if config.k == 0 {
        return Err(Error::InvalidArgument("k must be at least 1".to_string()));
    }
    if config.max_iterations == 0 {
        return Err(Error::InvalidArgument(
            "max_iterations must be at least 1".to_string(),
        ));
    }
    let n = vectors.len();
    if n == 0 {
        return Err(Error::InvalidArgument(
            "cannot cluster an empty set of vectors".to_string(),
        ));
    }
    let dimension = vectors[0].as_ref().len();
    if vectors.iter().any(|v| v.as_ref().len() != dimension) {
        return Err(Error::InvalidArgument(
            "vectors differ in dimension".to_string(),
        ));
    }

    let k = if config.k > n {
        warn!(k = config.k, n, "Fewer points than clusters, clamping k to the point count");
        n
    } else {
        config.k
    };

    let mut centroids = kmeans_plus_plus(vectors, k, config.seed);
    let mut labels = vec![usize::MAX; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        iterations += 1;
        let changed = assign_labels(vectors, &centroids, &mut labels);
        if changed == 0 {
            converged = true;
            break;
        }
        update_centroids(vectors, &mut centroids, &mut labels);
        debug!(iteration = iterations, changed, "k-means iteration");
    }

    let inertia = vectors
        .iter()
        .zip(&labels)
        .map(|(v, &l)| squared_distance(v.as_ref(), &centroids[l]))
        .sum();

    info!(k, iterations, converged, inertia, "k-means fit complete");

    Ok(ClusterModel {
        labels,
        centroids,
        iterations,
        converged,
        inertia,
    })
}

/// k-means++ seeding
fn kmeans_plus_plus<V: AsRef<[f32]>>(vectors: &[V], k: usize, seed: u64) -> Vec<Vec<f32>> {
    let n = vectors.len();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut chosen = vec![false; n];
    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);

    let first = rng.gen_range(0..n);
    chosen[first] = true;
    centroids.push(vectors[first].as_ref().to_vec());

    let mut closest = vec![f64::INFINITY; n];
    while centroids.len() < k {
        let last = &centroids[centroids.len() - 1];
        for (i, v) in vectors.iter().enumerate() {
            let d = squared_distance(v.as_ref(), last);
            if d < closest[i] {
                closest[i] = d;
            }
        }

        let total: f64 = closest.iter().sum();
        let pick = if total > 0.0 && total.is_finite() {
            weighted_pick(&closest, rng.gen::<f64>() * total)
        } else {
            // Every remaining point coincides with a centroid
            (0..n).find(|&i| !chosen[i]).unwrap_or(0)
        };

        chosen[pick] = true;
        centroids.push(vectors[pick].as_ref().to_vec());
    }

    centroids
}

/// Index whose cumulative weight first reaches `target`
fn weighted_pick(weights: &[f64], target: f64) -> usize {
    let mut acc = 0.0;
    let mut last_positive = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        acc += w;
        last_positive = i;
        if acc >= target {
            return i;
        }
    }
    last_positive
}

/// Assign every vector to its nearest centroid (ties go to the lower id).
/// Returns the number of labels that changed.
fn assign_labels<V: AsRef<[f32]>>(
    vectors: &[V],
    centroids: &[Vec<f32>],
    labels: &mut [usize],
) -> usize {
    let mut changed = 0;
    for (v, label) in vectors.iter().zip(labels.iter_mut()) {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (j, c) in centroids.iter().enumerate() {
            let d = squared_distance(v.as_ref(), c);
            if d < best_distance {
                best_distance = d;
                best = j;
            }
        }
        if *label != best {
            *label = best;
            changed += 1;
        }
    }
    changed
}

/// Recompute centroids as member means and reseed empty clusters
fn update_centroids<V: AsRef<[f32]>>(
    vectors: &[V],
    centroids: &mut [Vec<f32>],
    labels: &mut [usize],
) {
    let k = centroids.len();
    let dimension = centroids.first().map(Vec::len).unwrap_or(0);
    let mut sums = vec![vec![0.0_f64; dimension]; k];
    let mut counts = vec![0_usize; k];

    for (v, &label) in vectors.iter().zip(labels.iter()) {
        counts[label] += 1;
        for (s, x) in sums[label].iter_mut().zip(v.as_ref()) {
            *s += f64::from(*x);
        }
    }

    for j in 0..k {
        if counts[j] > 0 {
            let count = counts[j] as f64;
            centroids[j] = sums[j].iter().map(|s| (s / count) as f32).collect();
        }
    }

    let empty: Vec<usize> = (0..k).filter(|&j| counts[j] == 0).collect();
    if empty.is_empty() {
        return;
    }

    // Farthest points first, lower index on ties
    let mut candidates: Vec<(usize, f64)> = vectors
        .iter()
        .zip(labels.iter())
        .enumerate()
        .map(|(i, (v, &l))| (i, squared_distance(v.as_ref(), &centroids[l])))
        .collect();
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut next = 0;
    for j in empty {
        while next < candidates.len() && counts[labels[candidates[next].0]] <= 1 {
            next += 1;
        }
        let Some(&(point, distance)) = candidates.get(next) else {
            warn!(cluster = j, "No donor point available for empty cluster");
            continue;
        };
        next += 1;

        let donor = labels[point];
        counts[donor] -= 1;
        counts[j] = 1;
        labels[point] = j;
        centroids[j] = vectors[point].as_ref().to_vec();
        debug!(cluster = j, point, distance, "Reseeded empty cluster");
    }
}

/// Approximate mean silhouette coefficient over a seeded subsample
///
/// Returns `None` when the sample holds fewer than two clusters.
pub fn silhouette_sample<V: AsRef<[f32]>>(
    vectors: &[V],
    labels: &[usize],
    sample_size: usize,
    seed: u64,
) -> Option<f64> {
    let n = vectors.len().min(labels.len());
    if n < 2 || sample_size < 2 {
        return None;
    }

    let mut sample: Vec<usize> = if n <= sample_size {
        (0..n).collect()
    } else {
        let mut rng = StdRng::seed_from_u64(seed);
        rand::seq::index::sample(&mut rng, n, sample_size).into_vec()
    };
    sample.sort_unstable();

    let k = sample.iter().map(|&i| labels[i]).max().unwrap_or(0) + 1;
    let mut members = vec![0_usize; k];
    for &i in &sample {
        members[labels[i]] += 1;
    }
    if members.iter().filter(|&&m| m > 0).count() < 2 {
        return None;
    }

    let mut total = 0.0;
    let mut sums = vec![0.0_f64; k];
    for &i in &sample {
        sums.iter_mut().for_each(|s| *s = 0.0);
        for &j in &sample {
            if i != j {
                sums[labels[j]] += squared_distance(vectors[i].as_ref(), vectors[j].as_ref()).sqrt();
            }
        }

        let own = labels[i];
        if members[own] <= 1 {
            // Singleton clusters score 0
            continue;
        }
        let a = sums[own] / (members[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && members[c] > 0)
            .map(|c| sums[c] / members[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }

    Some(total / sample.len() as f64)
}
