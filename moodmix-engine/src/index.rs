//! Similarity index
//!
//! Exact k-nearest-neighbor search by cosine distance (`1 - cos`) over the
//! normalized feature vectors. The index is immutable once built and safe to
//! share across concurrent queries.
//!
//! Results are ordered by ascending distance, ties broken by the lower
//! internal index. Querying by an indexed track excludes that track.

use moodmix_common::{Error, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One query hit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f64,
}

/// Heap entry ordered by (distance, index)
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.index.cmp(&other.index))
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}

#[inline]
fn l2_norm(v: &[f32]) -> f64 {
    dot(v, v).sqrt()
}

/// Cosine distance in [0, 2]; a zero vector has similarity 0 (distance 1)
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    distance_with_norms(a, l2_norm(a), b, l2_norm(b))
}

#[inline]
fn distance_with_norms(a: &[f32], norm_a: f64, b: &[f32], norm_b: f64) -> f64 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let similarity = (dot(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0);
    (1.0 - similarity).max(0.0)
}

/// Immutable nearest-neighbor structure over normalized vectors
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    dimension: usize,
    /// Row-major vectors, `dimension` floats per track
    data: Vec<f32>,
    norms: Vec<f64>,
}

impl SimilarityIndex {
    /// Build over `vectors`; every vector must have the same dimension
    pub fn build<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Self> {
        let dimension = match vectors.first() {
            Some(v) => v.as_ref().len(),
            None => {
                return Err(Error::InvalidArgument(
                    "cannot build an index over zero vectors".to_string(),
                ))
            }
        };
        if dimension == 0 {
            return Err(Error::InvalidArgument(
                "cannot index zero-dimensional vectors".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(vectors.len() * dimension);
        let mut norms = Vec::with_capacity(vectors.len());
        for (i, v) in vectors.iter().enumerate() {
            let v = v.as_ref();
            if v.len() != dimension {
                return Err(Error::InvalidArgument(format!(
                    "vector {} has dimension {}, expected {}",
                    i,
                    v.len(),
                    dimension
                )));
            }
            data.extend_from_slice(v);
            norms.push(l2_norm(v));
        }

        Ok(Self {
            dimension,
            data,
            norms,
        })
    }

    pub fn len(&self) -> usize {
        self.norms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.norms.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Stored vector of an indexed track
    pub fn vector(&self, index: usize) -> Option<&[f32]> {
        if index >= self.len() {
            return None;
        }
        let start = index * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// k nearest indexed vectors to `vector`
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.validate_k(k)?;
        if vector.len() != self.dimension {
            return Err(Error::InvalidArgument(format!(
                "query vector has dimension {}, expected {}",
                vector.len(),
                self.dimension
            )));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(Error::InvalidArgument(
                "query vector contains non-finite components".to_string(),
            ));
        }
        Ok(self.search(vector, k, None))
    }

    /// k nearest neighbors of an indexed track, excluding the track itself
    pub fn query_track(&self, index: usize, k: usize) -> Result<Vec<Neighbor>> {
        self.validate_k(k)?;
        let vector = self
            .vector(index)
            .ok_or_else(|| Error::NotFound(format!("track index {} is not indexed", index)))?;
        Ok(self.search(vector, k, Some(index)))
    }

    fn validate_k(&self, k: usize) -> Result<()> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be at least 1".to_string()));
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize, exclude: Option<usize>) -> Vec<Neighbor> {
        let query_norm = l2_norm(query);
        let capacity = k.min(self.len());
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(capacity + 1);

        for (index, (row, &norm)) in self
            .data
            .chunks_exact(self.dimension)
            .zip(&self.norms)
            .enumerate()
        {
            if Some(index) == exclude {
                continue;
            }
            let candidate = Candidate {
                distance: distance_with_norms(query, query_norm, row, norm),
                index,
            };
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(worst) = heap.peek() {
                if candidate < *worst {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        heap.into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                index: c.index,
                distance: c.distance,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SimilarityIndex {
        SimilarityIndex::build(&[
            vec![1.0_f32, 0.0],
            vec![0.0, 1.0],
            vec![0.7, 0.7],
            vec![2.0, 0.0],
            vec![0.9, 0.1],
        ])
        .unwrap()
    }

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-12);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-12);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_query_orders_by_distance_then_index() {
        let index = sample();
        let hits = index.query(&[1.0, 0.0], 3).unwrap();
        // Tracks 0 and 3 are both at distance 0: lower index first
        assert_eq!(hits[0].index, 0);
        assert_eq!(hits[1].index, 3);
        assert_eq!(hits[2].index, 4);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_query_track_excludes_self() {
        let index = sample();
        let hits = index.query_track(0, 10).unwrap();
        assert_eq!(hits.len(), 4);
        assert!(hits.iter().all(|h| h.index != 0));
        assert_eq!(hits[0].index, 3);
    }

    #[test]
    fn test_fewer_points_than_k() {
        let index = sample();
        assert_eq!(index.query(&[0.5, 0.5], 50).unwrap().len(), 5);
    }

    #[test]
    fn test_errors() {
        let index = sample();
        assert!(matches!(index.query(&[1.0, 0.0], 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(index.query(&[1.0], 1), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            index.query(&[f32::NAN, 0.0], 1),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(index.query_track(99, 1), Err(Error::NotFound(_))));

        let empty: Vec<Vec<f32>> = Vec::new();
        assert!(SimilarityIndex::build(&empty).is_err());
    }
}
