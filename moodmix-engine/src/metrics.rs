//! Offline ranking evaluation
//!
//! Standard top-k ranking metrics over recommended/relevant index lists, and
//! an evaluator that uses cluster membership as the relevance signal: for a
//! sampled anchor, every other track in the anchor's cluster is relevant.

use crate::model::RecommendationModel;
use moodmix_common::{Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

fn hits_in_top_k(recommended: &[usize], relevant: &HashSet<usize>, k: usize) -> usize {
    recommended
        .iter()
        .take(k)
        .collect::<HashSet<_>>()
        .into_iter()
        .filter(|i| relevant.contains(*i))
        .count()
}

/// Share of the top k slots holding a relevant item
pub fn precision_at_k(recommended: &[usize], relevant: &HashSet<usize>, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    hits_in_top_k(recommended, relevant, k) as f64 / k as f64
}

/// Share of relevant items found in the top k
pub fn recall_at_k(recommended: &[usize], relevant: &HashSet<usize>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    hits_in_top_k(recommended, relevant, k) as f64 / relevant.len() as f64
}

pub fn f1_at_k(recommended: &[usize], relevant: &HashSet<usize>, k: usize) -> f64 {
    let p = precision_at_k(recommended, relevant, k);
    let r = recall_at_k(recommended, relevant, k);
    if p + r > 0.0 {
        2.0 * p * r / (p + r)
    } else {
        0.0
    }
}

/// Normalized discounted cumulative gain with binary relevance
pub fn ndcg_at_k(recommended: &[usize], relevant: &HashSet<usize>, k: usize) -> f64 {
    let discount = |rank: usize| 1.0 / ((rank + 2) as f64).log2();
    let dcg: f64 = recommended
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, item)| relevant.contains(*item))
        .map(|(rank, _)| discount(rank))
        .sum();
    let ideal: f64 = (0..relevant.len().min(k)).map(discount).sum();
    if ideal > 0.0 {
        dcg / ideal
    } else {
        0.0
    }
}

/// 1 when at least one relevant item is in the top k
pub fn accuracy_at_k(recommended: &[usize], relevant: &HashSet<usize>, k: usize) -> f64 {
    if hits_in_top_k(recommended, relevant, k) > 0 {
        1.0
    } else {
        0.0
    }
}

/// Averaged metrics over the evaluated anchors
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub top_n: usize,
    /// Anchors that contributed to the averages
    pub evaluated: usize,
    /// Anchors skipped because they were alone in their cluster
    pub skipped: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub ndcg: f64,
    pub accuracy: f64,
}

/// Evaluate `top_n` recommendations for up to `samples` seeded anchors
pub fn evaluate(
    model: &RecommendationModel,
    samples: usize,
    top_n: usize,
    seed: u64,
) -> Result<EvaluationReport> {
    if samples == 0 || top_n == 0 {
        return Err(Error::InvalidArgument(
            "samples and top_n must be at least 1".to_string(),
        ));
    }

    let n = model.len();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut anchors = rand::seq::index::sample(&mut rng, n, samples.min(n)).into_vec();
    anchors.sort_unstable();

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); model.clusters().k()];
    for (position, track) in model.tracks().iter().enumerate() {
        members[track.cluster].push(position);
    }

    let mut report = EvaluationReport {
        top_n,
        evaluated: 0,
        skipped: 0,
        precision: 0.0,
        recall: 0.0,
        f1: 0.0,
        ndcg: 0.0,
        accuracy: 0.0,
    };

    for anchor in anchors {
        let cluster = model.tracks()[anchor].cluster;
        let relevant: HashSet<usize> = members[cluster]
            .iter()
            .copied()
            .filter(|&i| i != anchor)
            .collect();
        if relevant.is_empty() {
            report.skipped += 1;
            continue;
        }

        let recommended: Vec<usize> = model
            .neighbors(anchor, top_n)?
            .into_iter()
            .map(|n| n.index)
            .collect();

        report.precision += precision_at_k(&recommended, &relevant, top_n);
        report.recall += recall_at_k(&recommended, &relevant, top_n);
        report.f1 += f1_at_k(&recommended, &relevant, top_n);
        report.ndcg += ndcg_at_k(&recommended, &relevant, top_n);
        report.accuracy += accuracy_at_k(&recommended, &relevant, top_n);
        report.evaluated += 1;
    }

    if report.evaluated > 0 {
        let count = report.evaluated as f64;
        report.precision /= count;
        report.recall /= count;
        report.f1 /= count;
        report.ndcg /= count;
        report.accuracy /= count;
    }

    info!(
        evaluated = report.evaluated,
        skipped = report.skipped,
        top_n,
        precision = report.precision,
        ndcg = report.ndcg,
        "Ranking evaluation complete"
    );

    Ok(report)
}
