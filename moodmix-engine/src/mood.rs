//! Post-hoc mood names for clusters
//!
//! Cluster ids carry no meaning of their own. This layer summarizes each
//! cluster by the mean normalized value of the mood-bearing features present
//! in the schema and names it after the dominant one, e.g. `"High Energetic"`.

use crate::dataset::FeatureSchema;

/// Mood-bearing features in precedence order (ties go to the earlier entry)
pub const MOOD_FEATURES: [(&str, &str); 7] = [
    ("energy", "Energetic"),
    ("danceability", "Energetic"),
    ("valence", "Happy"),
    ("acousticness", "Relaxed"),
    ("instrumentalness", "Calm"),
    ("liveness", "Live"),
    ("speechiness", "Talky"),
];

/// Label used when no mood-bearing feature is available
pub const UNLABELED: &str = "Unlabeled";

fn intensity(value: f64) -> &'static str {
    if value < 0.33 {
        "Low"
    } else if value < 0.66 {
        "Medium"
    } else {
        "High"
    }
}

/// Name one cluster from the mean values of its mood features
///
/// `means` pairs each available mood feature with its cluster mean. The
/// means are rescaled against each other; the largest names the mood and its
/// rescaled value picks the intensity.
pub fn label_from_means(means: &[(&str, f64)]) -> String {
    if means.is_empty() {
        return UNLABELED.to_string();
    }

    let min = means.iter().map(|(_, m)| *m).fold(f64::INFINITY, f64::min);
    let max = means.iter().map(|(_, m)| *m).fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    let mut top = 0;
    let mut top_value = f64::NEG_INFINITY;
    for (i, (_, mean)) in means.iter().enumerate() {
        let scaled = if range > 0.0 { (mean - min) / range } else { 0.0 };
        if scaled > top_value {
            top_value = scaled;
            top = i;
        }
    }

    let feature = means[top].0;
    let mood = MOOD_FEATURES
        .iter()
        .find(|(f, _)| *f == feature)
        .map(|(_, mood)| *mood)
        .unwrap_or(feature);

    format!("{} {}", intensity(top_value), mood)
}

/// Mood label per cluster id
///
/// `vectors` are the normalized feature vectors, `labels` their cluster ids.
pub fn label_clusters<V: AsRef<[f32]>>(
    schema: &FeatureSchema,
    vectors: &[V],
    labels: &[usize],
    k: usize,
) -> Vec<String> {
    let positions: Vec<(&str, usize)> = MOOD_FEATURES
        .iter()
        .filter_map(|(feature, _)| schema.position(feature).map(|p| (*feature, p)))
        .collect();

    if positions.is_empty() {
        return vec![UNLABELED.to_string(); k];
    }

    let mut sums = vec![vec![0.0_f64; positions.len()]; k];
    let mut counts = vec![0_usize; k];
    for (v, &label) in vectors.iter().zip(labels) {
        if label >= k {
            continue;
        }
        counts[label] += 1;
        let v = v.as_ref();
        for (s, (_, pos)) in sums[label].iter_mut().zip(&positions) {
            *s += f64::from(v[*pos]);
        }
    }

    (0..k)
        .map(|c| {
            if counts[c] == 0 {
                return UNLABELED.to_string();
            }
            let means: Vec<(&str, f64)> = positions
                .iter()
                .zip(&sums[c])
                .map(|((feature, _), s)| (*feature, s / counts[c] as f64))
                .collect();
            label_from_means(&means)
        })
        .collect()
}
