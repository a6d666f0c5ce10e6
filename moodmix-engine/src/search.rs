//! Title lookup
//!
//! Case-insensitive matching of free text against track names. Matches are
//! ranked by quality tier (exact, then prefix, then substring), then by how
//! close the name length is to the query, then alphabetically, then by
//! internal index. Resolution for recommendations uses the same ranking and
//! can fall back to the most similar name by normalized edit distance.

use crate::dataset::TrackRecord;
use std::cmp::Ordering;

/// How a track name matched the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    Exact,
    Prefix,
    Substring,
}

/// Ranked hit from [`TitleIndex::search`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleMatch {
    pub index: usize,
    pub tier: MatchTier,
}

/// How [`TitleIndex::resolve`] found a track
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Ranked(TitleMatch),
    /// Edit-distance fallback with the achieved similarity in [0, 1]
    Fuzzy { index: usize, similarity: f64 },
}

impl Resolution {
    pub fn index(&self) -> usize {
        match self {
            Resolution::Ranked(m) => m.index,
            Resolution::Fuzzy { index, .. } => *index,
        }
    }
}

/// Lowercased track names by internal index
#[derive(Debug, Clone, Default)]
pub struct TitleIndex {
    names: Vec<String>,
}

struct Ranked<'a> {
    tier: MatchTier,
    length_gap: usize,
    name: &'a str,
    index: usize,
}

impl Ranked<'_> {
    fn rank(&self, other: &Self) -> Ordering {
        self.tier
            .cmp(&other.tier)
            .then(self.length_gap.cmp(&other.length_gap))
            .then_with(|| self.name.cmp(other.name))
            .then(self.index.cmp(&other.index))
    }
}

impl TitleIndex {
    pub fn build(records: &[TrackRecord]) -> Self {
        Self {
            names: records.iter().map(|r| r.name.trim().to_lowercase()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn ranked(&self, needle: &str) -> Vec<Ranked<'_>> {
        let needle_len = needle.chars().count();
        let mut hits: Vec<Ranked<'_>> = self
            .names
            .iter()
            .enumerate()
            .filter_map(|(index, name)| {
                let tier = if name == needle {
                    MatchTier::Exact
                } else if name.starts_with(needle) {
                    MatchTier::Prefix
                } else if name.contains(needle) {
                    MatchTier::Substring
                } else {
                    return None;
                };
                Some(Ranked {
                    tier,
                    length_gap: name.chars().count().abs_diff(needle_len),
                    name,
                    index,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.rank(b));
        hits
    }

    /// Ranked matches, at most `limit`; blank text matches nothing
    ///
    /// Match quality is the tier plus closeness in length to the query, so
    /// "Love Song" ranks ahead of "Love Me Do" for "love". Ties fall back to
    /// alphabetical order.
    pub fn search(&self, text: &str, limit: usize) -> Vec<TitleMatch> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.ranked(&needle)
            .into_iter()
            .take(limit)
            .map(|r| TitleMatch {
                index: r.index,
                tier: r.tier,
            })
            .collect()
    }

    /// Best track for `text`
    ///
    /// With no ranked match and `fuzzy_cutoff` set, picks the name with the
    /// highest normalized Levenshtein similarity at or above the cutoff
    /// (lower index on ties).
    pub fn resolve(&self, text: &str, fuzzy_cutoff: Option<f64>) -> Option<Resolution> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        if let Some(best) = self.search(&needle, 1).into_iter().next() {
            return Some(Resolution::Ranked(best));
        }

        let cutoff = fuzzy_cutoff?;
        let mut best: Option<(usize, f64)> = None;
        for (index, name) in self.names.iter().enumerate() {
            let similarity = strsim::normalized_levenshtein(&needle, name);
            if similarity < cutoff {
                continue;
            }
            match best {
                Some((_, s)) if s >= similarity => {}
                _ => best = Some((index, similarity)),
            }
        }
        best.map(|(index, similarity)| Resolution::Fuzzy { index, similarity })
    }
}
