//! Inclusion predicate and popularity ordering.

use std::collections::HashSet;

use galleyscout_shared::{EnrichedResult, FilterConfig};

/// Rating threshold plus a case-insensitive set of excluded genres.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    min_rating: f64,
    excluded_genres: HashSet<String>,
}

impl FilterPolicy {
    pub fn new(min_rating: f64, excluded_genres: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            min_rating,
            excluded_genres: excluded_genres
                .into_iter()
                .map(|g| normalize(g.as_ref()))
                .collect(),
        }
    }

    /// Whether `result` meets the rating threshold and carries no excluded genre.
    ///
    /// Unresolved and duplicate results have rating 0 and fail any positive
    /// threshold. A result without genres passes the genre check.
    pub fn passes(&self, result: &EnrichedResult) -> bool {
        result.rating() >= self.min_rating
            && !result
                .genres()
                .iter()
                .any(|g| self.excluded_genres.contains(&normalize(g)))
    }

    /// Keep passing results, preserving their order.
    pub fn apply(&self, results: impl IntoIterator<Item = EnrichedResult>) -> Vec<EnrichedResult> {
        results.into_iter().filter(|r| self.passes(r)).collect()
    }

    /// Filter, then order by popularity.
    pub fn select(&self, results: impl IntoIterator<Item = EnrichedResult>) -> Vec<EnrichedResult> {
        let mut kept = self.apply(results);
        rank(&mut kept);
        kept
    }
}

impl From<&FilterConfig> for FilterPolicy {
    fn from(config: &FilterConfig) -> Self {
        Self::new(config.min_rating, &config.excluded_genres)
    }
}

/// Sort by `rating * review_count`, highest first. Stable for equal keys.
pub fn rank(results: &mut [EnrichedResult]) {
    results.sort_by(|a, b| b.popularity().total_cmp(&a.popularity()));
}

fn normalize(genre: &str) -> String {
    genre.trim().to_lowercase()
}
