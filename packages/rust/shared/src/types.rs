//! Core domain types: catalog candidates, resolution outcomes, visited sets.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;

/// Author shown when the external source page has no contributor element.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// An item discovered on the primary catalog, before cross-referencing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Display title; the dedup key within one catalog pass.
    pub title: String,
    /// Author as shown in the catalog panel, "by " prefix removed.
    #[serde(default)]
    pub author: String,
    /// Canonical link into the catalog (empty when the row had no href).
    #[serde(default)]
    pub source_url: String,
}

impl Candidate {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            source_url: source_url.into(),
        }
    }

    /// Search query for the external source: title, then author when known.
    pub fn search_query(&self) -> String {
        if self.author.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.author)
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Metadata copied from the external source's entity page.
///
/// Fields are filled in extraction order; when a later step fails the
/// earlier ones are kept, so a record may be partial.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExternalRecord {
    /// Canonical URL of the matched entity; unique across a run.
    pub external_url: String,
    /// Canonical author name, once the author element has been read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
}

impl ExternalRecord {
    pub fn new(external_url: impl Into<String>) -> Self {
        Self {
            external_url: external_url.into(),
            ..Self::default()
        }
    }
}

/// Outcome of cross-referencing one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    /// The first search result was claimed by this candidate.
    Resolved(ExternalRecord),
    /// The first search result was already claimed by an earlier candidate.
    Duplicate { external_url: String },
    /// No results marker, no results, or a failure before a match was claimed.
    Unresolved,
}

impl Resolution {
    /// The external record, if this resolution claimed one.
    pub fn record(&self) -> Option<&ExternalRecord> {
        match self {
            Self::Resolved(record) => Some(record),
            Self::Duplicate { .. } | Self::Unresolved => None,
        }
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "resolved",
            Self::Duplicate { .. } => "duplicate",
            Self::Unresolved => "unresolved",
        }
    }
}

// ---------------------------------------------------------------------------
// EnrichedResult
// ---------------------------------------------------------------------------

/// A candidate after a resolution attempt. Filtering and ranking operate on these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedResult {
    pub candidate: Candidate,
    pub resolution: Resolution,
}

impl EnrichedResult {
    pub fn new(candidate: Candidate, resolution: Resolution) -> Self {
        Self {
            candidate,
            resolution,
        }
    }

    pub fn title(&self) -> &str {
        &self.candidate.title
    }

    /// Resolved author when the external page provided one, else the catalog author.
    pub fn author(&self) -> &str {
        self.resolution
            .record()
            .and_then(|r| r.author.as_deref())
            .unwrap_or(&self.candidate.author)
    }

    /// Rating, 0.0 when unresolved.
    pub fn rating(&self) -> f64 {
        self.resolution.record().map_or(0.0, |r| r.rating)
    }

    /// Review count, 0 when unresolved.
    pub fn review_count(&self) -> u64 {
        self.resolution.record().map_or(0, |r| r.review_count)
    }

    pub fn genres(&self) -> &[String] {
        self.resolution
            .record()
            .map(|r| r.genres.as_slice())
            .unwrap_or(&[])
    }

    pub fn source_url(&self) -> &str {
        &self.candidate.source_url
    }

    /// External URL; empty unless this result claimed the entity.
    pub fn external_url(&self) -> &str {
        self.resolution
            .record()
            .map_or("", |r| r.external_url.as_str())
    }

    /// Ranking key: `rating * review_count`.
    pub fn popularity(&self) -> f64 {
        self.rating() * self.review_count() as f64
    }
}

// ---------------------------------------------------------------------------
// Visited sets
// ---------------------------------------------------------------------------

/// Titles already emitted by the catalog pass. Case-sensitive, exact match.
#[derive(Debug, Clone, Default)]
pub struct VisitedTitles(HashSet<String>);

impl VisitedTitles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a title. Returns `false` if it was already present.
    pub fn insert(&mut self, title: &str) -> bool {
        if self.0.contains(title) {
            return false;
        }
        self.0.insert(title.to_string())
    }

    pub fn contains(&self, title: &str) -> bool {
        self.0.contains(title)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Canonical external URLs already claimed by a resolved candidate.
#[derive(Debug, Clone, Default)]
pub struct VisitedExternalUrls(HashSet<String>);

impl VisitedExternalUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a URL. Returns `false` if another candidate already claimed it.
    pub fn insert(&mut self, url: &str) -> bool {
        if self.0.contains(url) {
            return false;
        }
        self.0.insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.0.contains(url)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Canonical URLs
// ---------------------------------------------------------------------------

/// Resolve `href` against `base` and drop the query string and fragment.
///
/// Search-result links carry per-query tracking parameters, so two searches
/// landing on the same entity only compare equal once those are removed.
/// Returns `None` for empty or unparseable hrefs.
pub fn canonical_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let base = Url::parse(base).ok()?;
    let mut resolved = base.join(href).ok()?;
    resolved.set_query(None);
    resolved.set_fragment(None);

    let mut s = resolved.to_string();
    if s.ends_with('/') && resolved.path() != "/" {
        s.pop();
    }
    Some(s)
}
