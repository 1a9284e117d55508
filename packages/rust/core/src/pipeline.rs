//! End-to-end run: catalog pages → candidates → resolution → filter/rank → TSV.

use std::path::PathBuf;
use std::pin::pin;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use galleyscout_browser::RenderClient;
use galleyscout_crawler::{CatalogCrawler, PageOutcome};
use galleyscout_shared::{
    AppConfig, CatalogConfig, EnrichedResult, FilterConfig, Resolution, ResolverConfig, Result,
    VisitedExternalUrls, VisitedTitles,
};

use crate::ranking::FilterPolicy;
use crate::resolver::Resolver;

/// Configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub catalog: CatalogConfig,
    pub resolver: ResolverConfig,
    pub filter: FilterConfig,
    /// Where the TSV export is written when there are matches.
    pub tsv_path: PathBuf,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            catalog: CatalogConfig::from(config),
            resolver: ResolverConfig::from(config),
            filter: FilterConfig::from(config),
            tsv_path: PathBuf::from(&config.output.tsv_path),
        }
    }
}

/// Run-scoped mutable state, created empty at the start of every run.
#[derive(Debug, Default)]
pub struct RunState {
    pub visited_titles: VisitedTitles,
    pub visited_urls: VisitedExternalUrls,
    pub enriched: Vec<EnrichedResult>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The catalog yielded no candidates at all.
    NoCandidates,
    /// Candidates were resolved but none passed the filter.
    NoMatches,
    /// Ranked results that passed the filter.
    Matches(Vec<EnrichedResult>),
}

/// Result of [`run`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Catalog pages attempted.
    pub pages_scanned: usize,
    /// Catalog pages that failed to load.
    pub pages_failed: usize,
    /// Unique candidates found in the catalog.
    pub candidates: usize,
    pub resolved: usize,
    pub duplicates: usize,
    pub unresolved: usize,
    /// Every enriched result, in catalog order.
    pub enriched: Vec<EnrichedResult>,
    pub outcome: RunOutcome,
    /// Set when the TSV export was written.
    pub tsv_path: Option<PathBuf>,
    /// Set when there were matches but the TSV export could not be written.
    pub export_error: Option<String>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Number of results that passed the filter.
    pub fn matches(&self) -> usize {
        match &self.outcome {
            RunOutcome::Matches(results) => results.len(),
            RunOutcome::NoCandidates | RunOutcome::NoMatches => 0,
        }
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each catalog page.
    fn page_scanned(&self, page: &PageOutcome, current: usize, total: usize);
    /// Called after each candidate is resolved.
    fn candidate_resolved(&self, result: &EnrichedResult, current: usize);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_scanned(&self, _page: &PageOutcome, _current: usize, _total: usize) {}
    fn candidate_resolved(&self, _result: &EnrichedResult, _current: usize) {}
    fn done(&self, _report: &RunReport) {}
}

/// Run the full pipeline against `client`.
///
/// 1. Extract candidates from every catalog page, back to back
/// 2. Resolve each candidate sequentially
/// 3. Filter and rank
/// 4. Write the TSV export if anything matched
///
/// Only an invalid page range fails the run. Page and candidate failures
/// are logged and counted, and a failed export is recorded on the report.
#[instrument(skip_all, fields(first_page = config.catalog.first_page, last_page = config.catalog.last_page))]
pub async fn run<C>(
    client: &C,
    config: &RunConfig,
    progress: &dyn ProgressReporter,
) -> Result<RunReport>
where
    C: RenderClient + ?Sized,
{
    let start = Instant::now();
    let run_id = Uuid::now_v7();
    let started_at = Utc::now();
    let page_urls = config.catalog.page_urls()?;
    let total_pages = page_urls.len();

    info!(%run_id, pages = total_pages, "starting run");

    let crawler = CatalogCrawler::new(config.catalog.clone());
    let resolver = Resolver::new(config.resolver.clone());
    let mut state = RunState::default();

    let mut pages_scanned = 0;
    let mut pages_failed = 0;
    let (mut resolved, mut duplicates, mut unresolved) = (0, 0, 0);

    // --- Phase 1: Extract ---
    progress.phase("Scanning catalog");
    let mut found = Vec::new();
    {
        let mut pages = pin!(crawler.pages(client, page_urls, &mut state.visited_titles));

        while let Some(page) = pages.next().await {
            pages_scanned += 1;
            if page.error.is_some() {
                pages_failed += 1;
            }
            progress.page_scanned(&page, pages_scanned, total_pages);
            found.extend(page.candidates);
        }
    }

    // --- Phase 2: Resolve ---
    if !found.is_empty() {
        progress.phase("Cross-referencing");
    }
    for candidate in found {
        let result = resolver
            .resolve(client, candidate, &mut state.visited_urls)
            .await;
        match result.resolution {
            Resolution::Resolved(_) => resolved += 1,
            Resolution::Duplicate { .. } => duplicates += 1,
            Resolution::Unresolved => unresolved += 1,
        }
        state.enriched.push(result);
        if let Some(last) = state.enriched.last() {
            progress.candidate_resolved(last, state.enriched.len());
        }

        let delay = config.resolver.per_candidate_delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    // --- Phase 3: Filter and rank ---
    progress.phase("Filtering and ranking");
    let candidates = state.enriched.len();
    let policy = FilterPolicy::from(&config.filter);
    let ranked = policy.select(state.enriched.iter().cloned());

    // --- Phase 4: Export ---
    let (outcome, tsv_path, export_error) = if candidates == 0 {
        (RunOutcome::NoCandidates, None, None)
    } else if ranked.is_empty() {
        (RunOutcome::NoMatches, None, None)
    } else {
        progress.phase("Writing TSV");
        match galleyscout_artifacts::write_tsv(&config.tsv_path, &ranked) {
            Ok(()) => (
                RunOutcome::Matches(ranked),
                Some(config.tsv_path.clone()),
                None,
            ),
            Err(e) => {
                warn!(path = %config.tsv_path.display(), error = %e, "could not write TSV export");
                (RunOutcome::Matches(ranked), None, Some(e.to_string()))
            }
        }
    };

    let report = RunReport {
        run_id,
        started_at,
        pages_scanned,
        pages_failed,
        candidates,
        resolved,
        duplicates,
        unresolved,
        enriched: state.enriched,
        outcome,
        tsv_path,
        export_error,
        elapsed: start.elapsed(),
    };

    progress.done(&report);

    info!(
        run_id = %report.run_id,
        started_at = %report.started_at.to_rfc3339(),
        pages_scanned = report.pages_scanned,
        pages_failed = report.pages_failed,
        candidates = report.candidates,
        resolved = report.resolved,
        duplicates = report.duplicates,
        unresolved = report.unresolved,
        matches = report.matches(),
        elapsed_ms = report.elapsed.as_millis(),
        "run complete"
    );

    Ok(report)
}
