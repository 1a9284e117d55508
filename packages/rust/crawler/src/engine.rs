//! Catalog extractor: walks paginated catalog pages and reads each item's
//! detail panel into a deduplicated list of candidates.
//!
//! The catalog renders items as pairs of table rows: a cover row of clickable
//! images followed by a detail row of links, matched column by column.
//! Clicking a cover opens a side panel holding the title and author.

use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use galleyscout_browser::{Locator, RenderClient, WaitUntil};
use galleyscout_shared::{
    Candidate, CatalogConfig, GalleyScoutError, Result, VisitedTitles, canonical_url,
};

// ---------------------------------------------------------------------------
// PageOutcome
// ---------------------------------------------------------------------------

/// Summary of one catalog page.
#[derive(Debug, Clone, Default)]
pub struct PageOutcome {
    /// The catalog page URL.
    pub url: String,
    /// New, unique candidates found on this page.
    pub candidates: Vec<Candidate>,
    /// Visible detail rows.
    pub rows: usize,
    /// Items (columns) attempted across all rows.
    pub items: usize,
    /// Items whose title was already seen earlier in the run.
    pub duplicates: usize,
    /// Items whose panel had no readable title.
    pub unreadable: usize,
    /// Items that failed with an error and were skipped.
    pub failed: usize,
    /// Items whose panel was still open after the close retries.
    pub unclosed: usize,
    /// Set when the page itself could not be loaded or scanned.
    pub error: Option<String>,
}

impl PageOutcome {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// CatalogCrawler
// ---------------------------------------------------------------------------

/// Sequential, panel-driven catalog extractor.
pub struct CatalogCrawler {
    config: CatalogConfig,
}

impl CatalogCrawler {
    pub fn new(config: CatalogConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Lazily extract each page in `urls`, one page at a time.
    ///
    /// A page that fails to load yields an outcome with `error` set; the
    /// stream always continues with the next page.
    pub fn pages<'a, C>(
        &'a self,
        client: &'a C,
        urls: Vec<String>,
        visited: &'a mut VisitedTitles,
    ) -> impl Stream<Item = PageOutcome> + 'a
    where
        C: RenderClient + ?Sized,
    {
        stream::unfold(
            (urls.into_iter(), visited),
            move |(mut urls, visited)| async move {
                let url = urls.next()?;
                let outcome = self.extract_page(client, &url, visited).await;
                Some((outcome, (urls, visited)))
            },
        )
    }

    /// Lazily extract unique candidates from every page in `urls`.
    pub fn candidates<'a, C>(
        &'a self,
        client: &'a C,
        urls: Vec<String>,
        visited: &'a mut VisitedTitles,
    ) -> impl Stream<Item = Candidate> + 'a
    where
        C: RenderClient + ?Sized,
    {
        self.pages(client, urls, visited)
            .flat_map(|page| stream::iter(page.candidates))
    }

    /// Extract every visible item on one catalog page.
    ///
    /// Never fails: per-item errors are logged and counted, and page-level
    /// errors are recorded on the outcome.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn extract_page<C>(
        &self,
        client: &C,
        url: &str,
        visited: &mut VisitedTitles,
    ) -> PageOutcome
    where
        C: RenderClient + ?Sized,
    {
        let mut outcome = PageOutcome::new(url);

        info!("navigating to catalog page");
        if let Err(e) = client
            .navigate(url, WaitUntil::NetworkIdle, self.config.navigation_timeout)
            .await
        {
            warn!(error = %e, "catalog page failed to load, skipping");
            outcome.error = Some(e.to_string());
            return outcome;
        }

        let rows = Locator::css(&self.config.detail_row).visible();
        let row_count = match client.count(&rows).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "could not count detail rows, skipping page");
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };
        outcome.rows = row_count;

        if row_count == 0 {
            debug!("no visible detail rows on page");
            return outcome;
        }

        for row in 0..row_count {
            let detail_row = rows.nth(row);
            let cover_links = detail_row.preceding_sibling().locate(&self.config.row_link);
            let detail_links = detail_row.locate(&self.config.row_link);

            let columns = match client.count(&cover_links).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(row, error = %e, "could not read cover row, skipping row");
                    continue;
                }
            };

            for col in 0..columns {
                outcome.items += 1;
                let cover = cover_links.nth(col);
                let detail = detail_links.nth(col);

                match self.extract_item(client, &cover, &detail).await {
                    Ok(Some(candidate)) => {
                        if visited.insert(&candidate.title) {
                            info!(title = %candidate.title, author = %candidate.author, "found candidate");
                            outcome.candidates.push(candidate);
                        } else {
                            debug!(title = %candidate.title, "duplicate title, skipping");
                            outcome.duplicates += 1;
                        }
                    }
                    Ok(None) => {
                        debug!(row, col, "panel had no readable title");
                        outcome.unreadable += 1;
                    }
                    Err(e) => {
                        warn!(row, col, error = %e, "failed to process catalog item");
                        outcome.failed += 1;
                    }
                }

                if !self.close_panel(client).await {
                    outcome.unclosed += 1;
                }
            }
        }

        info!(
            rows = outcome.rows,
            items = outcome.items,
            found = outcome.candidates.len(),
            duplicates = outcome.duplicates,
            failed = outcome.failed,
            unclosed = outcome.unclosed,
            "catalog page done"
        );
        outcome
    }

    /// Open one item's panel and read it. `Ok(None)` when no title is readable.
    async fn extract_item<C>(
        &self,
        client: &C,
        cover: &Locator,
        detail: &Locator,
    ) -> Result<Option<Candidate>>
    where
        C: RenderClient + ?Sized,
    {
        client.scroll_into_view(cover).await?;
        client.click(cover).await?;

        let close = self.close_button();
        let close = &close;
        let ready = self
            .config
            .panel_ready
            .poll(|| async move { client.is_visible(close).await.unwrap_or(false) })
            .await;
        if !ready {
            debug!("panel close control not visible, reading panel anyway");
        }

        let title = first_visible_text(client, &self.config.panel_title)
            .await?
            .unwrap_or_default();
        if title.is_empty() {
            return Ok(None);
        }

        let author = first_visible_text(client, &self.config.panel_author)
            .await?
            .map(|a| strip_author_prefix(&a).to_string())
            .unwrap_or_default();

        let source_url = client
            .attribute(detail, "href")
            .await?
            .and_then(|href| canonical_url(&self.config.base_url, &href))
            .unwrap_or_default();

        Ok(Some(Candidate::new(title, author, source_url)))
    }

    /// Close whatever panel is open. Runs after every item, success or not.
    ///
    /// Returns whether the close control is gone afterwards.
    async fn close_panel<C>(&self, client: &C) -> bool
    where
        C: RenderClient + ?Sized,
    {
        let close = self.close_button();
        let close = &close;
        let closed = self
            .config
            .panel_close
            .retry(|| async move {
                if !client.is_visible(close).await? {
                    return Ok(());
                }
                client.click(close).await?;
                if client.is_visible(close).await? {
                    return Err(GalleyScoutError::Browser("detail panel still open".into()));
                }
                Ok(())
            })
            .await;

        settle(self.config.post_close_settle).await;
        match closed {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "detail panel did not close, later items may misread");
                false
            }
        }
    }

    fn close_button(&self) -> Locator {
        Locator::css(&self.config.close_button).visible().first()
    }
}

/// Text of the first visible element matching `selector`, trimmed.
///
/// Earlier panels can leave hidden copies of the same fields in the DOM.
async fn first_visible_text<C>(client: &C, selector: &str) -> Result<Option<String>>
where
    C: RenderClient + ?Sized,
{
    let text = client
        .inner_text(&Locator::css(selector).visible().first())
        .await?;
    Ok(text.map(|t| t.trim().to_string()))
}

/// Remove a leading "by " marker (any case) from an author line.
pub fn strip_author_prefix(author: &str) -> &str {
    let author = author.trim();
    match author.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("by ") => author[3..].trim(),
        _ => author,
    }
}

async fn settle(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galleyscout_browser::FixtureClient;
    use galleyscout_shared::{AppConfig, RetryPolicy};

    const PAGE_1: &str = "https://catalog.test/list?page=1";
    const PAGE_2: &str = "https://catalog.test/list?page=2";

    fn fast_config() -> CatalogConfig {
        let mut config = CatalogConfig::from(&AppConfig::default());
        config.base_url = "https://catalog.test".into();
        config.panel_ready = RetryPolicy::fixed(3, Duration::ZERO);
        config.panel_close = RetryPolicy::fixed(3, Duration::ZERO);
        config.post_close_settle = Duration::ZERO;
        config
    }

    fn panel(id: &str, title: &str, author: &str) -> String {
        format!(
            r#"<div id="{id}" hidden>
                 <h2 itemprop="name">{title}</h2>
                 <h3 itemprop="author">{author}</h3>
                 <button class="panel-close-button" data-dismiss>x</button>
               </div>"#
        )
    }

    /// Two item rows (two columns each), a hidden decorative row, and a nav
    /// table that has no detail-row marker.
    fn page_one() -> String {
        format!(
            r#"<html><body>
            <table class="nav"><tr><td><a href="/nav">Browse</a></td></tr></table>
            <div hidden><h2 itemprop="name">Stale Panel</h2></div>
            <table>
              <tr><td><a data-reveal="p1"><img></a></td><td><a data-reveal="p2"><img></a></td></tr>
              <tr class="cover-table-detail-row"><td><a href="/catalog/book/1?ref=grid">Dune</a></td><td><a>No Link</a></td></tr>
              <tr><td><a data-reveal="p3"><img></a></td><td><a data-reveal="p4"><img></a></td></tr>
              <tr class="cover-table-detail-row"><td><a href="/catalog/book/3">Dune</a></td><td><a href="/catalog/book/4">Empty</a></td></tr>
              <tr><td><a data-reveal="ghost"><img></a></td></tr>
              <tr class="cover-table-detail-row" style="display: none"><td><a href="/ghost">Ghost</a></td></tr>
            </table>
            {p1}{p2}{p3}{p4}{ghost}
            </body></html>"#,
            p1 = panel("p1", "Dune", "by Frank Herbert"),
            p2 = panel("p2", "Hyperion", "Dan Simmons"),
            p3 = panel("p3", "Dune", "By Someone Else"),
            p4 = panel("p4", "", "by Nobody"),
            ghost = panel("ghost", "Ghost Book", "by Casper"),
        )
    }

    fn page_two() -> String {
        format!(
            r#"<html><body><table>
              <tr><td><a data-reveal="q1" data-fail-click><img></a></td><td><a data-reveal="q2"><img></a></td></tr>
              <tr class="cover-table-detail-row"><td><a href="/catalog/book/9">Broken</a></td><td><a href="/catalog/book/10">Hyperion</a></td></tr>
            </table>
            {q1}{q2}
            </body></html>"#,
            q1 = panel("q1", "Broken", "by Error"),
            q2 = panel("q2", "Hyperion", "Dan Simmons"),
        )
    }

    #[test]
    fn strips_author_prefix() {
        assert_eq!(strip_author_prefix("by Frank Herbert"), "Frank Herbert");
        assert_eq!(strip_author_prefix("  BY  Ann Leckie "), "Ann Leckie");
        assert_eq!(strip_author_prefix("Byron Kato"), "Byron Kato");
        assert_eq!(strip_author_prefix("by"), "by");
        assert_eq!(strip_author_prefix(""), "");
    }

    #[tokio::test]
    async fn extracts_unique_candidates_from_visible_rows() {
        let client = FixtureClient::new().route(PAGE_1, page_one());
        let crawler = CatalogCrawler::new(fast_config());
        let mut visited = VisitedTitles::new();

        let outcome = crawler.extract_page(&client, PAGE_1, &mut visited).await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.rows, 2);
        assert_eq!(outcome.items, 4);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.unreadable, 1);
        assert_eq!(outcome.failed, 0);

        let titles: Vec<_> = outcome.candidates.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["Dune", "Hyperion"]);
        assert!(!visited.contains("Ghost Book"));
    }

    #[tokio::test]
    async fn first_occurrence_of_a_title_wins() {
        let client = FixtureClient::new().route(PAGE_1, page_one());
        let crawler = CatalogCrawler::new(fast_config());
        let mut visited = VisitedTitles::new();

        let outcome = crawler.extract_page(&client, PAGE_1, &mut visited).await;
        let dune = &outcome.candidates[0];

        assert_eq!(dune.title, "Dune");
        assert_eq!(dune.author, "Frank Herbert");
        assert_eq!(dune.source_url, "https://catalog.test/catalog/book/1");
    }

    #[tokio::test]
    async fn missing_href_gives_empty_source_url() {
        let client = FixtureClient::new().route(PAGE_1, page_one());
        let crawler = CatalogCrawler::new(fast_config());
        let mut visited = VisitedTitles::new();

        let outcome = crawler.extract_page(&client, PAGE_1, &mut visited).await;
        let hyperion = &outcome.candidates[1];

        assert_eq!(hyperion.title, "Hyperion");
        assert_eq!(hyperion.author, "Dan Simmons");
        assert_eq!(hyperion.source_url, "");
    }

    #[tokio::test]
    async fn panels_are_closed_after_every_item() {
        let client = FixtureClient::new().route(PAGE_1, page_one());
        let crawler = CatalogCrawler::new(fast_config());
        let mut visited = VisitedTitles::new();

        crawler.extract_page(&client, PAGE_1, &mut visited).await;

        let open = Locator::css(r#"button[class*="close-button"]"#).visible();
        assert_eq!(client.count(&open).await.unwrap(), 0);
        // four cover clicks plus four close clicks
        assert_eq!(client.clicks(), 8);
    }

    #[tokio::test]
    async fn item_failure_does_not_abort_page() {
        let client = FixtureClient::new().route(PAGE_2, page_two());
        let crawler = CatalogCrawler::new(fast_config());
        let mut visited = VisitedTitles::new();

        let outcome = crawler.extract_page(&client, PAGE_2, &mut visited).await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].title, "Hyperion");
        assert_eq!(
            outcome.candidates[0].source_url,
            "https://catalog.test/catalog/book/10"
        );
    }

    /// One row of two items whose first panel has the given close button.
    fn sticky_close_page(close_button: &str) -> String {
        format!(
            r#"<html><body><table>
              <tr><td><a data-reveal="s1"><img></a></td><td><a data-reveal="s2"><img></a></td></tr>
              <tr class="cover-table-detail-row"><td><a href="/catalog/book/21">Sticky</a></td><td><a href="/catalog/book/22">Next</a></td></tr>
            </table>
            <div id="s1" hidden>
              <h2 itemprop="name">Sticky</h2><h3 itemprop="author">by Glue</h3>
              {close_button}
            </div>
            {s2}
            </body></html>"#,
            s2 = panel("s2", "Next In Line", "by Someone"),
        )
    }

    #[tokio::test]
    async fn close_is_retried_until_the_panel_shuts() {
        let page = sticky_close_page(
            r#"<button id="sticky" class="panel-close-button" data-dismiss data-fail-clicks="2">x</button>"#,
        );
        let client = FixtureClient::new().route(PAGE_1, page);
        let crawler = CatalogCrawler::new(fast_config());
        let mut visited = VisitedTitles::new();

        let outcome = crawler.extract_page(&client, PAGE_1, &mut visited).await;

        assert_eq!(outcome.unclosed, 0);
        let titles: Vec<_> = outcome.candidates.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["Sticky", "Next In Line"]);
    }

    #[tokio::test]
    async fn stuck_panel_is_reported_and_next_item_still_attempted() {
        let page = sticky_close_page(
            r#"<button class="panel-close-button" data-dismiss data-fail-click>x</button>"#,
        );
        let client = FixtureClient::new().route(PAGE_1, page);
        let crawler = CatalogCrawler::new(fast_config());
        let mut visited = VisitedTitles::new();

        let outcome = crawler.extract_page(&client, PAGE_1, &mut visited).await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.items, 2);
        assert_eq!(outcome.failed, 0);
        // the stuck close control stays first in document order, so both items report it
        assert_eq!(outcome.unclosed, 2);
        // only the two cover clicks went through
        assert_eq!(client.clicks(), 2);
        assert_eq!(outcome.candidates[0].title, "Sticky");
    }

    #[tokio::test]
    async fn panel_without_close_control_is_read_anyway() {
        let page = r#"<html><body><table>
              <tr><td><a data-reveal="bare"><img></a></td></tr>
              <tr class="cover-table-detail-row"><td><a href="/catalog/book/30">Bare</a></td></tr>
            </table>
            <div id="bare" hidden><h2 itemprop="name">Bare Panel</h2><h3 itemprop="author">by Nobody Home</h3></div>
            </body></html>"#;
        let client = FixtureClient::new().route(PAGE_1, page);
        let crawler = CatalogCrawler::new(fast_config());
        let mut visited = VisitedTitles::new();

        let outcome = crawler.extract_page(&client, PAGE_1, &mut visited).await;

        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.unclosed, 0);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].title, "Bare Panel");
        assert_eq!(outcome.candidates[0].author, "Nobody Home");
        assert_eq!(client.clicks(), 1);
    }

    #[tokio::test]
    async fn zero_rows_yields_empty_page() {
        let client = FixtureClient::new().route(PAGE_1, "<html><body><p>Nothing here</p></body></html>");
        let crawler = CatalogCrawler::new(fast_config());
        let mut visited = VisitedTitles::new();

        let outcome = crawler.extract_page(&client, PAGE_1, &mut visited).await;
        assert_eq!(outcome.rows, 0);
        assert!(outcome.candidates.is_empty());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn stream_continues_past_failed_page_and_dedups_across_pages() {
        let client = FixtureClient::new()
            .route(PAGE_1, page_one())
            .route(PAGE_2, page_two());
        let crawler = CatalogCrawler::new(fast_config());
        let mut visited = VisitedTitles::new();
        let urls = vec![
            "https://catalog.test/missing".to_string(),
            PAGE_1.to_string(),
            PAGE_2.to_string(),
        ];

        let pages: Vec<PageOutcome> = crawler.pages(&client, urls, &mut visited).collect().await;

        assert_eq!(pages.len(), 3);
        assert!(pages[0].error.is_some());
        assert_eq!(pages[1].candidates.len(), 2);
        // Hyperion was already seen on page 1
        assert!(pages[2].candidates.is_empty());
        assert_eq!(pages[2].duplicates, 1);
        assert_eq!(visited.len(), 2);
    }

    #[tokio::test]
    async fn candidates_stream_flattens_pages() {
        let client = FixtureClient::new()
            .route(PAGE_1, page_one())
            .route(PAGE_2, page_two());
        let crawler = CatalogCrawler::new(fast_config());
        let mut visited = VisitedTitles::new();
        let urls = vec![PAGE_2.to_string(), PAGE_1.to_string()];

        let found: Vec<Candidate> = crawler
            .candidates(&client, urls, &mut visited)
            .collect()
            .await;

        let titles: Vec<_> = found.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["Hyperion", "Dune"]);
    }
}
