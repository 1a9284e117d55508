//! Cross-reference resolver: match one candidate against the external
//! search index and copy rating, review count, author and genres from the
//! first result's page.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

use galleyscout_browser::{ElementState, Locator, RenderClient, WaitUntil};
use galleyscout_shared::{
    Candidate, EnrichedResult, ExternalRecord, GalleyScoutError, Resolution, ResolverConfig,
    Result, UNKNOWN_AUTHOR, VisitedExternalUrls, canonical_url,
};

/// Resolves candidates one at a time against a shared render client.
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Search URL for `query`.
    pub fn search_url(&self, query: &str) -> Result<String> {
        Url::parse_with_params(&self.config.search_url, [("q", query)])
            .map(String::from)
            .map_err(|e| {
                GalleyScoutError::config(format!(
                    "invalid search_url {:?}: {e}",
                    self.config.search_url
                ))
            })
    }

    /// Resolve one candidate. Never fails.
    ///
    /// An error after the first result was claimed keeps the fields read
    /// so far; an error before that leaves the candidate unresolved.
    #[instrument(skip_all, fields(title = %candidate.title))]
    pub async fn resolve<C>(
        &self,
        client: &C,
        candidate: Candidate,
        visited: &mut VisitedExternalUrls,
    ) -> EnrichedResult
    where
        C: RenderClient + ?Sized,
    {
        let mut partial: Option<ExternalRecord> = None;

        let resolution = match self
            .try_resolve(client, &candidate, visited, &mut partial)
            .await
        {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(title = %candidate.title, error = %e, "error resolving candidate");
                partial.map_or(Resolution::Unresolved, Resolution::Resolved)
            }
        };

        let result = EnrichedResult::new(candidate, resolution);
        info!(
            status = result.resolution.label(),
            rating = result.rating(),
            reviews = result.review_count(),
            "verified"
        );
        result
    }

    async fn try_resolve<C>(
        &self,
        client: &C,
        candidate: &Candidate,
        visited: &mut VisitedExternalUrls,
        partial: &mut Option<ExternalRecord>,
    ) -> Result<Resolution>
    where
        C: RenderClient + ?Sized,
    {
        let cfg = &self.config;

        let search_url = self.search_url(&candidate.search_query())?;
        client
            .navigate(&search_url, WaitUntil::DomContentLoaded, cfg.navigation_timeout)
            .await?;

        let marker = Locator::text(&cfg.results_marker_text);
        if let Err(e) = client
            .wait_for(&marker, ElementState::Visible, cfg.results_timeout)
            .await
        {
            debug!(error = %e, "results marker never appeared");
            return Ok(Resolution::Unresolved);
        }

        let first_result = Locator::css(&cfg.result_link).first();
        let Some(href) = client.attribute(&first_result, "href").await? else {
            debug!("no search results");
            return Ok(Resolution::Unresolved);
        };
        let Some(external_url) = canonical_url(&cfg.base_url, &href) else {
            debug!(%href, "first result has no usable link");
            return Ok(Resolution::Unresolved);
        };

        if !visited.insert(&external_url) {
            info!(%external_url, "external entity already claimed, skipping");
            return Ok(Resolution::Duplicate { external_url });
        }

        let record = partial.insert(ExternalRecord::new(external_url.clone()));
        client
            .navigate(&external_url, WaitUntil::DomContentLoaded, cfg.navigation_timeout)
            .await?;

        if let Some(text) = client.inner_text(&Locator::css(&cfg.rating).first()).await? {
            record.rating = parse_rating(&text)?;
        }

        if let Some(text) = client
            .inner_text(&Locator::css(&cfg.ratings_count).first())
            .await?
        {
            record.review_count = parse_review_count(&text)?;
        }

        let author = client
            .inner_text(&Locator::css(&cfg.author).first())
            .await?
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        record.author = Some(author.unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()));

        record.genres = self.read_genres(client).await?;

        Ok(Resolution::Resolved(record.clone()))
    }

    async fn read_genres<C>(&self, client: &C) -> Result<Vec<String>>
    where
        C: RenderClient + ?Sized,
    {
        let cfg = &self.config;
        let section = Locator::css(&cfg.genre_section).first();
        if client.count(&section).await? == 0 {
            debug!("no genre section");
            return Ok(Vec::new());
        }
        client.scroll_into_view(&section).await?;

        let expander = Locator::css(&cfg.expander)
            .has_text(&cfg.expander_text)
            .first();
        if client.is_visible(&expander).await? {
            client.click(&expander).await?;
            settle(cfg.expander_settle).await;
        }

        let chips = section.locate(&cfg.genre_chip);
        if let Err(e) = client
            .wait_for(&chips.first(), ElementState::Visible, cfg.optional_timeout)
            .await
        {
            debug!(error = %e, "genre chips not visible, reading what is there");
        }

        let genres = client
            .all_inner_texts(&chips)
            .await?
            .into_iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty() && *g != cfg.expander_label)
            .collect();
        Ok(genres)
    }
}

/// Parse a displayed rating such as `"4.27"`.
pub fn parse_rating(text: &str) -> Result<f64> {
    let text = text.trim();
    text.parse::<f64>()
        .ok()
        .filter(|r| r.is_finite())
        .ok_or_else(|| GalleyScoutError::parse(format!("invalid rating {text:?}")))
}

/// Digits of a formatted count such as `"1,234,567 ratings"`; no digits is 0.
pub fn parse_review_count(text: &str) -> Result<u64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Ok(0);
    }
    digits
        .parse()
        .map_err(|e| GalleyScoutError::parse(format!("invalid review count {text:?}: {e}")))
}

async fn settle(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}
