//! In-memory [`RenderClient`] over static HTML routes.
//!
//! Pages are parsed with `scraper` on every operation. A small interaction
//! model stands in for page scripts:
//!
//! - elements with a `hidden` attribute or inline `display: none` (or inside
//!   one) are invisible;
//! - clicking an element with `data-reveal="<id>"` un-hides the element with
//!   that id, clicking one with `data-dismiss` hides everything revealed;
//! - clicking any other link navigates to its `href`;
//! - clicking an element with `data-fail-click` fails, as an intercepted click would;
//! - an element with `data-fail-clicks="<n>"` fails its first `n` clicks, then succeeds.
//!
//! Navigation resets revealed state.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use galleyscout_shared::{GalleyScoutError, Result};

use crate::locator::{Locator, Step};
use crate::{RenderClient, WaitUntil};

#[derive(Debug, Default)]
struct FixtureState {
    current_url: Option<String>,
    revealed: HashSet<String>,
    navigations: Vec<String>,
    clicks: usize,
    failed_clicks: HashMap<String, u32>,
}

/// Static-HTML render client for tests.
#[derive(Debug, Default)]
pub struct FixtureClient {
    routes: HashMap<String, String>,
    state: Mutex<FixtureState>,
}

impl FixtureClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` when `url` is navigated to.
    pub fn route(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.routes.insert(url.into(), html.into());
        self
    }

    /// URLs navigated to so far, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    /// Number of successful clicks.
    pub fn clicks(&self) -> usize {
        self.state().clicks
    }

    pub fn current_url(&self) -> Option<String> {
        self.state().current_url.clone()
    }

    fn state(&self) -> MutexGuard<'_, FixtureState> {
        // A panicking test thread is the only way to poison this lock.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn go_to(&self, state: &mut FixtureState, url: &str) -> Result<()> {
        if !self.routes.contains_key(url) {
            return Err(GalleyScoutError::Browser(format!(
                "net::ERR_NAME_NOT_RESOLVED at {url}"
            )));
        }
        state.current_url = Some(url.to_string());
        state.revealed.clear();
        state.navigations.push(url.to_string());
        Ok(())
    }

    /// Parse the current page, resolve `locator`, and hand the matches to `f`.
    fn with_matches<R>(
        &self,
        locator: &Locator,
        f: impl FnOnce(&[ElementRef<'_>], &mut FixtureState) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state();
        let url = state
            .current_url
            .clone()
            .ok_or_else(|| GalleyScoutError::Browser("no page loaded".into()))?;
        let html = self.routes.get(&url).map(String::as_str).unwrap_or_default();
        let doc = Html::parse_document(html);
        let matches = resolve(&doc, locator, &state.revealed)?;
        f(&matches, &mut state)
    }
}

#[async_trait]
impl RenderClient for FixtureClient {
    async fn navigate(&self, url: &str, _wait_until: WaitUntil, _timeout: Duration) -> Result<()> {
        let mut state = self.state();
        self.go_to(&mut state, url)
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        self.with_matches(locator, |els, _| Ok(els.len()))
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool> {
        self.with_matches(locator, |els, state| {
            Ok(els.first().is_some_and(|el| is_visible(el, &state.revealed)))
        })
    }

    async fn inner_text(&self, locator: &Locator) -> Result<Option<String>> {
        self.with_matches(locator, |els, _| Ok(els.first().map(text_of)))
    }

    async fn all_inner_texts(&self, locator: &Locator) -> Result<Vec<String>> {
        self.with_matches(locator, |els, _| Ok(els.iter().map(text_of).collect()))
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        self.with_matches(locator, |els, _| {
            Ok(els
                .first()
                .and_then(|el| el.value().attr(name))
                .map(String::from))
        })
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let target = self.with_matches(locator, |els, state| {
            let el = els
                .first()
                .ok_or_else(|| GalleyScoutError::element_not_found(locator))?;
            if !is_visible(el, &state.revealed) {
                return Err(GalleyScoutError::Browser(format!(
                    "element is not visible: {locator}"
                )));
            }
            if el.value().attr("data-fail-click").is_some() {
                return Err(GalleyScoutError::Browser(format!(
                    "click intercepted by another element: {locator}"
                )));
            }
            if let Some(limit) = el.value().attr("data-fail-clicks") {
                let key = el.value().id().unwrap_or_default().to_string();
                let failed = state.failed_clicks.entry(key).or_default();
                if *failed < limit.parse().unwrap_or(0) {
                    *failed += 1;
                    return Err(GalleyScoutError::Browser(format!(
                        "click intercepted by another element: {locator}"
                    )));
                }
            }

            state.clicks += 1;
            if let Some(id) = el.value().attr("data-reveal") {
                state.revealed.insert(id.to_string());
                Ok(None)
            } else if el.value().attr("data-dismiss").is_some() {
                state.revealed.clear();
                Ok(None)
            } else if el.value().name() == "a" {
                Ok(el.value().attr("href").map(String::from))
            } else {
                Ok(None)
            }
        })?;

        if let Some(href) = target {
            let mut state = self.state();
            let base = state.current_url.clone().unwrap_or_default();
            let url = Url::parse(&base)
                .and_then(|b| b.join(&href))
                .map(|u| u.to_string())
                .unwrap_or(href);
            self.go_to(&mut state, &url)?;
        }
        Ok(())
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<()> {
        self.with_matches(locator, |els, _| {
            if els.is_empty() {
                return Err(GalleyScoutError::element_not_found(locator));
            }
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Locator resolution
// ---------------------------------------------------------------------------

fn resolve<'a>(
    doc: &'a Html,
    locator: &Locator,
    revealed: &HashSet<String>,
) -> Result<Vec<ElementRef<'a>>> {
    let mut current: Option<Vec<ElementRef<'a>>> = None;

    for step in locator.steps() {
        let els = match (step, current.take()) {
            (Step::Css(sel), None) => doc.select(&parse_selector(sel)?).collect(),
            (step, None) => apply(step, vec![doc.root_element()], revealed)?,
            (step, Some(els)) => apply(step, els, revealed)?,
        };
        current = Some(els);
    }

    Ok(current.unwrap_or_default())
}

fn apply<'a>(
    step: &Step,
    els: Vec<ElementRef<'a>>,
    revealed: &HashSet<String>,
) -> Result<Vec<ElementRef<'a>>> {
    Ok(match step {
        Step::Css(sel) => {
            let selector = parse_selector(sel)?;
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for el in els {
                for found in el.select(&selector) {
                    if found.id() != el.id() && seen.insert(found.id()) {
                        out.push(found);
                    }
                }
            }
            out
        }
        Step::Nth(n) => els.get(*n).copied().into_iter().collect(),
        Step::PrecedingSibling => els
            .iter()
            .filter_map(|el| el.prev_siblings().find_map(ElementRef::wrap))
            .collect(),
        Step::Visible => els
            .into_iter()
            .filter(|el| is_visible(el, revealed))
            .collect(),
        Step::HasText(needle) => els
            .into_iter()
            .filter(|el| text_of(el).to_lowercase().contains(needle))
            .collect(),
        Step::Text(needle) => els
            .into_iter()
            .filter(|el| {
                text_of(el).to_lowercase().contains(needle)
                    && !el
                        .children()
                        .filter_map(ElementRef::wrap)
                        .any(|child| text_of(&child).to_lowercase().contains(needle))
            })
            .collect(),
    })
}

fn parse_selector(sel: &str) -> Result<Selector> {
    Selector::parse(sel)
        .map_err(|e| GalleyScoutError::validation(format!("invalid selector {sel:?}: {e:?}")))
}

/// Whitespace-collapsed text content.
fn text_of(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_visible(el: &ElementRef<'_>, revealed: &HashSet<String>) -> bool {
    std::iter::once(**el)
        .chain(el.ancestors())
        .filter_map(ElementRef::wrap)
        .all(|node| {
            let value = node.value();
            let hidden_attr = value.attr("hidden").is_some()
                && !value.id().is_some_and(|id| revealed.contains(id));
            let display_none = value.attr("style").is_some_and(|style| {
                style
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>()
                    .to_lowercase()
                    .contains("display:none")
            });
            !hidden_attr && !display_none
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <table>
          <tr class="covers"><td><a href="/a" data-reveal="p1">A</a></td><td><a data-reveal="p2">B</a></td></tr>
          <tr class="detail"><td><a href="/book/a">A</a></td><td><a>B</a></td></tr>
          <tr class="detail" style="display: none"><td><a href="/ghost">G</a></td></tr>
        </table>
        <div id="p1" hidden><h2>  Alpha
           Title </h2><button data-dismiss>x</button></div>
        <div id="p2" hidden><h2>Beta</h2></div>
        <h3>Page 1 of about 40 results</h3>
        <a id="go" href="/next">next</a>
    </body></html>"#;

    async fn client() -> FixtureClient {
        let client = FixtureClient::new()
            .route("https://site.test/list", PAGE)
            .route("https://site.test/next", "<p>next page</p>");
        client
            .navigate("https://site.test/list", WaitUntil::NetworkIdle, Duration::ZERO)
            .await
            .unwrap();
        client
    }

    #[tokio::test]
    async fn css_and_visibility_filters() {
        let client = client().await;
        let rows = Locator::css("tr.detail");
        assert_eq!(client.count(&rows).await.unwrap(), 2);
        assert_eq!(client.count(&rows.visible()).await.unwrap(), 1);
        assert!(!client.is_visible(&rows.nth(1)).await.unwrap());
    }

    #[tokio::test]
    async fn preceding_sibling_pairs_rows_by_column() {
        let client = client().await;
        let detail = Locator::css("tr.detail").first();
        let covers = detail.preceding_sibling().locate("a");
        assert_eq!(client.count(&covers).await.unwrap(), 2);
        assert_eq!(
            client.attribute(&detail.locate("a").nth(0), "href").await.unwrap(),
            Some("/book/a".into())
        );
        assert_eq!(
            client.attribute(&detail.locate("a").nth(1), "href").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn reveal_and_dismiss() {
        let client = client().await;
        let title = Locator::css("h2").visible().first();
        assert_eq!(client.inner_text(&title).await.unwrap(), None);

        client
            .click(&Locator::css("tr.covers a").first())
            .await
            .unwrap();
        assert_eq!(
            client.inner_text(&title).await.unwrap(),
            Some("Alpha Title".into())
        );

        client.click(&Locator::css("button")).await.unwrap();
        assert_eq!(client.inner_text(&title).await.unwrap(), None);
        assert_eq!(client.clicks(), 2);
    }

    #[tokio::test]
    async fn clicking_hidden_element_fails() {
        let client = client().await;
        let err = client.click(&Locator::css("button")).await.unwrap_err();
        assert!(err.to_string().contains("not visible"));
    }

    #[tokio::test]
    async fn flaky_element_recovers_after_failed_clicks() {
        let client = FixtureClient::new().route(
            "https://site.test/",
            r#"<button id="b" data-fail-clicks="2">x</button>"#,
        );
        client
            .navigate("https://site.test/", WaitUntil::Load, Duration::ZERO)
            .await
            .unwrap();

        let button = Locator::css("#b");
        assert!(client.click(&button).await.is_err());
        assert!(client.click(&button).await.is_err());
        client.click(&button).await.unwrap();
        assert_eq!(client.clicks(), 1);
    }

    #[tokio::test]
    async fn text_locator_finds_innermost_element() {
        let client = client().await;
        let marker = Locator::text("page 1 of ABOUT");
        assert_eq!(client.count(&marker).await.unwrap(), 1);
        assert!(client.is_visible(&marker).await.unwrap());
    }

    #[tokio::test]
    async fn clicking_link_navigates() {
        let client = client().await;
        client.click(&Locator::css("#go")).await.unwrap();
        assert_eq!(client.current_url().as_deref(), Some("https://site.test/next"));
        assert_eq!(client.navigations().len(), 2);
    }

    #[tokio::test]
    async fn unknown_route_fails_navigation() {
        let client = FixtureClient::new();
        let result = client
            .navigate("https://nowhere.test/", WaitUntil::Load, Duration::ZERO)
            .await;
        assert!(result.is_err());
        assert!(client.navigations().is_empty());
    }
}
