//! Render Client capability: drive a live page through locators.
//!
//! This crate provides:
//! - [`RenderClient`] — the operations the catalog extractor and resolver need
//! - [`Locator`] — engine-neutral element selection
//! - [`chromium`] — a Chrome/Chromium implementation over CDP
//! - `fixture` (feature `fixture`) — an in-memory implementation over static HTML, for tests

pub mod chromium;
#[cfg(any(test, feature = "fixture"))]
pub mod fixture;
pub mod locator;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep};

use galleyscout_shared::{GalleyScoutError, Result};

pub use chromium::{ChromiumClient, find_chrome};
#[cfg(any(test, feature = "fixture"))]
pub use fixture::FixtureClient;
pub use locator::{Locator, Step};

/// Interval between checks in [`RenderClient::wait_for`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Load condition a navigation waits for before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    DomContentLoaded,
    Load,
    /// Load complete and no new network activity for a short quiet period.
    NetworkIdle,
}

/// Element condition awaited by [`RenderClient::wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// At least one element matches.
    Attached,
    /// The first matching element is rendered and visible.
    Visible,
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attached => f.write_str("attached"),
            Self::Visible => f.write_str("visible"),
        }
    }
}

/// A single browser page driven one operation at a time.
///
/// Every call is a suspension point. Callers must not interleave operations
/// from different tasks against the same client.
#[async_trait]
pub trait RenderClient: Send + Sync {
    /// Navigate to `url` and wait for `wait_until`, failing after `timeout`.
    async fn navigate(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> Result<()>;

    /// Number of elements the locator currently resolves to.
    async fn count(&self, locator: &Locator) -> Result<usize>;

    /// Whether the first matching element is visible (`false` if none match).
    async fn is_visible(&self, locator: &Locator) -> Result<bool>;

    /// Rendered text of the first matching element, `None` if none match.
    async fn inner_text(&self, locator: &Locator) -> Result<Option<String>>;

    /// Rendered text of every matching element, in document order.
    async fn all_inner_texts(&self, locator: &Locator) -> Result<Vec<String>>;

    /// Attribute of the first matching element; `None` if absent or nothing matches.
    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>>;

    /// Click the first matching element.
    async fn click(&self, locator: &Locator) -> Result<()>;

    /// Scroll the first matching element into the viewport.
    async fn scroll_into_view(&self, locator: &Locator) -> Result<()>;

    /// Poll until the locator reaches `state`, failing with a timeout error.
    async fn wait_for(
        &self,
        locator: &Locator,
        state: ElementState,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let ready = match state {
                ElementState::Attached => self.count(locator).await? > 0,
                ElementState::Visible => self.is_visible(locator).await?,
            };
            if ready {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(GalleyScoutError::timeout(
                    format!("{locator} to be {state}"),
                    timeout,
                ));
            }
            sleep(WAIT_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_times_out_on_missing_element() {
        let client = FixtureClient::new().route("https://a/", "<html><body></body></html>");
        client
            .navigate("https://a/", WaitUntil::Load, Duration::from_secs(1))
            .await
            .unwrap();

        let err = client
            .wait_for(
                &Locator::css("p"),
                ElementState::Attached,
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn wait_for_distinguishes_attached_from_visible() {
        let client = FixtureClient::new().route("https://a/", r#"<p hidden>later</p>"#);
        client
            .navigate("https://a/", WaitUntil::Load, Duration::from_secs(1))
            .await
            .unwrap();

        let p = Locator::css("p");
        client
            .wait_for(&p, ElementState::Attached, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(
            client
                .wait_for(&p, ElementState::Visible, Duration::from_millis(20))
                .await
                .is_err()
        );
    }
}
