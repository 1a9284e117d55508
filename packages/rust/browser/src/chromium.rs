//! Chrome/Chromium render client using chromiumoxide.
//!
//! Locators are compiled to a JavaScript snippet that rebuilds the element
//! set from `document` on every call, so stale handles never leak out of a
//! re-rendered catalog grid.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument};

use galleyscout_shared::{BrowserSettings, GalleyScoutError, Result};

use crate::locator::{Locator, Step};
use crate::{RenderClient, WaitUntil};

/// Environment variable naming an explicit browser binary.
pub const CHROME_PATH_ENV: &str = "GALLEYSCOUT_CHROME_PATH";

/// Interval between load-state checks after navigation.
const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long resource activity must stay flat to count as network idle.
const NETWORK_IDLE_QUIET: Duration = Duration::from_millis(500);

/// Helpers shared by every compiled locator script.
const PRELUDE: &str = r#"
const __visible = (e) => {
  if (!(e instanceof Element)) return false;
  const s = getComputedStyle(e);
  if (s.display === 'none' || s.visibility === 'hidden') return false;
  const r = e.getBoundingClientRect();
  return r.width > 0 && r.height > 0;
};
const __text = (e) => ((e.innerText ?? e.textContent) || '').toLowerCase();
"#;

/// Find a Chrome or Chromium binary.
pub fn find_chrome() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CHROME_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// A single Chrome tab with a persistent profile directory.
pub struct ChromiumClient {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumClient {
    /// Launch Chrome with the session directory as its profile and open one tab.
    #[instrument(skip_all, fields(session_dir = %settings.session_dir.display(), headless = settings.headless))]
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let chrome_path = settings.chrome_path.clone().or_else(find_chrome).ok_or_else(|| {
            GalleyScoutError::Browser(format!(
                "Chrome/Chromium not found. Set browser.chrome_path or {CHROME_PATH_ENV}."
            ))
        })?;

        std::fs::create_dir_all(&settings.session_dir)
            .map_err(|e| GalleyScoutError::io(&settings.session_dir, e))?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .user_data_dir(&settings.session_dir)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage");
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(|e| {
            GalleyScoutError::Browser(format!("failed to build browser config: {e}"))
        })?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|e| GalleyScoutError::Browser(format!("failed to launch Chrome: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| GalleyScoutError::Browser(format!("failed to open tab: {e}")))?;

        info!(chrome = %chrome_path.display(), "browser launched");

        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    /// Close the browser, flushing the profile to the session directory.
    pub async fn close(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| GalleyScoutError::Browser(format!("failed to close browser: {e}")))?;
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let mut params = EvaluateParams::new(script);
        params.return_by_value = Some(true);
        params.await_promise = Some(true);

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| GalleyScoutError::Browser(format!("script evaluation failed: {e}")))?;

        let wrapped: Wrapped<T> = result
            .into_value()
            .map_err(|e| GalleyScoutError::Browser(format!("unexpected script result: {e}")))?;
        Ok(wrapped.value)
    }

    /// Evaluate `body` with `els` bound to the locator's element set.
    async fn eval_on<T: DeserializeOwned>(&self, locator: &Locator, body: &str) -> Result<T> {
        self.eval(format!(
            "(() => {{ {PRELUDE} {} {body} }})()",
            compile(locator)
        ))
        .await
    }

    async fn wait_for_load(
        &self,
        url: &str,
        wait_until: WaitUntil,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<()> {
        let mut last_resources: Option<u64> = None;
        let mut quiet_since = Instant::now();

        loop {
            let state: LoadState = self
                .eval(
                    "({ value: { ready: document.readyState, resources: performance.getEntriesByType('resource').length } })"
                        .to_string(),
                )
                .await?;

            let done = match wait_until {
                WaitUntil::DomContentLoaded => state.ready != "loading",
                WaitUntil::Load => state.ready == "complete",
                WaitUntil::NetworkIdle => {
                    if last_resources != Some(state.resources) {
                        last_resources = Some(state.resources);
                        quiet_since = Instant::now();
                    }
                    state.ready == "complete" && quiet_since.elapsed() >= NETWORK_IDLE_QUIET
                }
            };
            if done {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(GalleyScoutError::timeout(
                    format!("{url} to reach {wait_until:?}"),
                    timeout,
                ));
            }
            sleep(LOAD_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

#[derive(Deserialize)]
struct Wrapped<T> {
    value: T,
}

#[derive(Deserialize)]
struct LoadState {
    ready: String,
    resources: u64,
}

#[async_trait]
impl RenderClient for ChromiumClient {
    async fn navigate(&self, url: &str, wait_until: WaitUntil, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        debug!(url, ?wait_until, "navigating");

        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(GalleyScoutError::Browser(format!(
                    "navigation to {url} failed: {e}"
                )));
            }
            Err(_) => return Err(GalleyScoutError::timeout(format!("navigation to {url}"), timeout)),
        }

        self.wait_for_load(url, wait_until, deadline, timeout).await
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        self.eval_on(locator, "return { value: els.length };").await
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool> {
        self.eval_on(
            locator,
            "return { value: els.length > 0 && __visible(els[0]) };",
        )
        .await
    }

    async fn inner_text(&self, locator: &Locator) -> Result<Option<String>> {
        self.eval_on(
            locator,
            "return { value: els.length ? (els[0].innerText ?? els[0].textContent ?? '') : null };",
        )
        .await
    }

    async fn all_inner_texts(&self, locator: &Locator) -> Result<Vec<String>> {
        self.eval_on(
            locator,
            "return { value: els.map((e) => e.innerText ?? e.textContent ?? '') };",
        )
        .await
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        let body = format!(
            "return {{ value: els.length ? els[0].getAttribute({}) : null }};",
            js_string(name)
        );
        self.eval_on(locator, &body).await
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let clicked: bool = self
            .eval_on(
                locator,
                "if (!els.length) return { value: false }; els[0].click(); return { value: true };",
            )
            .await?;
        if clicked {
            Ok(())
        } else {
            Err(GalleyScoutError::element_not_found(locator))
        }
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<()> {
        let scrolled: bool = self
            .eval_on(
                locator,
                "if (!els.length) return { value: false }; els[0].scrollIntoView({ block: 'center', inline: 'nearest' }); return { value: true };",
            )
            .await?;
        if scrolled {
            Ok(())
        } else {
            Err(GalleyScoutError::element_not_found(locator))
        }
    }
}

// ---------------------------------------------------------------------------
// Locator compilation
// ---------------------------------------------------------------------------

/// Compile a locator into statements that leave the element array in `els`.
fn compile(locator: &Locator) -> String {
    let mut js = String::from("let els = [document];");
    for step in locator.steps() {
        let stmt = match step {
            Step::Css(sel) => format!(
                "els = [...new Set(els.flatMap((e) => Array.from(e.querySelectorAll({}))))];",
                js_string(sel)
            ),
            Step::Nth(n) => format!("els = els.length > {n} ? [els[{n}]] : [];"),
            Step::PrecedingSibling => {
                "els = els.map((e) => e.previousElementSibling).filter((e) => e);".to_string()
            }
            Step::Visible => "els = els.filter(__visible);".to_string(),
            Step::HasText(t) => format!(
                "els = els.filter((e) => __text(e).includes({}));",
                js_string(t)
            ),
            Step::Text(t) => format!(
                "els = els.filter((e) => __text(e).includes({n}) && !Array.from(e.children).some((c) => __text(c).includes({n})));",
                n = js_string(t)
            ),
        };
        js.push_str(&stmt);
    }
    js
}

/// Quote a Rust string as a JavaScript string literal.
fn js_string(s: &str) -> String {
    // JSON string literals are valid JavaScript string literals.
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
