//! Application configuration for GalleyScout.
//!
//! User config lives at `~/.galleyscout/galleyscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GalleyScoutError, Result};
use crate::retry::RetryPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "galleyscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".galleyscout";

/// Placeholder substituted with the page number in catalog URL templates.
pub const PAGE_PLACEHOLDER: &str = "{page}";

// ---------------------------------------------------------------------------
// Config structs (matching galleyscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Catalog pages and panel selectors.
    #[serde(default)]
    pub catalog: CatalogSection,

    /// External search source and entity page selectors.
    #[serde(default)]
    pub resolver: ResolverSection,

    /// Inclusion thresholds.
    #[serde(default)]
    pub filter: FilterSection,

    /// Browser launch settings.
    #[serde(default)]
    pub browser: BrowserSection,

    /// Export destinations.
    #[serde(default)]
    pub output: OutputSection,
}

/// `[catalog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSection {
    /// Catalog listing URL; `{page}` is replaced with the page number.
    #[serde(default = "default_page_url_template")]
    pub page_url_template: String,
    /// Base for resolving relative detail links.
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,
    #[serde(default = "default_first_page")]
    pub first_page: u32,
    #[serde(default = "default_last_page")]
    pub last_page: u32,

    /// Marker class of genuine item rows.
    #[serde(default = "default_detail_row")]
    pub detail_row: String,
    /// Links inside a cover row or a detail row.
    #[serde(default = "default_row_link")]
    pub row_link: String,
    /// Close control of the detail panel.
    #[serde(default = "default_close_button")]
    pub close_button: String,
    #[serde(default = "default_panel_title")]
    pub panel_title: String,
    #[serde(default = "default_panel_author")]
    pub panel_author: String,

    #[serde(default = "default_attempts")]
    pub panel_ready_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub panel_ready_delay_ms: u64,
    #[serde(default = "default_attempts")]
    pub close_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub close_delay_ms: u64,
    #[serde(default = "default_post_close_settle_ms")]
    pub post_close_settle_ms: u64,
    #[serde(default = "default_catalog_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            page_url_template: default_page_url_template(),
            base_url: default_catalog_base_url(),
            first_page: default_first_page(),
            last_page: default_last_page(),
            detail_row: default_detail_row(),
            row_link: default_row_link(),
            close_button: default_close_button(),
            panel_title: default_panel_title(),
            panel_author: default_panel_author(),
            panel_ready_attempts: default_attempts(),
            panel_ready_delay_ms: default_retry_delay_ms(),
            close_attempts: default_attempts(),
            close_delay_ms: default_retry_delay_ms(),
            post_close_settle_ms: default_post_close_settle_ms(),
            navigation_timeout_ms: default_catalog_navigation_timeout_ms(),
        }
    }
}

fn default_page_url_template() -> String {
    "https://www.netgalley.com/catalog/category/36/mostRequested?=s.requestsRecent&direction=desc&page={page}".into()
}
fn default_catalog_base_url() -> String {
    "https://www.netgalley.com".into()
}
fn default_first_page() -> u32 {
    1
}
fn default_last_page() -> u32 {
    5
}
fn default_detail_row() -> String {
    "tr.cover-table-detail-row".into()
}
fn default_row_link() -> String {
    "a".into()
}
fn default_close_button() -> String {
    r#"button[class*="close-button"]"#.into()
}
fn default_panel_title() -> String {
    r#"h2[itemprop="name"]"#.into()
}
fn default_panel_author() -> String {
    r#"h3[itemprop="author"]"#.into()
}
fn default_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_post_close_settle_ms() -> u64 {
    300
}
fn default_catalog_navigation_timeout_ms() -> u64 {
    30_000
}

/// `[resolver]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSection {
    /// Search endpoint; the query is appended as `?q=`.
    #[serde(default = "default_search_url")]
    pub search_url: String,
    /// Base for resolving relative result links.
    #[serde(default = "default_resolver_base_url")]
    pub base_url: String,
    /// Text that appears once search results have rendered.
    #[serde(default = "default_results_marker_text")]
    pub results_marker_text: String,

    #[serde(default = "default_result_link")]
    pub result_link: String,
    #[serde(default = "default_rating")]
    pub rating: String,
    #[serde(default = "default_ratings_count")]
    pub ratings_count: String,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default = "default_genre_section")]
    pub genre_section: String,
    #[serde(default = "default_genre_chip")]
    pub genre_chip: String,
    /// Candidates for the genre list expander control.
    #[serde(default = "default_expander")]
    pub expander: String,
    /// Text the expander control contains.
    #[serde(default = "default_expander_text")]
    pub expander_text: String,
    /// Placeholder chip label that is not a real genre.
    #[serde(default = "default_expander_label")]
    pub expander_label: String,

    #[serde(default = "default_resolver_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    #[serde(default = "default_results_timeout_ms")]
    pub results_timeout_ms: u64,
    #[serde(default = "default_optional_timeout_ms")]
    pub optional_timeout_ms: u64,
    #[serde(default = "default_expander_settle_ms")]
    pub expander_settle_ms: u64,
    /// Pause after each candidate to stay polite to the external source.
    #[serde(default = "default_per_candidate_delay_ms")]
    pub per_candidate_delay_ms: u64,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            base_url: default_resolver_base_url(),
            results_marker_text: default_results_marker_text(),
            result_link: default_result_link(),
            rating: default_rating(),
            ratings_count: default_ratings_count(),
            author: default_author(),
            genre_section: default_genre_section(),
            genre_chip: default_genre_chip(),
            expander: default_expander(),
            expander_text: default_expander_text(),
            expander_label: default_expander_label(),
            navigation_timeout_ms: default_resolver_navigation_timeout_ms(),
            results_timeout_ms: default_results_timeout_ms(),
            optional_timeout_ms: default_optional_timeout_ms(),
            expander_settle_ms: default_expander_settle_ms(),
            per_candidate_delay_ms: default_per_candidate_delay_ms(),
        }
    }
}

fn default_search_url() -> String {
    "https://www.goodreads.com/search".into()
}
fn default_resolver_base_url() -> String {
    "https://www.goodreads.com".into()
}
fn default_results_marker_text() -> String {
    "Page 1 of about".into()
}
fn default_result_link() -> String {
    "a.bookTitle".into()
}
fn default_rating() -> String {
    ".RatingStatistics__rating".into()
}
fn default_ratings_count() -> String {
    r#"[data-testid="ratingsCount"]"#.into()
}
fn default_author() -> String {
    ".ContributorLink__name".into()
}
fn default_genre_section() -> String {
    ".BookPageMetadataSection__genres".into()
}
fn default_genre_chip() -> String {
    ".Button__labelItem".into()
}
fn default_expander() -> String {
    "button, .Button--link".into()
}
fn default_expander_text() -> String {
    "more".into()
}
fn default_expander_label() -> String {
    "...more".into()
}
fn default_resolver_navigation_timeout_ms() -> u64 {
    15_000
}
fn default_results_timeout_ms() -> u64 {
    10_000
}
fn default_optional_timeout_ms() -> u64 {
    5_000
}
fn default_expander_settle_ms() -> u64 {
    500
}
fn default_per_candidate_delay_ms() -> u64 {
    1_500
}

/// `[filter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSection {
    /// Minimum rating (inclusive) for a result to be exported.
    #[serde(default = "default_min_rating")]
    pub min_rating: f64,
    /// Genres (case-insensitive) that exclude a result.
    #[serde(default = "default_excluded_genres")]
    pub excluded_genres: Vec<String>,
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            min_rating: default_min_rating(),
            excluded_genres: default_excluded_genres(),
        }
    }
}

fn default_min_rating() -> f64 {
    4.0
}
fn default_excluded_genres() -> Vec<String> {
    ["children", "childrens", "middle grade", "teen", "young adult"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSection {
    /// Directory holding the persistent browser profile (login session).
    #[serde(default = "default_session_dir")]
    pub session_dir: String,
    /// Run without a visible window. Off by default so the user can log in.
    #[serde(default)]
    pub headless: bool,
    /// Explicit Chrome/Chromium binary; discovered when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            session_dir: default_session_dir(),
            headless: false,
            chrome_path: None,
        }
    }
}

fn default_session_dir() -> String {
    "./netgalley_session".into()
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_tsv_path")]
    pub tsv_path: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            tsv_path: default_tsv_path(),
        }
    }
}

fn default_tsv_path() -> String {
    "netgalley_data.tsv".into()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config file + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime catalog extraction configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub page_url_template: String,
    pub base_url: String,
    pub first_page: u32,
    pub last_page: u32,
    pub detail_row: String,
    pub row_link: String,
    pub close_button: String,
    pub panel_title: String,
    pub panel_author: String,
    /// Wait for the panel's close control after clicking a cover.
    pub panel_ready: RetryPolicy,
    /// Close the panel after reading it.
    pub panel_close: RetryPolicy,
    pub post_close_settle: Duration,
    pub navigation_timeout: Duration,
}

impl CatalogConfig {
    /// Catalog page URLs for the configured (inclusive) page range.
    pub fn page_urls(&self) -> Result<Vec<String>> {
        if self.first_page == 0 || self.first_page > self.last_page {
            return Err(GalleyScoutError::validation(format!(
                "invalid page range {}..={}",
                self.first_page, self.last_page
            )));
        }
        if !self.page_url_template.contains(PAGE_PLACEHOLDER) {
            return Err(GalleyScoutError::config(format!(
                "page_url_template must contain {PAGE_PLACEHOLDER}"
            )));
        }

        Ok((self.first_page..=self.last_page)
            .map(|page| {
                self.page_url_template
                    .replace(PAGE_PLACEHOLDER, &page.to_string())
            })
            .collect())
    }
}

impl From<&AppConfig> for CatalogConfig {
    fn from(config: &AppConfig) -> Self {
        let c = &config.catalog;
        Self {
            page_url_template: c.page_url_template.clone(),
            base_url: c.base_url.clone(),
            first_page: c.first_page,
            last_page: c.last_page,
            detail_row: c.detail_row.clone(),
            row_link: c.row_link.clone(),
            close_button: c.close_button.clone(),
            panel_title: c.panel_title.clone(),
            panel_author: c.panel_author.clone(),
            panel_ready: RetryPolicy::fixed(
                c.panel_ready_attempts,
                Duration::from_millis(c.panel_ready_delay_ms),
            ),
            panel_close: RetryPolicy::fixed(
                c.close_attempts,
                Duration::from_millis(c.close_delay_ms),
            ),
            post_close_settle: Duration::from_millis(c.post_close_settle_ms),
            navigation_timeout: Duration::from_millis(c.navigation_timeout_ms),
        }
    }
}

/// Runtime cross-reference configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub search_url: String,
    pub base_url: String,
    pub results_marker_text: String,
    pub result_link: String,
    pub rating: String,
    pub ratings_count: String,
    pub author: String,
    pub genre_section: String,
    pub genre_chip: String,
    pub expander: String,
    pub expander_text: String,
    pub expander_label: String,
    pub navigation_timeout: Duration,
    pub results_timeout: Duration,
    pub optional_timeout: Duration,
    pub expander_settle: Duration,
    pub per_candidate_delay: Duration,
}

impl From<&AppConfig> for ResolverConfig {
    fn from(config: &AppConfig) -> Self {
        let r = &config.resolver;
        Self {
            search_url: r.search_url.clone(),
            base_url: r.base_url.clone(),
            results_marker_text: r.results_marker_text.clone(),
            result_link: r.result_link.clone(),
            rating: r.rating.clone(),
            ratings_count: r.ratings_count.clone(),
            author: r.author.clone(),
            genre_section: r.genre_section.clone(),
            genre_chip: r.genre_chip.clone(),
            expander: r.expander.clone(),
            expander_text: r.expander_text.clone(),
            expander_label: r.expander_label.clone(),
            navigation_timeout: Duration::from_millis(r.navigation_timeout_ms),
            results_timeout: Duration::from_millis(r.results_timeout_ms),
            optional_timeout: Duration::from_millis(r.optional_timeout_ms),
            expander_settle: Duration::from_millis(r.expander_settle_ms),
            per_candidate_delay: Duration::from_millis(r.per_candidate_delay_ms),
        }
    }
}

/// Runtime inclusion thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub min_rating: f64,
    pub excluded_genres: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FilterConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            min_rating: config.filter.min_rating,
            excluded_genres: config.filter.excluded_genres.clone(),
        }
    }
}

/// Runtime browser launch settings.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub session_dir: PathBuf,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
}

impl From<&AppConfig> for BrowserSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            session_dir: PathBuf::from(&config.browser.session_dir),
            headless: config.browser.headless,
            chrome_path: config.browser.chrome_path.as_ref().map(PathBuf::from),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.galleyscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GalleyScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.galleyscout/galleyscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GalleyScoutError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        GalleyScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    init_config_in(&config_dir()?)
}

/// Write a default config file into `dir`, creating it if needed.
pub fn init_config_in(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| GalleyScoutError::io(dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GalleyScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GalleyScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
