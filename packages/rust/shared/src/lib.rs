//! Shared types, error model, and configuration for GalleyScout.
//!
//! This crate is the foundation depended on by all other GalleyScout crates.
//! It provides:
//! - [`GalleyScoutError`] — the unified error type
//! - Domain types ([`Candidate`], [`EnrichedResult`], [`Resolution`], visited sets)
//! - Configuration ([`AppConfig`], runtime configs, config loading)
//! - [`RetryPolicy`] for bounded polling of asynchronously rendered UI

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserSection, BrowserSettings, CatalogConfig, CatalogSection, FilterConfig,
    FilterSection, OutputSection, ResolverConfig, ResolverSection, config_dir, config_file_path,
    init_config, init_config_in, load_config, load_config_from,
};
pub use error::{GalleyScoutError, Result};
pub use retry::RetryPolicy;
pub use types::{
    Candidate, EnrichedResult, ExternalRecord, Resolution, UNKNOWN_AUTHOR, VisitedExternalUrls,
    VisitedTitles, canonical_url,
};
