//! Catalog crawling.
//!
//! This crate provides:
//! - [`engine`] — the panel-driven catalog extractor producing [`Candidate`]s
//!
//! [`Candidate`]: galleyscout_shared::Candidate

pub mod engine;

pub use engine::{CatalogCrawler, PageOutcome, strip_author_prefix};
