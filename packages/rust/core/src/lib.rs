//! Core pipeline orchestration and domain logic for GalleyScout.
//!
//! This crate ties together catalog extraction, cross-reference resolution,
//! and filtering/ranking into one end-to-end run (see [`pipeline::run`]).

pub mod pipeline;
pub mod ranking;
pub mod resolver;

pub use pipeline::{
    ProgressReporter, RunConfig, RunOutcome, RunReport, RunState, SilentProgress, run,
};
pub use ranking::{FilterPolicy, rank};
pub use resolver::{Resolver, parse_rating, parse_review_count};
