//! Output collaborators for a finished run.
//!
//! - [`tsv`] — the tab-separated export file
//! - [`table`] — the console summary table
//!
//! Both are display-only: nothing here changes an [`EnrichedResult`].
//!
//! [`EnrichedResult`]: galleyscout_shared::EnrichedResult

pub mod table;
pub mod tsv;

pub use table::{AUTHOR_WIDTH, TITLE_WIDTH, group_thousands, render_table, truncate_chars};
pub use tsv::{GENRE_SEPARATOR, TSV_HEADER, format_rating, render_tsv, to_row, write_tsv};
