//! Tab-separated export of ranked results.
//!
//! UTF-8, one header row, one row per result, fields joined by a single tab.
//! Values are written as-is: catalog and search-page text never contains
//! tabs or newlines once trimmed.

use std::path::Path;

use tracing::{debug, info, instrument};

use galleyscout_shared::{EnrichedResult, GalleyScoutError, Result};

/// Column order of the export file.
pub const TSV_HEADER: [&str; 7] = [
    "Title",
    "Author",
    "Rating",
    "Reviews",
    "Genres",
    "NetGalley",
    "GoodReads",
];

/// Separator used to join genres into one column.
pub const GENRE_SEPARATOR: &str = ", ";

/// Rating as written to file and console: always at least one decimal place.
pub fn format_rating(rating: f64) -> String {
    if rating.is_finite() && rating.fract() == 0.0 {
        format!("{rating:.1}")
    } else {
        rating.to_string()
    }
}

/// The export fields of one result, in [`TSV_HEADER`] order.
pub fn to_row(result: &EnrichedResult) -> [String; 7] {
    [
        result.title().to_string(),
        result.author().to_string(),
        format_rating(result.rating()),
        result.review_count().to_string(),
        result.genres().join(GENRE_SEPARATOR),
        result.source_url().to_string(),
        result.external_url().to_string(),
    ]
}

/// Full file contents: header plus one line per result.
pub fn render_tsv(results: &[EnrichedResult]) -> String {
    let mut out = TSV_HEADER.join("\t");
    out.push('\n');
    for result in results {
        out.push_str(&to_row(result).join("\t"));
        out.push('\n');
    }
    out
}

/// Write `results` to `path`, replacing any previous file.
///
/// The file is written next to the target and renamed into place, so a
/// failed run never leaves a half-written export behind.
#[instrument(skip_all, fields(path = %path.display(), rows = results.len()))]
pub fn write_tsv(path: &Path, results: &[EnrichedResult]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| GalleyScoutError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| {
            GalleyScoutError::validation(format!("output path has no file name: {}", path.display()))
        })?
        .to_string_lossy();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    let content = render_tsv(results);
    std::fs::write(&temp, &content).map_err(|e| GalleyScoutError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| GalleyScoutError::io(path, e))?;

    debug!(bytes = content.len(), "wrote tsv");
    info!("tsv export complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use galleyscout_shared::{Candidate, ExternalRecord, Resolution};

    fn resolved(title: &str, rating: f64, reviews: u64, genres: &[&str]) -> EnrichedResult {
        EnrichedResult::new(
            Candidate::new(title, "catalog author", format!("https://ng.test/book/{title}")),
            Resolution::Resolved(ExternalRecord {
                external_url: format!("https://gr.test/book/{title}"),
                author: Some("Real Author".into()),
                rating,
                review_count: reviews,
                genres: genres.iter().map(|g| g.to_string()).collect(),
            }),
        )
    }

    #[test]
    fn header_is_fixed() {
        let tsv = render_tsv(&[]);
        assert_eq!(tsv, "Title\tAuthor\tRating\tReviews\tGenres\tNetGalley\tGoodReads\n");
    }

    #[test]
    fn ratings_keep_a_decimal_place() {
        assert_eq!(format_rating(4.0), "4.0");
        assert_eq!(format_rating(4.27), "4.27");
        assert_eq!(format_rating(0.0), "0.0");
    }

    #[test]
    fn rows_split_back_into_record_fields() {
        let results = vec![
            resolved("Dune", 4.27, 1_234_567, &["Science Fiction", "Classics"]),
            resolved("Piranesi", 4.0, 98, &[]),
        ];
        let tsv = render_tsv(&results);
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(lines.len(), 3);

        for (line, result) in lines[1..].iter().zip(&results) {
            let fields: Vec<&str> = line.split('\t').collect();
            assert_eq!(fields.len(), TSV_HEADER.len());
            assert_eq!(fields[0], result.title());
            assert_eq!(fields[1], result.author());
            assert_eq!(fields[2].parse::<f64>().unwrap(), result.rating());
            assert_eq!(fields[3].parse::<u64>().unwrap(), result.review_count());
            let genres: Vec<&str> = if fields[4].is_empty() {
                Vec::new()
            } else {
                fields[4].split(GENRE_SEPARATOR).collect()
            };
            assert_eq!(genres, result.genres());
            assert_eq!(fields[5], result.source_url());
            assert_eq!(fields[6], result.external_url());
        }
    }

    #[test]
    fn unclaimed_results_have_empty_external_column() {
        let dup = EnrichedResult::new(
            Candidate::new("Book B", "", ""),
            Resolution::Duplicate {
                external_url: "https://x/y/1".into(),
            },
        );
        let row = to_row(&dup);
        assert_eq!(row[2], "0.0");
        assert_eq!(row[3], "0");
        assert_eq!(row[5], "");
        assert_eq!(row[6], "");
    }

    #[test]
    fn write_tsv_creates_file_and_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("books.tsv");
        let results = vec![resolved("Dune", 4.5, 10, &["Fantasy"])];

        write_tsv(&path, &results).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, render_tsv(&results));
        assert!(!path.with_file_name(".books.tsv.tmp").exists());
    }

    #[test]
    fn write_tsv_replaces_previous_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.tsv");
        std::fs::write(&path, "stale").unwrap();

        write_tsv(&path, &[]).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("Title\t"));
    }
}
