//! Console summary table in a double-ruled "fancy grid" layout.

use galleyscout_shared::EnrichedResult;

use crate::tsv::{GENRE_SEPARATOR, format_rating};

/// Display width of the title column, in characters.
pub const TITLE_WIDTH: usize = 40;
/// Display width of the author column, in characters.
pub const AUTHOR_WIDTH: usize = 20;

const HEADERS: [&str; 5] = ["Title", "Author", "Rating", "Reviews", "Genres"];
const RIGHT_ALIGNED: [bool; 5] = [false, false, true, true, false];

/// First `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// `1234567` -> `"1,234,567"`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn display_row(result: &EnrichedResult) -> [String; 5] {
    [
        truncate_chars(result.title(), TITLE_WIDTH),
        truncate_chars(result.author(), AUTHOR_WIDTH),
        format_rating(result.rating()),
        group_thousands(result.review_count()),
        result.genres().join(GENRE_SEPARATOR),
    ]
}

/// Render `results` as a boxed table. Every line ends with a newline.
pub fn render_table(results: &[EnrichedResult]) -> String {
    let rows: Vec<[String; 5]> = results.iter().map(display_row).collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    out.push_str(&rule(&widths, '╒', '═', '╤', '╕'));
    out.push_str(&line(&widths, &HEADERS.map(String::from)));
    out.push_str(&rule(&widths, '╞', '═', '╪', '╡'));
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            out.push_str(&rule(&widths, '├', '─', '┼', '┤'));
        }
        out.push_str(&line(&widths, row));
    }
    out.push_str(&rule(&widths, '╘', '═', '╧', '╛'));
    out
}

fn rule(widths: &[usize; 5], left: char, fill: char, join: char, right: char) -> String {
    let mut s = String::new();
    s.push(left);
    for (i, w) in widths.iter().enumerate() {
        if i > 0 {
            s.push(join);
        }
        s.extend(std::iter::repeat_n(fill, w + 2));
    }
    s.push(right);
    s.push('\n');
    s
}

fn line(widths: &[usize; 5], cells: &[String; 5]) -> String {
    let mut s = String::from("│");
    for (i, (cell, w)) in cells.iter().zip(widths).enumerate() {
        let pad = w - cell.chars().count();
        s.push(' ');
        if RIGHT_ALIGNED[i] {
            s.extend(std::iter::repeat_n(' ', pad));
            s.push_str(cell);
        } else {
            s.push_str(cell);
            s.extend(std::iter::repeat_n(' ', pad));
        }
        s.push_str(" │");
    }
    s.push('\n');
    s
}
