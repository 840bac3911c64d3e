// src/text.rs
// Text helpers shared by the table extractor and the infobox reader.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;

static CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d+\]").expect("citation pattern should compile"));

/// Collapse runs of whitespace into a single space and trim.
pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// Visible text of an element, whitespace-normalised.
pub fn cell_text(el: ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<String>())
}

/// Every text node trimmed and joined with no separator.
///
/// Infobox cells split a value over `<br>`s and links; joining the trimmed
/// pieces keeps a year glued to the place that follows it.
pub fn stripped_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Remove bracketed footnote markers such as `[1]`.
pub fn strip_citations(s: &str) -> String {
    CITATION.replace_all(s, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn normalize_collapses_and_trims() {
        assert_eq!(normalize_ws("  Jimi \n\t Hendrix  "), "Jimi Hendrix");
        assert_eq!(normalize_ws(""), "");
    }

    #[test]
    fn citations_are_removed() {
        assert_eq!(strip_citations("Jimi Hendrix[1][23]"), "Jimi Hendrix");
        assert_eq!(strip_citations("[note 1] kept"), "[note 1] kept");
    }

    #[test]
    fn stripped_text_joins_without_separator() {
        let html = Html::parse_fragment(
            "<table><tr><td>November 27, 1942<br> <a href='#'>Seattle</a>, Washington</td></tr></table>",
        );
        let td = Selector::parse("td").unwrap();
        let cell = html.select(&td).next().unwrap();
        assert_eq!(stripped_text(cell), "November 27, 1942Seattle, Washington");
        assert_eq!(cell_text(cell), "November 27, 1942 Seattle, Washington");
    }
}
