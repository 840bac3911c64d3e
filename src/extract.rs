// src/extract.rs

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, instrument, trace};
use url::Url;

use crate::record::Record;
use crate::text::{cell_text, strip_citations};

static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("row selector should parse"));
static HEADER_CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th").expect("header selector should parse"));
static DATA_CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("cell selector should parse"));
static LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("link selector should parse"));

/// Column used as record identity when the table has one.
pub const IDENTITY_COLUMN: &str = "Name";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid table selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("no table matches {selector:?}")]
    NoTable { selector: String },

    #[error("table matched by {selector:?} has no header row")]
    NoHeader { selector: String },
}

/// Turn the first table matching `selector` into records, one per data row.
///
/// Field names come from the `th` cells of the first row. The first cell of
/// each data row is the key cell: its first non-fragment link becomes the
/// record's article, resolved against `base`.
#[instrument(level = "debug", skip(html, base), fields(html_len = html.len()))]
pub fn extract_records(html: &str, selector: &str, base: &Url) -> Result<Vec<Record>, ExtractionError> {
    let table_sel = Selector::parse(selector).map_err(|e| ExtractionError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })?;

    let doc = Html::parse_document(html);
    let table = doc
        .select(&table_sel)
        .next()
        .ok_or_else(|| ExtractionError::NoTable {
            selector: selector.to_string(),
        })?;

    let mut rows = table.select(&ROW);
    let headers: Vec<String> = rows
        .next()
        .map(|tr| unique_headers(tr.select(&HEADER_CELL).map(cell_text)))
        .unwrap_or_default();
    if headers.is_empty() {
        return Err(ExtractionError::NoHeader {
            selector: selector.to_string(),
        });
    }
    trace!(?headers, "parsed header row");

    let identity_idx = headers.iter().position(|h| h == IDENTITY_COLUMN).unwrap_or(0);

    let records: Vec<Record> = rows
        .filter_map(|tr| {
            let cells: Vec<ElementRef<'_>> = tr.select(&DATA_CELL).collect();
            if cells.is_empty() {
                return None;
            }
            let fields: Vec<(String, String)> = cells
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    let header = headers
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| format!("Column {}", i + 1));
                    (header, cell_text(*cell))
                })
                .collect();
            let name = fields
                .get(identity_idx)
                .or_else(|| fields.first())
                .map(|(_, v)| strip_citations(v).trim().to_string())
                .unwrap_or_default();
            let article = article_link(cells[0], base);
            trace!(name = %name, article = ?article.as_ref().map(Url::as_str), "parsed row");
            Some(Record::new(name, fields, article))
        })
        .collect();

    debug!(records = records.len(), "extracted table");
    Ok(records)
}

/// Repeated header names get a ` (n)` suffix so no column shadows another.
fn unique_headers(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let mut candidate = name.clone();
        let mut n = 1;
        while out.contains(&candidate) {
            n += 1;
            candidate = format!("{} ({})", name, n);
        }
        out.push(candidate);
    }
    out
}

fn article_link(cell: ElementRef<'_>, base: &Url) -> Option<Url> {
    cell.select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| !href.starts_with('#'))
        .find_map(|href| base.join(href).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Lookup, Reason};

    const PAGE: &str = r##"
        <html><body>
        <table class="infobox"><tr><th>Not this one</th></tr></table>
        <table class="wikitable sortable">
          <tr><th>Name</th><th>Age</th><th>Cause of death</th></tr>
          <tr>
            <td><a href="/wiki/Jimi_Hendrix">Jimi Hendrix</a><sup><a href="#cite_note-1">[1]</a></sup></td>
            <td>27</td><td>Asphyxia</td>
          </tr>
          <tr>
            <td><sup><a href="#cite_note-2">[2]</a></sup>Alexandre Levy</td>
            <td>27</td><td>Unknown</td>
          </tr>
          <tr><th colspan="3">Section break</th></tr>
          <tr>
            <td>Louis Chauvin</td>
            <td>27</td><td>Neurosyphilis</td>
          </tr>
        </table>
        </body></html>"##;

    fn base() -> Url {
        Url::parse("https://en.wikipedia.org/wiki/27_Club").unwrap()
    }

    #[test]
    fn extracts_rows_in_order_with_headers() {
        let records = extract_records(PAGE, "table.wikitable", &base()).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Jimi Hendrix", "Alexandre Levy", "Louis Chauvin"]);
        assert_eq!(records[0].field("Name"), Some("Jimi Hendrix[1]"));
        assert_eq!(records[0].field("Cause of death"), Some("Asphyxia"));
        assert_eq!(
            records[0].article.as_ref().map(Url::as_str),
            Some("https://en.wikipedia.org/wiki/Jimi_Hendrix")
        );
    }

    #[test]
    fn rows_without_link_are_marked_not_dropped() {
        let records = extract_records(PAGE, "table.wikitable", &base()).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].birthplace.is_none());
        assert_eq!(records[1].birthplace, Some(Lookup::Unresolved(Reason::NoLink)));
        assert_eq!(records[2].birthplace, Some(Lookup::Unresolved(Reason::NoLink)));
    }

    #[test]
    fn missing_table_is_an_error() {
        let err = extract_records(PAGE, "table.nope", &base()).unwrap_err();
        assert!(matches!(err, ExtractionError::NoTable { .. }));
    }

    #[test]
    fn bad_selector_is_an_error() {
        let err = extract_records(PAGE, "table[", &base()).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidSelector { .. }));
    }

    #[test]
    fn identity_falls_back_to_first_column() {
        let html = r#"<table id="t"><tr><th>Artist</th><th>Band</th></tr>
            <tr><td>Brian Jones</td><td>The Rolling Stones</td></tr></table>"#;
        let records = extract_records(html, "#t", &base()).unwrap();
        assert_eq!(records[0].name, "Brian Jones");
    }

    #[test]
    fn repeated_headers_keep_every_column() {
        let html = r#"<table class="wikitable">
            <tr><th>Name</th><th>Notes</th><th>Notes</th><th>Notes</th></tr>
            <tr><td>Robert Johnson</td><td>first</td><td>second</td><td>third</td></tr>
        </table>"#;
        let records = extract_records(html, "table.wikitable", &base()).unwrap();
        let headers: Vec<&str> = records[0].fields.iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(headers, ["Name", "Notes", "Notes (2)", "Notes (3)"]);
        assert_eq!(records[0].field("Notes"), Some("first"));
        assert_eq!(records[0].field("Notes (2)"), Some("second"));
    }
}
