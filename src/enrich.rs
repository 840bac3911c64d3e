// src/enrich.rs

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};

use crate::fetch::Fetcher;
use crate::record::{Lookup, Reason, Record};
use crate::text::{strip_citations, stripped_text};

static INFOBOX: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"table[class*="infobox"]"#).expect("infobox selector should parse")
});
static LABEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th").expect("label selector should parse"));

/// Infobox labels whose value cell holds a birthplace.
pub const DEFAULT_LABELS: &[&str] = &["Born", "Place of birth"];

/// Counts from one birthplace pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichStats {
    pub fetched: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

/// Cut `raw` before the first 4-digit run found scanning from the right, then
/// drop citation markers and trim. Text without such a run is kept whole.
pub fn clean_birthplace(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let cut = (4..=bytes.len())
        .rev()
        .find(|&end| bytes[end - 4..end].iter().all(u8::is_ascii_digit))
        .map(|end| end - 4);
    let head = match cut {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    strip_citations(head).trim().to_string()
}

/// Read the birthplace out of an article's infobox.
pub fn derive_birthplace<S: AsRef<str>>(html: &str, labels: &[S]) -> Lookup<String> {
    let doc = Html::parse_document(html);
    let Some(infobox) = doc.select(&INFOBOX).next() else {
        return Lookup::Unresolved(Reason::NoContainer);
    };
    let label = infobox.select(&LABEL).find(|th| {
        let text = th.text().collect::<String>();
        let text = text.trim();
        labels.iter().any(|l| l.as_ref() == text)
    });
    let Some(value) = label.and_then(|th| next_cell(infobox, th)) else {
        return Lookup::Unresolved(Reason::NoSourceField);
    };

    let key = clean_birthplace(&stripped_text(value));
    if key.is_empty() {
        Lookup::Unresolved(Reason::NoSourceField)
    } else {
        Lookup::Resolved(key)
    }
}

/// First `td` after `label` in document order, within `scope`.
fn next_cell<'a>(scope: ElementRef<'a>, label: ElementRef<'a>) -> Option<ElementRef<'a>> {
    scope
        .descendants()
        .skip_while(|node| node.id() != label.id())
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "td")
}

/// Fill in the birthplace of every record that does not have one yet.
///
/// One fetch per pending record. Failures of any kind land on the record as
/// `Lookup::Unresolved` and the pass moves on to the next record.
#[instrument(level = "info", skip_all, fields(records = records.len()))]
pub async fn enrich_birthplaces<F, S>(fetcher: &F, records: &mut [Record], labels: &[S]) -> EnrichStats
where
    F: Fetcher + ?Sized,
    S: AsRef<str> + Sync,
{
    let mut stats = EnrichStats::default();

    for record in records.iter_mut() {
        if record.birthplace.is_some() {
            continue;
        }
        let Some(url) = record.article.clone() else {
            record.birthplace = Some(Lookup::Unresolved(Reason::NoLink));
            stats.unresolved += 1;
            continue;
        };

        stats.fetched += 1;
        let lookup = match fetcher.fetch(&url).await {
            Ok(page) if page.is_success() => derive_birthplace(&page.body, labels),
            Ok(page) => {
                warn!(name = %record.name, %url, status = page.status, "bad response");
                Lookup::Unresolved(Reason::UpstreamError {
                    status: Some(page.status),
                })
            }
            Err(e) => {
                warn!(name = %record.name, %url, error = %e, "fetch failed");
                Lookup::Unresolved(Reason::UpstreamError { status: None })
            }
        };

        match &lookup {
            Lookup::Resolved(place) => {
                debug!(name = %record.name, birthplace = %place, "resolved birthplace");
                stats.resolved += 1;
            }
            Lookup::Unresolved(reason) => {
                debug!(name = %record.name, %reason, "no birthplace");
                stats.unresolved += 1;
            }
        }
        record.birthplace = Some(lookup);
    }

    info!(
        fetched = stats.fetched,
        resolved = stats.resolved,
        unresolved = stats.unresolved,
        "birthplace pass done"
    );
    stats
}
