// src/pipeline.rs

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::{Config, Overrides};
use crate::enrich::enrich_birthplaces;
use crate::extract::extract_records;
use crate::fetch::{fetch_source, Fetcher};
use crate::geocode::{geocode_records, Geocoder};
use crate::patch::{
    patch_birthplaces, patch_locations, unresolved_birthplaces, unresolved_locations, PatchReport,
};
use crate::record::{Reason, Record};

/// Which stage left a record without a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Birthplace,
    Location,
}

/// One row of the end-of-run review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItem {
    pub name: String,
    pub stage: Stage,
    pub reason: Reason,
    pub birthplace: Option<String>,
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub records: Vec<Record>,
    pub birthplace_patch: PatchReport,
    pub location_patch: PatchReport,
}

impl Outcome {
    pub fn review(&self) -> Vec<ReviewItem> {
        review(&self.records)
    }
}

/// Records that still have no coordinate, with the reason, in record order.
pub fn review(records: &[Record]) -> Vec<ReviewItem> {
    records
        .iter()
        .filter_map(|r| {
            let (stage, reason) = match (r.birthplace.as_ref(), r.location.as_ref()) {
                (Some(b), _) if !b.is_resolved() => (Stage::Birthplace, b.reason()?.clone()),
                (_, Some(l)) if !l.is_resolved() => (Stage::Location, l.reason()?.clone()),
                _ => return None,
            };
            Some(ReviewItem {
                name: r.name.clone(),
                stage,
                reason,
                birthplace: r.birthplace_text().map(str::to_owned),
            })
        })
        .collect()
}

/// Runs extraction, enrichment and both override passes, strictly in sequence.
pub struct Pipeline<'a, F: ?Sized, G: ?Sized> {
    config: &'a Config,
    fetcher: &'a F,
    geocoder: &'a G,
}

impl<'a, F, G> Pipeline<'a, F, G>
where
    F: Fetcher + ?Sized,
    G: Geocoder + ?Sized,
{
    pub fn new(config: &'a Config, fetcher: &'a F, geocoder: &'a G) -> Self {
        Self {
            config,
            fetcher,
            geocoder,
        }
    }

    /// Scrape and extract only. Fails if the page cannot be fetched or has no
    /// matching table.
    #[instrument(level = "info", skip(self), fields(url = %self.config.source_url))]
    pub async fn extract(&self) -> Result<Vec<Record>> {
        let html = fetch_source(self.fetcher, &self.config.source_url).await?;
        let records = extract_records(&html, &self.config.table_selector, &self.config.source_url)
            .with_context(|| format!("extracting table from {}", self.config.source_url))?;
        info!(records = records.len(), "extracted records");
        Ok(records)
    }

    /// Enrich already-extracted records and apply both override passes.
    pub async fn enrich(&self, mut records: Vec<Record>, overrides: &Overrides) -> Outcome {
        enrich_birthplaces(self.fetcher, &mut records, self.config.labels.as_slice()).await;

        let birthplace_overrides = overrides.birthplaces_for(&unresolved_birthplaces(&records));
        let birthplace_patch = patch_birthplaces(&mut records, &birthplace_overrides);

        geocode_records(self.geocoder, &mut records).await;

        let location_overrides = overrides.locations_for(&unresolved_locations(&records));
        let location_patch = patch_locations(&mut records, &location_overrides, self.geocoder).await;

        Outcome {
            records,
            birthplace_patch,
            location_patch,
        }
    }

    pub async fn run(&self, overrides: &Overrides) -> Result<Outcome> {
        let records = self.extract().await?;
        let outcome = self.enrich(records, overrides).await;

        let review = outcome.review();
        for item in &review {
            warn!(
                name = %item.name,
                stage = ?item.stage,
                reason = %item.reason,
                birthplace = item.birthplace.as_deref().unwrap_or(""),
                "unresolved"
            );
        }
        info!(
            records = outcome.records.len(),
            unresolved = review.len(),
            "pipeline done"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{coordinates, Lookup};
    use crate::test_support::{init_logging, FakeFetcher, FakeGeocoder};
    use std::time::Duration;

    const LIST: &str = r#"<html><body><table class="wikitable">
        <tr><th>Name</th><th>Age</th></tr>
        <tr><td><a href="/wiki/Resolvable">Resolvable</a></td><td>27</td></tr>
        <tr><td><a href="/wiki/Boxless">Boxless</a></td><td>27</td></tr>
        <tr><td>Linkless</td><td>27</td></tr>
    </table></body></html>"#;

    const RESOLVABLE: &str = r#"<table class="infobox"><tr><th>Born</th>
        <td>London, England 1950</td></tr></table>"#;

    const BOXLESS: &str = "<p>No infobox</p>";

    fn config() -> Config {
        Config {
            min_delay: Duration::ZERO,
            ..Config::default()
        }
    }

    fn fetcher(cfg: &Config) -> FakeFetcher {
        let page = |p: &str| cfg.source_url.join(p).unwrap().to_string();
        FakeFetcher::default()
            .with_page(cfg.source_url.as_str(), 200, LIST)
            .with_page(&page("/wiki/Resolvable"), 200, RESOLVABLE)
            .with_page(&page("/wiki/Boxless"), 200, BOXLESS)
    }

    fn geocoder() -> FakeGeocoder {
        FakeGeocoder::default()
            .with_place("London, England", 51.5, -0.12)
            .with_place("Vienna, Austria", 48.2, 16.37)
    }

    #[tokio::test]
    async fn three_records_without_overrides() {
        init_logging();
        let cfg = config();
        let fetcher = fetcher(&cfg);
        let geocoder = geocoder();
        let pipeline = Pipeline::new(&cfg, &fetcher, &geocoder);

        let outcome = pipeline.run(&Overrides::default()).await.unwrap();
        let recs = &outcome.records;

        let names: Vec<_> = recs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Resolvable", "Boxless", "Linkless"]);
        assert_eq!(recs[0].birthplace_text(), Some("London, England"));
        assert!(recs[0].coordinate().is_some());
        assert_eq!(recs[1].birthplace, Some(Lookup::Unresolved(Reason::NoContainer)));
        assert_eq!(recs[2].birthplace, Some(Lookup::Unresolved(Reason::NoLink)));

        let review = outcome.review();
        assert_eq!(review.len(), 2);
        assert_eq!(review[0].stage, Stage::Birthplace);
        assert_eq!(review[1].reason, Reason::NoLink);
        assert_eq!(coordinates(recs).len(), 1);
    }

    #[tokio::test]
    async fn overrides_fill_the_gaps() {
        init_logging();
        let cfg = config();
        let fetcher = fetcher(&cfg);
        let geocoder = geocoder();
        let pipeline = Pipeline::new(&cfg, &fetcher, &geocoder);

        let overrides = Overrides::parse(
            "birthplaces:\n  Boxless: Vienna, Austria\n  Linkless: Atlantis 1900\n",
        )
        .unwrap();
        let outcome = pipeline.run(&overrides).await.unwrap();
        let recs = &outcome.records;

        assert_eq!(outcome.birthplace_patch.patched, ["Boxless", "Linkless"]);
        assert_eq!(recs[1].coordinate().map(|c| c.latitude), Some(48.2));
        assert_eq!(recs[2].birthplace_text(), Some("Atlantis"));
        assert_eq!(recs[2].location, Some(Lookup::Unresolved(Reason::NoMatch)));

        let review = outcome.review();
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].name, "Linkless");
        assert_eq!(review[0].stage, Stage::Location);

        // a location override for the one left over
        let overrides = Overrides::parse(
            "birthplaces:\n  Boxless: Vienna, Austria\n  Linkless: Atlantis 1900\nlocations:\n  - London, England\n",
        )
        .unwrap();
        let outcome = pipeline.run(&overrides).await.unwrap();
        assert!(outcome.review().is_empty());
        assert_eq!(coordinates(&outcome.records).len(), 3);
    }

    #[tokio::test]
    async fn missing_table_is_fatal() {
        let cfg = Config {
            table_selector: "table.absent".into(),
            ..config()
        };
        let fetcher = fetcher(&cfg);
        let geocoder = geocoder();
        let err = Pipeline::new(&cfg, &fetcher, &geocoder)
            .run(&Overrides::default())
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("no table matches"));
    }
}
