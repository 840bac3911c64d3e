// src/patch.rs

use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use crate::enrich::clean_birthplace;
use crate::geocode::{resolve, Geocoder};
use crate::record::{Lookup, Record};

/// Replacement raw values keyed by record identity, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideMap {
    entries: Vec<(String, String)>,
}

impl OverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced entry keeps its original position.
    pub fn insert(&mut self, identity: impl Into<String>, value: impl Into<String>) {
        let identity = identity.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == identity) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((identity, value)),
        }
    }

    pub fn get(&self, identity: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == identity)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Pair `values` with `identities` by position.
    ///
    /// Only correct while both lists were written against the same unresolved
    /// set; a length mismatch is logged and the extra items on either side are
    /// ignored.
    pub fn from_positional<I, S>(identities: I, values: &[String]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let identities: Vec<String> = identities.into_iter().map(Into::into).collect();
        if identities.len() != values.len() {
            warn!(
                unresolved = identities.len(),
                overrides = values.len(),
                "positional overrides do not line up with the unresolved records"
            );
        }
        identities
            .into_iter()
            .zip(values.iter().cloned())
            .collect()
    }
}

impl FromIterator<(String, String)> for OverrideMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut map = OverrideMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// What one override pass did, by identity and in record order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub patched: Vec<String>,
    pub unresolved: Vec<String>,
    /// Override keys that matched no unresolved record.
    pub unused: Vec<String>,
}

impl PatchReport {
    fn finish(mut self, overrides: &OverrideMap, stage: &str) -> Self {
        let used: HashSet<&str> = self
            .patched
            .iter()
            .chain(self.unresolved.iter())
            .map(String::as_str)
            .collect();
        self.unused = overrides
            .iter()
            .map(|(k, _)| k)
            .filter(|k| !used.contains(k))
            .map(str::to_owned)
            .collect();
        if !self.unused.is_empty() {
            warn!(stage, unused = ?self.unused, "overrides matched no unresolved record");
        }
        info!(
            stage,
            patched = self.patched.len(),
            unresolved = self.unresolved.len(),
            "override pass done"
        );
        self
    }
}

/// Identities whose birthplace is unresolved, in record order.
pub fn unresolved_birthplaces(records: &[Record]) -> Vec<&str> {
    records
        .iter()
        .filter(|r| r.birthplace_unresolved())
        .map(|r| r.name.as_str())
        .collect()
}

/// Identities whose location is unresolved, in record order.
pub fn unresolved_locations(records: &[Record]) -> Vec<&str> {
    records
        .iter()
        .filter(|r| r.location_unresolved())
        .map(|r| r.name.as_str())
        .collect()
}

/// Replace unresolved birthplaces with override text.
///
/// The override goes through the same cleaning as scraped text, and the
/// record's location is reset so the next geocode pass picks it up.
/// Resolved records are never touched.
#[instrument(level = "info", skip_all, fields(overrides = overrides.len()))]
pub fn patch_birthplaces(records: &mut [Record], overrides: &OverrideMap) -> PatchReport {
    let mut report = PatchReport::default();

    for record in records.iter_mut().filter(|r| r.birthplace_unresolved()) {
        let Some(raw) = overrides.get(&record.name) else {
            report.unresolved.push(record.name.clone());
            continue;
        };
        let key = clean_birthplace(raw);
        if key.is_empty() {
            warn!(name = %record.name, raw = %raw, "override is empty after cleaning");
            report.unresolved.push(record.name.clone());
            continue;
        }
        debug!(name = %record.name, birthplace = %key, "patched birthplace");
        record.birthplace = Some(Lookup::Resolved(key));
        record.location = None;
        report.patched.push(record.name.clone());
    }

    report.finish(overrides, "birthplace")
}

/// Re-geocode records with an unresolved location using override text.
///
/// This covers records that failed at either stage: the override becomes the
/// birthplace and is geocoded straight away.
#[instrument(level = "info", skip_all, fields(overrides = overrides.len()))]
pub async fn patch_locations<G: Geocoder + ?Sized>(
    records: &mut [Record],
    overrides: &OverrideMap,
    geocoder: &G,
) -> PatchReport {
    let mut report = PatchReport::default();

    for record in records.iter_mut().filter(|r| r.location_unresolved()) {
        let Some(raw) = overrides.get(&record.name) else {
            report.unresolved.push(record.name.clone());
            continue;
        };
        let key = raw.trim().to_string();
        let lookup = resolve(geocoder, &key).await;
        record.birthplace = Some(Lookup::Resolved(key));
        if lookup.is_resolved() {
            debug!(name = %record.name, "patched location");
            report.patched.push(record.name.clone());
        } else {
            warn!(name = %record.name, "override did not geocode either");
            report.unresolved.push(record.name.clone());
        }
        record.location = Some(lookup);
    }

    report.finish(overrides, "location")
}
