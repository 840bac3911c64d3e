// src/record.rs

use serde::Serialize;
use std::fmt;
use url::Url;

/// A point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Why a lookup did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum Reason {
    /// The infobox exists but carries no accepted birthplace label.
    NoSourceField,
    /// The article has no infobox.
    NoContainer,
    /// The article fetch failed; `status` is absent for transport errors.
    UpstreamError { status: Option<u16> },
    /// The key cell of the table row has no article link.
    NoLink,
    /// The geocoder returned nothing for the birthplace text.
    NoMatch,
    /// Geocoding was skipped because there is no birthplace to look up.
    NotAttempted,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::NoSourceField => f.write_str("no-source-field"),
            Reason::NoContainer => f.write_str("no-container"),
            Reason::UpstreamError { status: Some(code) } => write!(f, "upstream-error({})", code),
            Reason::UpstreamError { status: None } => f.write_str("upstream-error"),
            Reason::NoLink => f.write_str("no-link"),
            Reason::NoMatch => f.write_str("no-match"),
            Reason::NotAttempted => f.write_str("not-attempted"),
        }
    }
}

/// Outcome of one enrichment sub-step for one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Lookup<T> {
    Resolved(T),
    Unresolved(Reason),
}

impl<T> Lookup<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Lookup::Resolved(_))
    }

    pub fn resolved(&self) -> Option<&T> {
        match self {
            Lookup::Resolved(v) => Some(v),
            Lookup::Unresolved(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Lookup::Resolved(_) => None,
            Lookup::Unresolved(r) => Some(r),
        }
    }
}

/// One table row plus everything derived from it.
///
/// `birthplace` and `location` are `None` while the corresponding stage is
/// still pending for this record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Identity, unique within one extraction.
    pub name: String,
    /// Column header → cell text, in column order.
    pub fields: Vec<(String, String)>,
    pub article: Option<Url>,
    pub birthplace: Option<Lookup<String>>,
    pub location: Option<Lookup<Coordinate>>,
}

impl Record {
    pub fn new(name: impl Into<String>, fields: Vec<(String, String)>, article: Option<Url>) -> Self {
        let birthplace = match article {
            Some(_) => None,
            None => Some(Lookup::Unresolved(Reason::NoLink)),
        };
        Self {
            name: name.into(),
            fields,
            article,
            birthplace,
            location: None,
        }
    }

    pub fn field(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    pub fn birthplace_text(&self) -> Option<&str> {
        self.birthplace
            .as_ref()
            .and_then(Lookup::resolved)
            .map(String::as_str)
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        self.location.as_ref().and_then(Lookup::resolved).copied()
    }

    pub fn birthplace_unresolved(&self) -> bool {
        matches!(self.birthplace, Some(Lookup::Unresolved(_)))
    }

    pub fn location_unresolved(&self) -> bool {
        matches!(self.location, Some(Lookup::Unresolved(_)))
    }

    /// The first failure blocking this record from being plotted.
    pub fn blocking_reason(&self) -> Option<&Reason> {
        match (&self.birthplace, &self.location) {
            (Some(Lookup::Unresolved(r)), _) => Some(r),
            (_, Some(Lookup::Unresolved(r))) => Some(r),
            _ => None,
        }
    }
}

/// Coordinates of every plottable record, in record order.
pub fn coordinates(records: &[Record]) -> Vec<Coordinate> {
    records.iter().filter_map(Record::coordinate).collect()
}
