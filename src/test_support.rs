// src/test_support.rs
// In-memory stand-ins for the HTTP fetcher and the geocoder.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

use crate::fetch::{Fetcher, Page};
use crate::geocode::Geocoder;
use crate::record::Coordinate;

pub fn init_logging() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// Serves canned pages; unknown URLs fail like a dropped connection.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, (u16, String)>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn with_page(mut self, url: &str, status: u16, body: &str) -> Self {
        self.pages.insert(url.to_string(), (status, body.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &Url) -> Result<Page> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (status, body) = self
            .pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {}", url))?;
        Ok(Page { status, body })
    }
}

/// Resolves from a fixed gazetteer and records every query.
#[derive(Default)]
pub struct FakeGeocoder {
    places: HashMap<String, Coordinate>,
    failing: HashSet<String>,
    queries: Mutex<Vec<String>>,
}

impl FakeGeocoder {
    pub fn with_place(mut self, query: &str, latitude: f64, longitude: f64) -> Self {
        self.places.insert(
            query.to_string(),
            Coordinate {
                latitude,
                longitude,
            },
        );
        self
    }

    pub fn failing_on(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinate>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failing.contains(query) {
            return Err(anyhow!("HTTP error: 500"));
        }
        Ok(self.places.get(query).copied())
    }
}

/// Takes `delay` to answer and tracks how many calls overlap. Clones share
/// the counters.
#[derive(Clone)]
pub struct SlowGeocoder {
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl SlowGeocoder {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: Arc::default(),
            peak: Arc::default(),
        }
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for SlowGeocoder {
    async fn geocode(&self, _query: &str) -> Result<Option<Coordinate>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(None)
    }
}
