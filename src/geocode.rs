// src/geocode.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use crate::record::{Coordinate, Lookup, Reason, Record};

pub const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve free text to a coordinate. `Ok(None)` means no match.
    async fn geocode(&self, query: &str) -> Result<Option<Coordinate>>;
}

/// Single-file access to a shared external resource.
///
/// A caller holds the [`Permit`] for the whole call, so calls never overlap,
/// and the next permit is not handed out until `min_interval` has passed
/// since the previous call finished.
pub struct RateLimiter {
    last_finished: Mutex<Option<Instant>>,
    min_interval: Duration,
}

/// Exclusive turn at the limited resource; stamps the finish time on drop.
pub struct Permit<'a> {
    last_finished: MutexGuard<'a, Option<Instant>>,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        *self.last_finished = Some(Instant::now());
    }
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_finished: Mutex::new(None),
            min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Queue behind any call in flight, then sit out the remaining delay.
    pub async fn acquire(&self) -> Permit<'_> {
        let guard = self.last_finished.lock().await;
        if let Some(finished) = *guard {
            let ready = finished + self.min_interval;
            if ready > Instant::now() {
                trace!(delay = ?(ready - Instant::now()), "holding next geocoder call");
                tokio::time::sleep_until(ready).await;
            }
        }
        Permit {
            last_finished: guard,
        }
    }
}

/// Wraps a geocoder so every call goes through a shared [`RateLimiter`].
pub struct RateLimited<G> {
    inner: G,
    limiter: Arc<RateLimiter>,
}

impl<G> RateLimited<G> {
    pub fn new(inner: G, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }

    pub fn with_delay(inner: G, min_interval: Duration) -> Self {
        Self::new(inner, Arc::new(RateLimiter::new(min_interval)))
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for RateLimited<G> {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinate>> {
        let _permit = self.limiter.acquire().await;
        self.inner.geocode(query).await
    }
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

/// OpenStreetMap Nominatim search client.
pub struct Nominatim {
    client: Client,
    endpoint: Url,
}

impl Nominatim {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Geocoder for Nominatim {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinate>> {
        debug!(query = %query, url = %self.endpoint, "Querying Nominatim");
        let places: Vec<Place> = self
            .client
            .get(self.endpoint.clone())
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.endpoint))?
            .error_for_status()
            .with_context(|| format!("Non-success status {}", self.endpoint))?
            .json()
            .await
            .context("decoding Nominatim response")?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };
        let latitude = place
            .lat
            .parse()
            .with_context(|| format!("bad latitude {:?}", place.lat))?;
        let longitude = place
            .lon
            .parse()
            .with_context(|| format!("bad longitude {:?}", place.lon))?;
        Ok(Some(Coordinate {
            latitude,
            longitude,
        }))
    }
}

/// Geocode one key. Errors from the resolver count as no match.
pub async fn resolve<G: Geocoder + ?Sized>(geocoder: &G, key: &str) -> Lookup<Coordinate> {
    match geocoder.geocode(key).await {
        Ok(Some(coord)) => Lookup::Resolved(coord),
        Ok(None) => Lookup::Unresolved(Reason::NoMatch),
        Err(e) => {
            warn!(query = %key, error = %e, "geocoder failed");
            Lookup::Unresolved(Reason::NoMatch)
        }
    }
}

/// Geocode every record whose location is still pending, in record order.
///
/// Records without a birthplace get `NotAttempted` instead of a call.
/// Returns the number of geocoder calls made.
#[instrument(level = "info", skip_all, fields(records = records.len()))]
pub async fn geocode_records<G: Geocoder + ?Sized>(geocoder: &G, records: &mut [Record]) -> usize {
    let mut calls = 0;
    let mut resolved = 0;

    for record in records.iter_mut() {
        if record.location.is_some() {
            continue;
        }
        let Some(key) = record.birthplace_text().map(str::to_owned) else {
            record.location = Some(Lookup::Unresolved(Reason::NotAttempted));
            continue;
        };

        calls += 1;
        let lookup = resolve(geocoder, &key).await;
        match &lookup {
            Lookup::Resolved(c) => {
                debug!(name = %record.name, birthplace = %key, lat = c.latitude, lon = c.longitude, "geocoded");
                resolved += 1;
            }
            Lookup::Unresolved(_) => debug!(name = %record.name, birthplace = %key, "no match"),
        }
        record.location = Some(lookup);
    }

    info!(calls, resolved, "geocode pass done");
    calls
}
