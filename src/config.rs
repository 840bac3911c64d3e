// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::info;
use url::Url;

use crate::enrich::DEFAULT_LABELS;
use crate::geocode::NOMINATIM_SEARCH_URL;
use crate::patch::OverrideMap;

pub const DEFAULT_SOURCE_URL: &str = "https://en.wikipedia.org/wiki/27_Club";
pub const DEFAULT_TABLE_SELECTOR: &str = "table.wikitable";
pub const DEFAULT_USER_AGENT: &str = "birthmap/0.1 (https://github.com/birthmap/birthmap)";

/// Runtime settings. Every field has a default and an environment override.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub source_url: Url,
    pub table_selector: String,
    pub labels: Vec<String>,
    pub user_agent: String,
    pub http_timeout: Duration,
    pub geocoder_url: Url,
    /// Minimum spacing between geocoder calls.
    pub min_delay: Duration,
    pub overrides_path: PathBuf,
    /// GeoJSON background layer; the map is drawn without one when unset.
    pub world_path: Option<PathBuf>,
    pub exclude_regions: Vec<String>,
    pub output_path: PathBuf,
    pub parquet_path: Option<PathBuf>,
    pub json_path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: Url::parse(DEFAULT_SOURCE_URL).expect("default source URL should parse"),
            table_selector: DEFAULT_TABLE_SELECTOR.to_string(),
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout: Duration::from_secs(30),
            geocoder_url: Url::parse(NOMINATIM_SEARCH_URL).expect("default geocoder URL should parse"),
            min_delay: Duration::from_secs(1),
            overrides_path: PathBuf::from("overrides.yaml"),
            world_path: None,
            exclude_regions: vec!["Antarctica".to_string()],
            output_path: PathBuf::from("27_club_map.png"),
            parquet_path: None,
            json_path: None,
            width: 3600,
            height: 1800,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("BIRTHMAP_SOURCE_URL") {
            cfg.source_url = Url::parse(&v).with_context(|| format!("BIRTHMAP_SOURCE_URL={}", v))?;
        }
        if let Some(v) = get("BIRTHMAP_TABLE_SELECTOR") {
            cfg.table_selector = v;
        }
        if let Some(v) = get("BIRTHMAP_LABELS") {
            cfg.labels = split_list(&v);
        }
        if let Some(v) = get("BIRTHMAP_USER_AGENT") {
            cfg.user_agent = v;
        }
        if let Some(v) = get("BIRTHMAP_HTTP_TIMEOUT_SECS") {
            cfg.http_timeout = Duration::from_secs(parse_var("BIRTHMAP_HTTP_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("BIRTHMAP_GEOCODER_URL") {
            cfg.geocoder_url = Url::parse(&v).with_context(|| format!("BIRTHMAP_GEOCODER_URL={}", v))?;
        }
        if let Some(v) = get("BIRTHMAP_MIN_DELAY_MS") {
            cfg.min_delay = Duration::from_millis(parse_var("BIRTHMAP_MIN_DELAY_MS", &v)?);
        }
        if let Some(v) = get("BIRTHMAP_OVERRIDES") {
            cfg.overrides_path = PathBuf::from(v);
        }
        if let Some(v) = get("BIRTHMAP_WORLD") {
            cfg.world_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("BIRTHMAP_EXCLUDE") {
            cfg.exclude_regions = split_list(&v);
        }
        if let Some(v) = get("BIRTHMAP_OUTPUT") {
            cfg.output_path = PathBuf::from(v);
        }
        if let Some(v) = get("BIRTHMAP_PARQUET") {
            cfg.parquet_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("BIRTHMAP_JSON") {
            cfg.json_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("BIRTHMAP_WIDTH") {
            cfg.width = parse_var("BIRTHMAP_WIDTH", &v)?;
        }
        if let Some(v) = get("BIRTHMAP_HEIGHT") {
            cfg.height = parse_var("BIRTHMAP_HEIGHT", &v)?;
        }
        if cfg.width == 0 || cfg.height == 0 {
            anyhow::bail!("map size must be non-zero, got {}x{}", cfg.width, cfg.height);
        }
        Ok(cfg)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("parsing {}={:?}", key, value))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// One override section: keyed by identity, or a bare list paired by
/// position with whatever is unresolved when it is applied.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OverrideSpec {
    Keyed(BTreeMap<String, String>),
    Positional(Vec<String>),
}

impl OverrideSpec {
    pub fn resolve(&self, unresolved: &[&str]) -> OverrideMap {
        match self {
            OverrideSpec::Keyed(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            OverrideSpec::Positional(values) => {
                OverrideMap::from_positional(unresolved.iter().copied(), values)
            }
        }
    }
}

/// Caller-supplied corrections, loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Overrides {
    /// Applied to records whose birthplace could not be scraped.
    pub birthplaces: Option<OverrideSpec>,
    /// Applied to records whose birthplace did not geocode.
    pub locations: Option<OverrideSpec>,
}

impl Overrides {
    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("parsing overrides YAML")
    }

    /// Load from `path`; a missing file means no overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no overrides file; continuing without");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
        Self::parse(&text).with_context(|| format!("in {:?}", path))
    }

    pub fn birthplaces_for(&self, unresolved: &[&str]) -> OverrideMap {
        self.birthplaces
            .as_ref()
            .map(|s| s.resolve(unresolved))
            .unwrap_or_default()
    }

    pub fn locations_for(&self, unresolved: &[&str]) -> OverrideMap {
        self.locations
            .as_ref()
            .map(|s| s.resolve(unresolved))
            .unwrap_or_default()
    }
}
