use anyhow::Result;
use birthmap::{
    config::{Config, Overrides},
    fetch::HttpFetcher,
    geocode::{Nominatim, RateLimited},
    record::coordinates,
    render::{load_geojson, EquirectangularRenderer, Renderer},
    export, Pipeline,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) config & collaborators ───────────────────────────────────
    let config = Config::from_env()?;
    let overrides = Overrides::load(&config.overrides_path)?;
    let client = HttpFetcher::build_client(&config.user_agent, config.http_timeout)?;
    let fetcher = HttpFetcher::new(client.clone());
    let geocoder = RateLimited::with_delay(
        Nominatim::new(client, config.geocoder_url.clone()),
        config.min_delay,
    );

    // ─── 3) scrape, enrich, patch ────────────────────────────────────
    let outcome = Pipeline::new(&config, &fetcher, &geocoder)
        .run(&overrides)
        .await?;

    // ─── 4) optional table exports ───────────────────────────────────
    if let Some(path) = &config.parquet_path {
        export::write_parquet(&outcome.records, path)?;
    }
    if let Some(path) = &config.json_path {
        export::write_json(&outcome.records, path)?;
    }

    // ─── 5) map ──────────────────────────────────────────────────────
    let background = match &config.world_path {
        Some(path) => load_geojson(path, &config.exclude_regions)?,
        None => {
            warn!("BIRTHMAP_WORLD not set; drawing points without a background layer");
            Vec::new()
        }
    };
    let points = coordinates(&outcome.records);
    EquirectangularRenderer::new(config.width, config.height).render(
        &points,
        &background,
        &config.output_path,
    )?;

    info!(
        plotted = points.len(),
        unresolved = outcome.review().len(),
        "all done"
    );
    Ok(())
}
