// src/render.rs

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use serde_json::Value;
use std::{fs, path::Path};
use tracing::{debug, info, instrument, warn};

use crate::record::Coordinate;

/// One polygon as rings of `(longitude, latitude)`; the first ring is the
/// outer boundary, any others are holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub rings: Vec<Vec<(f64, f64)>>,
}

pub trait Renderer {
    fn render(&self, points: &[Coordinate], background: &[Polygon], path: &Path) -> Result<()>;
}

/// Read Polygon and MultiPolygon features from a GeoJSON FeatureCollection,
/// skipping features whose `name` property is in `exclude`.
#[instrument(level = "info", skip(exclude))]
pub fn load_geojson(path: &Path, exclude: &[String]) -> Result<Vec<Polygon>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let doc: Value = serde_json::from_str(&text).with_context(|| format!("parsing {:?}", path))?;
    let polygons = parse_features(&doc, exclude);
    info!(polygons = polygons.len(), "loaded background layer");
    Ok(polygons)
}

pub fn parse_features(doc: &Value, exclude: &[String]) -> Vec<Polygon> {
    let mut out = Vec::new();
    let Some(features) = doc["features"].as_array() else {
        warn!("GeoJSON has no features array");
        return out;
    };
    for feature in features {
        let name = feature["properties"]["name"].as_str().unwrap_or_default();
        if exclude.iter().any(|e| e == name) {
            debug!(name, "skipping excluded feature");
            continue;
        }
        let geometry = &feature["geometry"];
        let coords = &geometry["coordinates"];
        match geometry["type"].as_str() {
            Some("Polygon") => out.extend(parse_polygon(coords)),
            Some("MultiPolygon") => {
                out.extend(coords.as_array().into_iter().flatten().filter_map(parse_polygon))
            }
            other => debug!(name, kind = ?other, "skipping non-polygon feature"),
        }
    }
    out
}

fn parse_polygon(value: &Value) -> Option<Polygon> {
    let rings: Vec<Vec<(f64, f64)>> = value
        .as_array()?
        .iter()
        .filter_map(|ring| {
            ring.as_array().map(|pts| {
                pts.iter()
                    .filter_map(|p| Some((p.get(0)?.as_f64()?, p.get(1)?.as_f64()?)))
                    .collect()
            })
        })
        .collect();
    (!rings.is_empty()).then_some(Polygon { rings })
}

/// Plate carrée projection onto a fixed-size PNG.
#[derive(Debug, Clone)]
pub struct EquirectangularRenderer {
    pub width: u32,
    pub height: u32,
    /// Latitude band shown, south to north.
    pub lat_range: (f64, f64),
    pub point_radius: u32,
    pub background: Rgb<u8>,
    pub land: Rgb<u8>,
    pub outline: Rgb<u8>,
    pub point: Rgb<u8>,
}

impl EquirectangularRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            lat_range: (-60.0, 85.0),
            point_radius: (width / 600).max(2),
            background: Rgb([255, 255, 255]),
            land: Rgb([211, 211, 211]),
            outline: Rgb([0, 0, 0]),
            point: Rgb([0xCE, 0x42, 0x57]),
        }
    }

    /// Pixel position for a coordinate; may fall outside the canvas.
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (south, north) = self.lat_range;
        let x = (lon + 180.0) / 360.0 * self.width as f64;
        let y = (north - lat) / (north - south) * self.height as f64;
        (x, y)
    }

    fn put(&self, img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height {
            img.put_pixel(x as u32, y as u32, color);
        }
    }

    /// Even-odd scanline fill over all rings, so holes stay empty.
    fn fill(&self, img: &mut RgbImage, polygon: &Polygon) {
        let rings: Vec<Vec<(f64, f64)>> = polygon
            .rings
            .iter()
            .map(|r| r.iter().map(|&(lon, lat)| self.project(lon, lat)).collect())
            .collect();
        let (min_y, max_y) = rings
            .iter()
            .flatten()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &(_, y)| (lo.min(y), hi.max(y)));
        if min_y > max_y {
            return;
        }
        let start = min_y.floor().max(0.0) as i64;
        let end = max_y.ceil().min(self.height as f64 - 1.0) as i64;

        let mut xs: Vec<f64> = Vec::new();
        for row in start..=end {
            let sy = row as f64 + 0.5;
            xs.clear();
            for ring in &rings {
                for (i, &(x0, y0)) in ring.iter().enumerate() {
                    let (x1, y1) = ring[(i + 1) % ring.len()];
                    if (y0 <= sy && sy < y1) || (y1 <= sy && sy < y0) {
                        xs.push(x0 + (sy - y0) / (y1 - y0) * (x1 - x0));
                    }
                }
            }
            xs.sort_by(|a, b| a.total_cmp(b));
            for pair in xs.chunks_exact(2) {
                let from = pair[0].round() as i64;
                let to = pair[1].round() as i64;
                for x in from..to {
                    self.put(img, x, row, self.land);
                }
            }
        }
    }

    fn stroke(&self, img: &mut RgbImage, polygon: &Polygon) {
        for ring in &polygon.rings {
            for pair in ring.windows(2) {
                let (x0, y0) = self.project(pair[0].0, pair[0].1);
                let (x1, y1) = self.project(pair[1].0, pair[1].1);
                self.line(img, (x0.round() as i64, y0.round() as i64), (x1.round() as i64, y1.round() as i64));
            }
        }
    }

    /// Bresenham.
    fn line(&self, img: &mut RgbImage, (mut x0, mut y0): (i64, i64), (x1, y1): (i64, i64)) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.put(img, x0, y0, self.outline);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn disc(&self, img: &mut RgbImage, cx: f64, cy: f64) {
        let r = self.point_radius as i64;
        let (cx, cy) = (cx.round() as i64, cy.round() as i64);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    self.put(img, cx + dx, cy + dy, self.point);
                }
            }
        }
    }

    pub fn draw(&self, points: &[Coordinate], background: &[Polygon]) -> RgbImage {
        let mut img = RgbImage::from_pixel(self.width, self.height, self.background);
        for polygon in background {
            self.fill(&mut img, polygon);
        }
        for polygon in background {
            self.stroke(&mut img, polygon);
        }
        for p in points {
            let (x, y) = self.project(p.longitude, p.latitude);
            self.disc(&mut img, x, y);
        }
        img
    }
}

impl Renderer for EquirectangularRenderer {
    #[instrument(level = "info", skip(self, points, background), fields(points = points.len()))]
    fn render(&self, points: &[Coordinate], background: &[Polygon], path: &Path) -> Result<()> {
        let img = self.draw(points, background);
        img.save(path)
            .with_context(|| format!("saving map to {:?}", path))?;
        info!(path = %path.display(), width = self.width, height = self.height, "wrote map");
        Ok(())
    }
}
