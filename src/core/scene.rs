//! Scene model: catalog metadata, the geographic pixel grid and named bands.
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use geo::{Coord, Polygon, Rect};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Metres per degree of latitude, used for scale conversions on geographic grids.
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// Catalog metadata of one acquisition. Carried through processing unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMetadata {
    /// Stable source identifier (`system:id` upstream).
    pub id: String,
    /// Acquisition timestamp.
    pub acquired: DateTime<Utc>,
    /// Scene-wide cloudy pixel percentage.
    pub cloud_pct: f64,
    /// Any further catalog properties, preserved verbatim.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl SceneMetadata {
    pub fn date(&self) -> NaiveDate {
        self.acquired.date_naive()
    }

    /// Acquisition date formatted `YYYY-MM-DD`.
    pub fn date_key(&self) -> String {
        self.acquired.format("%Y-%m-%d").to_string()
    }
}

/// North-up pixel grid in EPSG:4326, GDAL geotransform convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoGrid {
    pub geotransform: [f64; 6],
    pub rows: usize,
    pub cols: usize,
}

impl GeoGrid {
    pub fn new(origin_x: f64, origin_y: f64, pixel_size: f64, rows: usize, cols: usize) -> Self {
        Self {
            geotransform: [origin_x, pixel_size, 0.0, origin_y, 0.0, -pixel_size],
            rows,
            cols,
        }
    }

    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let gt = &self.geotransform;
        let (px, py) = (col as f64 + 0.5, row as f64 + 0.5);
        (
            gt[0] + px * gt[1] + py * gt[2],
            gt[3] + px * gt[4] + py * gt[5],
        )
    }

    pub fn extent(&self) -> Rect<f64> {
        let gt = &self.geotransform;
        let x1 = gt[0] + self.cols as f64 * gt[1];
        let y1 = gt[3] + self.rows as f64 * gt[5];
        Rect::new(Coord { x: gt[0], y: gt[3] }, Coord { x: x1, y: y1 })
    }

    pub fn footprint(&self) -> Polygon<f64> {
        self.extent().to_polygon()
    }

    /// Pixel window `(row0, col0, rows, cols)` covering `rect`, clamped to the grid.
    pub fn window(&self, rect: &Rect<f64>) -> Option<(usize, usize, usize, usize)> {
        let gt = &self.geotransform;
        let col_of = |x: f64| (x - gt[0]) / gt[1];
        let row_of = |y: f64| (y - gt[3]) / gt[5];
        let (c0, c1) = sorted(col_of(rect.min().x), col_of(rect.max().x));
        let (r0, r1) = sorted(row_of(rect.min().y), row_of(rect.max().y));
        let c0 = c0.floor().max(0.0) as usize;
        let r0 = r0.floor().max(0.0) as usize;
        let c1 = (c1.ceil().max(0.0) as usize).min(self.cols);
        let r1 = (r1.ceil().max(0.0) as usize).min(self.rows);
        if c0 >= c1 || r0 >= r1 {
            return None;
        }
        Some((r0, c0, r1 - r0, c1 - c0))
    }

    /// Approximate pixel size in metres at the grid centre.
    pub fn pixel_size_m(&self) -> (f64, f64) {
        let lat = self.extent().center().y.to_radians();
        (
            self.geotransform[1].abs() * METRES_PER_DEGREE * lat.cos(),
            self.geotransform[5].abs() * METRES_PER_DEGREE,
        )
    }
}

fn sorted(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

/// One named raster band; undefined pixels are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub name: String,
    pub data: Array2<f64>,
}

/// One acquisition with its bands. Processing stages return new scenes.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub metadata: SceneMetadata,
    pub grid: GeoGrid,
    bands: Vec<Band>,
    /// `YYYY-MM-DD` join key stamped by the index engine.
    date_key: Option<String>,
}

impl Scene {
    pub fn new(metadata: SceneMetadata, grid: GeoGrid) -> Self {
        Self {
            metadata,
            grid,
            bands: Vec::new(),
            date_key: None,
        }
    }

    /// Add or replace a band; its shape must match the grid.
    pub fn with_band(mut self, name: impl Into<String>, data: Array2<f64>) -> Result<Self> {
        self.set_band(name, data)?;
        Ok(self)
    }

    pub fn set_band(&mut self, name: impl Into<String>, data: Array2<f64>) -> Result<()> {
        let name = name.into();
        if data.dim() != (self.grid.rows, self.grid.cols) {
            return Err(Error::Processing(format!(
                "band {} of scene {} is {:?}, grid is {}x{}",
                name, self.metadata.id, data.dim(), self.grid.rows, self.grid.cols
            )));
        }
        match self.bands.iter_mut().find(|b| b.name == name) {
            Some(existing) => existing.data = data,
            None => self.bands.push(Band { name, data }),
        }
        Ok(())
    }

    pub fn band(&self, name: &str) -> Result<&Array2<f64>> {
        self.bands
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.data)
            .ok_or_else(|| Error::MissingBand {
                scene: self.metadata.id.clone(),
                band: name.to_string(),
            })
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b.name == name)
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    /// Drop every band for which `keep` returns false.
    pub fn retain_bands<F: FnMut(&str) -> bool>(&mut self, mut keep: F) {
        self.bands.retain(|b| keep(&b.name));
    }

    pub fn date_key(&self) -> Option<&str> {
        self.date_key.as_deref()
    }

    pub fn set_date_key(&mut self, key: String) {
        self.date_key = Some(key);
    }
}
