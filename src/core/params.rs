use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::catalog::DEFAULT_COLLECTION;
use crate::core::export::{TILE_COLS, TILE_ROWS};
use crate::core::processing::zonal::ZONAL_SCALE_M;
use crate::error::{Error, Result};
use crate::types::{ExportFormat, SpectralIndex};

/// Upstream limit on a single download request, in bytes.
pub const MAX_REQUEST_BYTES: u64 = 50_331_648;

/// Analysis parameters suitable for config files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    pub collection: String,
    pub start: NaiveDate,
    /// Inclusive; `None` means today
    pub end: Option<NaiveDate>,
    /// Scenes must be strictly below this cloudy pixel percentage
    pub cloud_max: f64,
    /// Indices reported in the time series, in column order
    pub indices: Vec<SpectralIndex>,
    /// Restrict map/export work to these `YYYY-MM-DD` dates; empty means latest scene
    pub dates: Vec<String>,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            end: None,
            cloud_max: 5.0,
            indices: vec![SpectralIndex::Ndvi, SpectralIndex::Evi],
            dates: Vec::new(),
        }
    }
}

impl AnalysisParams {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&text)?;
        params.validate()?;
        Ok(params)
    }

    pub fn end_or_today(&self) -> NaiveDate {
        self.end.unwrap_or_else(|| chrono::Utc::now().date_naive())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.cloud_max) {
            return Err(Error::InvalidArgument {
                arg: "cloud_max",
                value: self.cloud_max.to_string(),
            });
        }
        if self.indices.is_empty() {
            return Err(Error::InvalidArgument {
                arg: "indices",
                value: "[]".into(),
            });
        }
        for date in &self.dates {
            if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                return Err(Error::InvalidArgument {
                    arg: "dates",
                    value: date.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Raster export parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportParams {
    /// Output pixel size in metres
    pub scale: f64,
    pub crs: String,
    pub format: ExportFormat,
    /// Fallback grid shape
    pub tile_rows: usize,
    pub tile_cols: usize,
    pub max_request_bytes: u64,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            scale: 20.0,
            crs: "EPSG:4674".to_string(),
            format: ExportFormat::GeoTiff,
            tile_rows: TILE_ROWS,
            tile_cols: TILE_COLS,
            max_request_bytes: MAX_REQUEST_BYTES,
        }
    }
}

/// Zonal statistics parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsParams {
    /// Reduction scale in metres
    pub scale: f64,
}

impl Default for StatsParams {
    fn default() -> Self {
        Self {
            scale: ZONAL_SCALE_M,
        }
    }
}
