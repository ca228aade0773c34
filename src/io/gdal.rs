use gdal::raster::ResampleAlg;
use gdal::{Dataset, Metadata, errors::GdalError as GdalCrateError};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::scene::{GeoGrid, Scene, SceneMetadata};

/// Errors encountered when using GDAL reader
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
    #[error("gdalwarp failed: {0}")]
    Warp(String),
}

/// Metadata extracted from a GDAL-supported raster
#[derive(Debug, Clone)]
pub struct GdalMetadata {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Number of raster bands
    pub bands: usize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geotransform: [f64; 6],
    /// Projection as `EPSG:<code>` when recognizable, WKT otherwise
    pub projection: String,
    /// Band descriptions in band order; empty strings where unset
    pub band_names: Vec<String>,
    /// Additional metadata key-value pairs
    pub metadata: HashMap<String, String>,
}

/// Reader for multi-band scene rasters, bands identified by description
pub struct GdalSceneReader {
    pub dataset: Dataset,
    pub metadata: GdalMetadata,
}

// Helper to extract EPSG code from WKT authority tag
fn parse_epsg(wkt: &str) -> Option<String> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    if let Some(idx) = wkt.rfind(KEY) {
        let start = idx + KEY.len();
        if let Some(end) = wkt[start..].find('"') {
            let code = &wkt[start..start + end];
            return Some(format!("EPSG:{}", code));
        }
    }
    None
}

impl GdalSceneReader {
    /// Open a GeoTIFF scene. Only header information is read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GdalError> {
        let dataset = Dataset::open(path.as_ref())?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        if bands == 0 {
            return Err(GdalError::UnsupportedFormat("No raster bands found".into()));
        }
        let geotransform = dataset.geo_transform().map_err(|_| {
            GdalError::UnsupportedFormat(format!("{} has no geotransform", path.as_ref().display()))
        })?;
        let proj = dataset.projection();
        // An empty projection is taken as geographic WGS84.
        let projection = if proj.is_empty() {
            "EPSG:4326".to_string()
        } else if proj.starts_with("EPSG:") {
            proj
        } else if let Some(code) = parse_epsg(&proj) {
            code
        } else {
            proj
        };
        let mut band_names = Vec::with_capacity(bands);
        for idx in 1..=bands {
            let band = dataset.rasterband(idx)?;
            band_names.push(band.description().unwrap_or_default());
        }
        // Collect metadata entries (domain "")
        let mut metadata_map = HashMap::new();
        if let Some(entries) = dataset.metadata_domain("") {
            for entry in entries {
                if let Some((key, val)) = entry.split_once('=') {
                    metadata_map.insert(key.to_string(), val.to_string());
                }
            }
        }
        Ok(GdalSceneReader {
            dataset,
            metadata: GdalMetadata {
                size_x: size_x as usize,
                size_y: size_y as usize,
                bands,
                geotransform,
                projection,
                band_names,
                metadata: metadata_map,
            },
        })
    }

    pub fn grid(&self) -> GeoGrid {
        GeoGrid {
            geotransform: self.metadata.geotransform,
            rows: self.metadata.size_y,
            cols: self.metadata.size_x,
        }
    }

    /// Read a single band (1-based index) as an f64 ndarray of shape (height, width).
    ///
    /// Pixels equal to the band's nodata value become NaN.
    pub fn read_band(&self, index: usize) -> Result<Array2<f64>, GdalError> {
        if index == 0 || index > self.metadata.bands {
            return Err(GdalError::UnsupportedFormat(format!(
                "Band index {} out of range",
                index
            )));
        }
        let band = self.dataset.rasterband(index)?;
        let window = (self.metadata.size_x, self.metadata.size_y);
        let buf = band.read_as::<f64>((0, 0), window, window, Some(ResampleAlg::NearestNeighbour))?;
        let nodata = band.no_data_value().filter(|v| !v.is_nan());
        let mut data_vec = buf.data().to_vec();
        if let Some(nd) = nodata {
            for v in data_vec.iter_mut().filter(|v| **v == nd) {
                *v = f64::NAN;
            }
        }
        Array2::from_shape_vec((self.metadata.size_y, self.metadata.size_x), data_vec).map_err(|_| {
            GdalError::DimensionMismatch(
                self.metadata.size_x,
                self.metadata.size_y,
                window.0,
                window.1,
            )
        })
    }

    /// Read every band into a scene carrying `metadata`.
    ///
    /// Bands without a description are named `band_<n>`.
    pub fn read_scene(&self, metadata: SceneMetadata) -> crate::Result<Scene> {
        if self.metadata.projection != "EPSG:4326" {
            return Err(GdalError::UnsupportedFormat(format!(
                "scene {} is in {}, expected EPSG:4326",
                metadata.id, self.metadata.projection
            ))
            .into());
        }
        let mut scene = Scene::new(metadata, self.grid());
        for (i, name) in self.metadata.band_names.iter().enumerate() {
            let name = if name.is_empty() {
                format!("band_{}", i + 1)
            } else {
                name.clone()
            };
            scene.set_band(name, self.read_band(i + 1)?)?;
        }
        debug!(
            "Read scene {} ({}x{}, {} bands)",
            scene.metadata.id, self.metadata.size_x, self.metadata.size_y, self.metadata.bands
        );
        Ok(scene)
    }
}

/// Reproject `src` into `dst` with gdalwarp at a fixed output resolution.
pub fn warp_to(src: &Path, dst: &Path, t_srs: &str, resolution: f64) -> Result<(), GdalError> {
    let res = resolution.to_string();
    let args: Vec<String> = vec![
        "-of".into(),
        "GTiff".into(),
        "-overwrite".into(),
        "-r".into(),
        "near".into(),
        "-t_srs".into(),
        t_srs.into(),
        "-tr".into(),
        res.clone(),
        res,
        src.to_string_lossy().into_owned(),
        dst.to_string_lossy().into_owned(),
    ];
    info!("Running gdalwarp to {}", t_srs);
    let status = Command::new("gdalwarp")
        .args(args.iter().map(|s| s.as_str()))
        .status()
        .map_err(|e| GdalError::Warp(format!("gdalwarp exec error: {}", e)))?;
    if !status.success() {
        // Best-effort cleanup
        let _ = std::fs::remove_file(dst);
        return Err(GdalError::Warp(format!("exit status {}", status)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsg_from_wkt_authority() {
        let wkt = r#"GEOGCS["WGS 84",DATUM["WGS_1984"],AUTHORITY["EPSG","4326"]]"#;
        assert_eq!(parse_epsg(wkt).as_deref(), Some("EPSG:4326"));
        assert_eq!(parse_epsg("LOCAL_CS[\"x\"]"), None);
    }
}
