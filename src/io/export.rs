//! Local GeoTIFF export service.
//!
//! Cuts the request geometry out of a scene, writes it as a float GeoTIFF with
//! the scene metadata embedded and, when the request asks for another CRS,
//! reprojects it with gdalwarp. Requests whose estimated size passes the
//! ceiling are refused with [`DownloadOutcome::SizeExceeded`] before any pixel
//! is written.
use std::path::{Path, PathBuf};

use geo::BoundingRect;
use ndarray::s;
use tracing::{debug, info};

use crate::core::export::{DownloadOutcome, DownloadRequest, DownloadService};
use crate::core::params::MAX_REQUEST_BYTES;
use crate::core::processing::mask::rasterize;
use crate::core::processing::ops::apply_mask;
use crate::core::region::REGION_CRS;
use crate::core::scene::{GeoGrid, METRES_PER_DEGREE, Scene};
use crate::error::{Error, Result};
use crate::io::gdal::warp_to;
use crate::io::writers::geotiff::write_scene_tiff;
use crate::io::writers::metadata::embed_tiff_metadata;

/// Bytes per exported pixel and band (float32).
const BYTES_PER_SAMPLE: u64 = 4;

#[derive(Debug, Clone)]
pub struct GeoTiffExportService {
    out_dir: PathBuf,
    max_request_bytes: u64,
}

impl GeoTiffExportService {
    pub fn new(out_dir: impl Into<PathBuf>) -> Result<Self> {
        let out_dir = out_dir.into();
        std::fs::create_dir_all(&out_dir)?;
        Ok(Self {
            out_dir,
            max_request_bytes: MAX_REQUEST_BYTES,
        })
    }

    pub fn with_max_request_bytes(mut self, bytes: u64) -> Self {
        self.max_request_bytes = bytes;
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Size of the request at its output scale, all scene bands, float32.
    pub fn estimate_request_bytes(scene: &Scene, request: &DownloadRequest) -> u64 {
        let Some(bbox) = request.geometry.bounding_rect() else {
            return 0;
        };
        let lat = bbox.center().y.to_radians();
        let width_m = bbox.width() * METRES_PER_DEGREE * lat.cos();
        let height_m = bbox.height() * METRES_PER_DEGREE;
        let cols = (width_m / request.scale).ceil().max(1.0) as u64;
        let rows = (height_m / request.scale).ceil().max(1.0) as u64;
        cols * rows * scene.bands().len() as u64 * BYTES_PER_SAMPLE
    }

    /// Scene restricted to the request's bounding window, pixels outside the geometry undefined.
    fn cut(scene: &Scene, request: &DownloadRequest) -> Result<Scene> {
        let unit_error = |reason: &str| Error::Export {
            unit: request.name.clone(),
            reason: reason.to_string(),
        };
        let bbox = request
            .geometry
            .bounding_rect()
            .ok_or_else(|| unit_error("empty geometry"))?;
        let (r0, c0, rows, cols) = scene
            .grid
            .window(&bbox)
            .ok_or_else(|| unit_error("geometry does not overlap the scene"))?;
        let gt = scene.grid.geotransform;
        let grid = GeoGrid {
            geotransform: [
                gt[0] + c0 as f64 * gt[1],
                gt[1],
                0.0,
                gt[3] + r0 as f64 * gt[5],
                0.0,
                gt[5],
            ],
            rows,
            cols,
        };
        let inside = rasterize(&grid, &request.geometry);
        let mut cut = Scene::new(scene.metadata.clone(), grid);
        for band in scene.bands() {
            let window = band.data.slice(s![r0..r0 + rows, c0..c0 + cols]).to_owned();
            cut.set_band(band.name.clone(), apply_mask(&window, &inside))?;
        }
        Ok(cut)
    }

    fn write(&self, scene: &Scene, request: &DownloadRequest) -> Result<PathBuf> {
        let cut = Self::cut(scene, request)?;
        let names = cut.band_names();
        let target = self
            .out_dir
            .join(format!("{}.{}", request.name, request.format.extension()));

        if request.crs.eq_ignore_ascii_case(REGION_CRS) {
            let mut ds = write_scene_tiff(&target, &cut, &names)?;
            embed_tiff_metadata(&mut ds, &cut.metadata)?;
            debug!("Wrote {:?} on the native grid", target);
            return Ok(target);
        }

        let tmp = tempfile::Builder::new()
            .prefix(&request.name)
            .suffix(".tif")
            .tempfile_in(&self.out_dir)?;
        {
            let mut ds = write_scene_tiff(tmp.path(), &cut, &names)?;
            embed_tiff_metadata(&mut ds, &cut.metadata)?;
        }
        // Output resolution in degrees of the geographic target CRS.
        warp_to(tmp.path(), &target, &request.crs, request.scale / METRES_PER_DEGREE)?;
        Ok(target)
    }
}

impl DownloadService for GeoTiffExportService {
    fn download_url(&self, scene: &Scene, request: &DownloadRequest) -> DownloadOutcome {
        let estimate = Self::estimate_request_bytes(scene, request);
        if estimate > self.max_request_bytes {
            info!(
                "{}: estimated {} bytes exceeds {} bytes",
                request.name, estimate, self.max_request_bytes
            );
            return DownloadOutcome::SizeExceeded;
        }
        match self.write(scene, request) {
            Ok(path) => DownloadOutcome::Ready(format!("file://{}", path.display())),
            Err(e) => DownloadOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::region::{SourceCoord, flatten_polygon};
    use crate::core::scene::SceneMetadata;
    use crate::io::gdal::GdalSceneReader;
    use crate::types::ExportFormat;
    use chrono::{TimeZone, Utc};
    use geo::MultiPolygon;
    use ndarray::Array2;

    fn scene() -> Scene {
        Scene::new(
            SceneMetadata {
                id: "S2A_20230714".into(),
                acquired: Utc.with_ymd_and_hms(2023, 7, 14, 13, 0, 0).unwrap(),
                cloud_pct: 0.5,
                properties: Default::default(),
            },
            GeoGrid::new(-46.0, -17.0, 0.001, 20, 20),
        )
        .with_band("B4", Array2::from_elem((20, 20), 0.1))
        .unwrap()
        .with_band("ndvi", Array2::from_elem((20, 20), 0.6))
        .unwrap()
    }

    fn request(name: &str, x0: f64, y0: f64, size: f64, crs: &str) -> DownloadRequest {
        let ring = vec![
            SourceCoord::xy(x0, y0),
            SourceCoord::xy(x0 + size, y0),
            SourceCoord::xy(x0 + size, y0 + size),
            SourceCoord::xy(x0, y0 + size),
            SourceCoord::xy(x0, y0),
        ];
        DownloadRequest {
            name: name.into(),
            geometry: MultiPolygon::new(vec![flatten_polygon(&[ring]).unwrap()]),
            scale: 20.0,
            crs: crs.into(),
            format: ExportFormat::GeoTiff,
        }
    }

    #[test]
    fn estimate_grows_with_area_and_bands() {
        let small = GeoTiffExportService::estimate_request_bytes(&scene(), &request("a", -46.0, -17.01, 0.01, "EPSG:4674"));
        let large = GeoTiffExportService::estimate_request_bytes(&scene(), &request("b", -46.0, -17.1, 0.1, "EPSG:4674"));
        assert!(small > 0);
        assert!(large > 90 * small);
    }

    #[test]
    fn oversized_request_is_refused_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let service = GeoTiffExportService::new(dir.path()).unwrap().with_max_request_bytes(16);
        let outcome = service.download_url(&scene(), &request("image2023-07-14", -46.0, -17.02, 0.02, "EPSG:4674"));
        assert_eq!(outcome, DownloadOutcome::SizeExceeded);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn geometry_outside_scene_fails() {
        let dir = tempfile::tempdir().unwrap();
        let service = GeoTiffExportService::new(dir.path()).unwrap();
        let outcome = service.download_url(&scene(), &request("far", 10.0, 10.0, 0.01, "EPSG:4326"));
        assert!(matches!(outcome, DownloadOutcome::Failed(ref r) if r.contains("far")));
    }

    #[test]
    fn native_crs_export_writes_named_bands() {
        let dir = tempfile::tempdir().unwrap();
        let service = GeoTiffExportService::new(dir.path()).unwrap();
        let outcome = service.download_url(&scene(), &request("image2023-07-14", -45.9955, -17.0145, 0.01, "EPSG:4326"));
        let DownloadOutcome::Ready(url) = outcome else {
            panic!("expected a url, got {:?}", outcome);
        };
        let path = dir.path().join("image2023-07-14.tif");
        assert_eq!(url, format!("file://{}", path.display()));

        let reader = GdalSceneReader::open(&path).unwrap();
        assert_eq!(reader.metadata.band_names, vec!["B4", "ndvi"]);
        assert_eq!(reader.metadata.metadata["DATA"], "2023-07-14");
        assert_eq!((reader.metadata.size_x, reader.metadata.size_y), (11, 11));
    }
}
