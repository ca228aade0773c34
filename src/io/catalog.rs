//! Scene catalog over a directory of GeoTIFFs with JSON metadata sidecars.
//!
//! Each scene is a pair `<stem>.tif` + `<stem>.json`; the sidecar holds the
//! serialized [`SceneMetadata`] and the GeoTIFF holds one band per Sentinel-2
//! band, named by band description (`B2`, `B8`, `SCL`, ...).
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::catalog::{Catalog, CatalogQuery, SceneHandle};
use crate::core::scene::{Scene, SceneMetadata};
use crate::error::{Error, Result};
use crate::io::gdal::GdalSceneReader;

const RASTER_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Catalog(format!("{} is not a directory", root.display())));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn raster_for(sidecar: &Path) -> Option<PathBuf> {
        RASTER_EXTENSIONS
            .iter()
            .map(|ext| sidecar.with_extension(ext))
            .find(|p| p.is_file())
    }

    /// Every (metadata, raster) pair in the directory, unreadable sidecars skipped.
    fn entries(&self) -> Result<Vec<(SceneMetadata, PathBuf)>> {
        let mut out = Vec::new();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")))
            .collect();
        paths.sort();
        for sidecar in paths {
            let Some(raster) = Self::raster_for(&sidecar) else {
                debug!("No raster next to {:?}", sidecar);
                continue;
            };
            let text = std::fs::read_to_string(&sidecar)?;
            match serde_json::from_str::<SceneMetadata>(&text) {
                Ok(meta) => out.push((meta, raster)),
                Err(e) => warn!("Skipping unreadable sidecar {:?}: {}", sidecar, e),
            }
        }
        Ok(out)
    }
}

impl Catalog for DirectoryCatalog {
    fn search(&self, query: &CatalogQuery) -> Result<Vec<SceneHandle>> {
        let mut handles = Vec::new();
        for (metadata, raster) in self.entries()? {
            let reader = GdalSceneReader::open(&raster)?;
            let handle = SceneHandle {
                metadata,
                footprint: Some(reader.grid().footprint()),
            };
            if query.matches(&handle) {
                handles.push(handle);
            }
        }
        debug!("{} scenes in {:?} match", handles.len(), self.root);
        Ok(handles)
    }

    fn load(&self, handle: &SceneHandle) -> Result<Scene> {
        let (metadata, raster) = self
            .entries()?
            .into_iter()
            .find(|(m, _)| m.id == handle.metadata.id)
            .ok_or_else(|| {
                Error::Catalog(format!("scene {} not found in {}", handle.metadata.id, self.root.display()))
            })?;
        GdalSceneReader::open(&raster)?.read_scene(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processing::zonal::LocalReducer;
    use crate::core::region::{Region, SourceCoord, flatten_polygon};
    use crate::core::scene::GeoGrid;
    use crate::io::writers::geotiff::write_scene_tiff;
    use crate::io::writers::metadata::write_metadata_sidecar;
    use crate::types::band;
    use chrono::{NaiveDate, TimeZone, Utc};
    use geo::MultiPolygon;
    use ndarray::Array2;

    const BANDS: [(&str, f64); 10] = [
        (band::BLUE, 500.0),
        (band::GREEN, 800.0),
        (band::RED, 1000.0),
        (band::RED_EDGE, 2000.0),
        (band::NIR, 3000.0),
        (band::SWIR1, 1000.0),
        (band::SWIR2, 600.0),
        (band::CLOUD_PROBABILITY, 0.0),
        (band::SNOW_PROBABILITY, 0.0),
        (band::SCENE_CLASSIFICATION, 4.0),
    ];

    fn write_scene(dir: &Path, stem: &str, day: u32, cloud_pct: f64) {
        let metadata = SceneMetadata {
            id: stem.into(),
            acquired: Utc.with_ymd_and_hms(2023, 8, day, 13, 10, 0).unwrap(),
            cloud_pct,
            properties: Default::default(),
        };
        let grid = GeoGrid::new(-46.0, -17.0, 0.001, 4, 4);
        let mut scene = Scene::new(metadata.clone(), grid);
        for (name, value) in BANDS {
            scene.set_band(name, Array2::from_elem((4, 4), value)).unwrap();
        }
        let names: Vec<&str> = BANDS.iter().map(|(n, _)| *n).collect();
        let raster = dir.join(format!("{}.tif", stem));
        drop(write_scene_tiff(&raster, &scene, &names).unwrap());
        write_metadata_sidecar(&raster, &metadata, Some(grid.geotransform), Some("EPSG:4326")).unwrap();
    }

    fn region() -> Region {
        let ring = vec![
            SourceCoord::xy(-46.0, -17.004),
            SourceCoord::xy(-45.996, -17.004),
            SourceCoord::xy(-45.996, -17.0),
            SourceCoord::xy(-46.0, -17.0),
            SourceCoord::xy(-46.0, -17.004),
        ];
        Region::from_named(vec![(
            Some("Talhao 1".into()),
            MultiPolygon::new(vec![flatten_polygon(&[ring]).unwrap()]),
        )])
    }

    fn query(region: Region) -> CatalogQuery {
        CatalogQuery::new(
            region,
            NaiveDate::from_ymd_opt(2023, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 8, 31).unwrap(),
            5.0,
        )
    }

    #[test]
    fn missing_directory_is_catalog_error() {
        let err = DirectoryCatalog::open("/nonexistent/scenes").unwrap_err();
        assert!(matches!(err, Error::Catalog(_)));
    }

    #[test]
    fn search_filters_and_load_reads_named_bands() {
        let dir = tempfile::tempdir().unwrap();
        write_scene(dir.path(), "S2A_20230803", 3, 1.5);
        write_scene(dir.path(), "S2B_20230808", 8, 42.0);
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let catalog = DirectoryCatalog::open(dir.path()).unwrap();
        let handles = catalog.search(&query(region())).unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].metadata.id, "S2A_20230803");

        let scene = catalog.load(&handles[0]).unwrap();
        assert_eq!(scene.band_names(), BANDS.iter().map(|(n, _)| *n).collect::<Vec<_>>());
        assert_eq!(scene.band(band::NIR).unwrap()[[2, 3]], 3000.0);
        assert_eq!(scene.metadata.cloud_pct, 1.5);
    }

    #[test]
    fn directory_scenes_feed_the_time_series() {
        let dir = tempfile::tempdir().unwrap();
        write_scene(dir.path(), "S2A_20230803", 3, 1.5);
        write_scene(dir.path(), "S2A_20230813", 13, 0.2);
        let catalog = DirectoryCatalog::open(dir.path()).unwrap();

        let params = crate::core::params::AnalysisParams {
            start: NaiveDate::from_ymd_opt(2023, 8, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 8, 31),
            ..Default::default()
        };
        let table = crate::api::analyze(&catalog, &region(), &params, &LocalReducer).unwrap();
        let dates: Vec<&str> = table.rows.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2023-08-03", "2023-08-13"]);
        assert!(table.rows.iter().all(|r| r.values.iter().all(Option::is_some)));
    }
}
