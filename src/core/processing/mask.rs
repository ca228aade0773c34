//! Cloud, shadow and snow masking of Sentinel-2 L2A scenes.
//!
//! A pixel survives only when cloud probability and snow probability are both
//! below 5 % and the scene classification is neither cloud shadow (3) nor
//! cirrus (10). Surviving reflectance is scaled to [0, 1], auxiliary bands are
//! dropped and everything outside the region becomes undefined.
use geo::{BoundingRect, Contains, MultiPolygon, Point};
use ndarray::{Array2, Zip};
use tracing::debug;

use crate::core::processing::ops::{apply_mask, scale};
use crate::core::region::Region;
use crate::core::scene::{GeoGrid, Scene};
use crate::error::Result;
use crate::types::band;

/// Cloud and snow probabilities must stay strictly below this percentage.
pub const MAX_PROBABILITY_PCT: f64 = 5.0;
/// Scene classification value for cloud shadow.
pub const SCL_CLOUD_SHADOW: f64 = 3.0;
/// Scene classification value for thin cirrus.
pub const SCL_CIRRUS: f64 = 10.0;
/// Digital numbers per unit reflectance.
pub const REFLECTANCE_SCALE: f64 = 10_000.0;

/// Per-pixel clear-sky test over the scene's quality bands.
///
/// NaN in any quality band fails the test.
pub fn clear_sky_mask(scene: &Scene) -> Result<Array2<bool>> {
    let cloud = scene.band(band::CLOUD_PROBABILITY)?;
    let snow = scene.band(band::SNOW_PROBABILITY)?;
    let scl = scene.band(band::SCENE_CLASSIFICATION)?;
    Ok(Zip::from(cloud)
        .and(snow)
        .and(scl)
        .map_collect(|&c, &s, &class| {
            c < MAX_PROBABILITY_PCT
                && s < MAX_PROBABILITY_PCT
                && class != SCL_CLOUD_SHADOW
                && class != SCL_CIRRUS
                && !class.is_nan()
        }))
}

/// Pixels of `grid` whose centre lies inside `geometry`.
pub fn rasterize(grid: &GeoGrid, geometry: &MultiPolygon<f64>) -> Array2<bool> {
    let mut inside = Array2::from_elem((grid.rows, grid.cols), false);
    let Some(bounds) = geometry.bounding_rect() else {
        return inside;
    };
    let Some((r0, c0, rows, cols)) = grid.window(&bounds) else {
        return inside;
    };
    for row in r0..r0 + rows {
        for col in c0..c0 + cols {
            let (x, y) = grid.pixel_center(row, col);
            if geometry.contains(&Point::new(x, y)) {
                inside[[row, col]] = true;
            }
        }
    }
    inside
}

/// Mask, scale and clip one scene to the region.
///
/// Metadata is carried over unchanged; only reflectance bands remain.
pub fn mask_clouds_and_shadows(scene: &Scene, region: &Region) -> Result<Scene> {
    let clear = clear_sky_mask(scene)?;
    let inside = rasterize(&scene.grid, &region.geometry());
    let keep = Zip::from(&clear).and(&inside).map_collect(|&c, &i| c && i);

    let mut masked = Scene::new(scene.metadata.clone(), scene.grid);
    for b in scene.bands().iter().filter(|b| band::is_reflectance(&b.name)) {
        let reflectance = scale(&apply_mask(&b.data, &keep), 1.0 / REFLECTANCE_SCALE);
        masked.set_band(b.name.clone(), reflectance)?;
    }

    let kept = keep.iter().filter(|&&k| k).count();
    debug!(
        "Masked scene {}: {} of {} pixels kept, bands {:?}",
        scene.metadata.id,
        kept,
        keep.len(),
        masked.band_names()
    );
    Ok(masked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::region::{SourceCoord, flatten_polygon};
    use crate::core::scene::SceneMetadata;
    use chrono::{TimeZone, Utc};
    use ndarray::array;
    use std::collections::BTreeMap;

    fn region_covering(x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
        let ring = vec![
            SourceCoord::xy(x0, y0),
            SourceCoord::xy(x1, y0),
            SourceCoord::xy(x1, y1),
            SourceCoord::xy(x0, y1),
            SourceCoord::xy(x0, y0),
        ];
        Region::from_named(vec![(
            Some("plot".into()),
            MultiPolygon::new(vec![flatten_polygon(&[ring]).unwrap()]),
        )])
    }

    fn scene_2x2(cloud: Array2<f64>, snow: Array2<f64>, scl: Array2<f64>) -> Scene {
        let mut props = BTreeMap::new();
        props.insert("MGRS_TILE".into(), serde_json::json!("23KLP"));
        let meta = SceneMetadata {
            id: "COPERNICUS/S2_SR_HARMONIZED/20230714T131239".into(),
            acquired: Utc.with_ymd_and_hms(2023, 7, 14, 13, 12, 39).unwrap(),
            cloud_pct: 2.0,
            properties: props,
        };
        Scene::new(meta, GeoGrid::new(0.0, 2.0, 1.0, 2, 2))
            .with_band("B4", Array2::from_elem((2, 2), 1200.0))
            .unwrap()
            .with_band("B8", Array2::from_elem((2, 2), 3400.0))
            .unwrap()
            .with_band(band::CLOUD_PROBABILITY, cloud)
            .unwrap()
            .with_band(band::SNOW_PROBABILITY, snow)
            .unwrap()
            .with_band(band::SCENE_CLASSIFICATION, scl)
            .unwrap()
    }

    #[test]
    fn every_failing_condition_masks_the_pixel() {
        let scene = scene_2x2(
            array![[0.0, 5.0], [0.0, 0.0]],
            array![[0.0, 0.0], [7.0, 0.0]],
            array![[4.0, 4.0], [4.0, 3.0]],
        );
        let region = region_covering(-1.0, -1.0, 3.0, 3.0);
        let masked = mask_clouds_and_shadows(&scene, &region).unwrap();
        let red = masked.band("B4").unwrap();
        assert!((red[[0, 0]] - 0.12).abs() < 1e-12);
        assert!(red[[0, 1]].is_nan(), "cloud probability of 5 is not < 5");
        assert!(red[[1, 0]].is_nan(), "snow");
        assert!(red[[1, 1]].is_nan(), "cloud shadow");
    }

    #[test]
    fn cirrus_is_masked() {
        let scene = scene_2x2(
            Array2::zeros((2, 2)),
            Array2::zeros((2, 2)),
            array![[10.0, 4.0], [5.0, 6.0]],
        );
        let clear = clear_sky_mask(&scene).unwrap();
        assert_eq!(clear, array![[false, true], [true, true]]);
    }

    #[test]
    fn auxiliary_bands_are_dropped_and_metadata_kept() {
        let scene = scene_2x2(Array2::zeros((2, 2)), Array2::zeros((2, 2)), Array2::zeros((2, 2)));
        let region = region_covering(-1.0, -1.0, 3.0, 3.0);
        let masked = mask_clouds_and_shadows(&scene, &region).unwrap();
        assert_eq!(masked.band_names(), vec!["B4", "B8"]);
        assert_eq!(masked.metadata, scene.metadata);
    }

    #[test]
    fn pixels_outside_region_are_undefined() {
        let scene = scene_2x2(Array2::zeros((2, 2)), Array2::zeros((2, 2)), Array2::zeros((2, 2)));
        // Only the left column (x in 0..1) has its centre inside.
        let region = region_covering(-0.5, -0.5, 1.0, 2.5);
        let masked = mask_clouds_and_shadows(&scene, &region).unwrap();
        let nir = masked.band("B8").unwrap();
        assert!((nir[[0, 0]] - 0.34).abs() < 1e-12);
        assert!((nir[[1, 0]] - 0.34).abs() < 1e-12);
        assert!(nir[[0, 1]].is_nan());
        assert!(nir[[1, 1]].is_nan());
    }

    #[test]
    fn missing_quality_band_is_an_error() {
        let meta = SceneMetadata {
            id: "x".into(),
            acquired: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            cloud_pct: 0.0,
            properties: BTreeMap::new(),
        };
        let scene = Scene::new(meta, GeoGrid::new(0.0, 1.0, 1.0, 1, 1));
        assert!(clear_sky_mask(&scene).is_err());
    }
}
