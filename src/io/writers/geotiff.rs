use gdal::raster::{Buffer, ColorInterpretation};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use std::path::Path;

use crate::core::scene::Scene;
use crate::io::GdalError;

/// Write the named bands of a scene as a float32 GeoTIFF in EPSG:4326.
///
/// Band descriptions carry the band names; undefined pixels stay NaN and NaN
/// is declared as nodata.
pub fn write_scene_tiff(output: &Path, scene: &Scene, bands: &[&str]) -> crate::Result<Dataset> {
    let (rows, cols) = (scene.grid.rows, scene.grid.cols);
    let driver = DriverManager::get_driver_by_name("GTiff").map_err(GdalError::from)?;
    let mut ds = driver
        .create_with_band_type::<f32, _>(output, cols, rows, bands.len())
        .map_err(GdalError::from)?;
    ds.set_geo_transform(&scene.grid.geotransform)
        .map_err(GdalError::from)?;
    let wkt = SpatialRef::from_epsg(4326)
        .and_then(|srs| srs.to_wkt())
        .map_err(GdalError::from)?;
    ds.set_projection(&wkt).map_err(GdalError::from)?;

    for (i, name) in bands.iter().enumerate() {
        let data = scene.band(name)?;
        let values: Vec<f32> = data.iter().map(|&v| v as f32).collect();
        let mut handle = ds.rasterband(i + 1).map_err(GdalError::from)?;
        handle
            .set_color_interpretation(ColorInterpretation::GrayIndex)
            .map_err(GdalError::from)?;
        handle.set_description(name).map_err(GdalError::from)?;
        handle
            .set_no_data_value(Some(f64::NAN))
            .map_err(GdalError::from)?;
        let mut buf = Buffer::new((cols, rows), values);
        handle
            .write((0, 0), (cols, rows), &mut buf)
            .map_err(GdalError::from)?;
    }
    Ok(ds)
}
