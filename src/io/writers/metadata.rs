use gdal::Dataset;
use gdal::Metadata;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::scene::SceneMetadata;
use crate::error::Result;
use crate::io::GdalError;

/// Flatten scene metadata into upper-case key/value pairs for embedding.
///
/// Catalog properties keep their own names; strings are written bare, other
/// JSON values in their JSON text form.
pub fn extract_metadata_fields(meta: &SceneMetadata) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert("SCENE_ID".to_string(), meta.id.clone());
    fields.insert("ACQUISITION_TIME".to_string(), meta.acquired.to_rfc3339());
    fields.insert("DATA".to_string(), meta.date_key());
    fields.insert(
        "CLOUDY_PIXEL_PERCENTAGE".to_string(),
        meta.cloud_pct.to_string(),
    );
    for (key, value) in &meta.properties {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        fields.entry(key.clone()).or_insert(text);
    }
    fields.insert(
        "CONVERSION_TOOL".to_string(),
        env!("CARGO_PKG_NAME").to_string(),
    );
    fields.insert(
        "CONVERSION_VERSION".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    fields
}

/// Embed scene metadata into a GeoTIFF dataset (default domain)
pub fn embed_tiff_metadata(ds: &mut Dataset, meta: &SceneMetadata) -> Result<()> {
    for (key, value) in extract_metadata_fields(meta) {
        ds.set_metadata_item(&key, &value, "")
            .map_err(GdalError::from)?;
    }
    Ok(())
}

/// Path of the JSON sidecar belonging to a raster or image file
pub fn sidecar_path(output_path: &Path) -> PathBuf {
    output_path.with_extension("json")
}

/// Write scene metadata as a JSON sidecar next to `output_path`, with the
/// grid's geotransform and CRS when known.
pub fn write_metadata_sidecar(
    output_path: &Path,
    meta: &SceneMetadata,
    geotransform: Option<[f64; 6]>,
    crs: Option<&str>,
) -> Result<PathBuf> {
    let mut doc = serde_json::to_value(meta)?;
    if let Value::Object(map) = &mut doc {
        if let Some(gt) = geotransform {
            map.insert("geotransform".to_string(), serde_json::json!(gt));
        }
        if let Some(crs) = crs.filter(|c| !c.is_empty()) {
            map.insert("crs".to_string(), Value::String(crs.to_string()));
        }
    }
    let path = sidecar_path(output_path);
    std::fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
    info!("Created metadata sidecar: {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn meta() -> SceneMetadata {
        let mut properties = BTreeMap::new();
        properties.insert("MGRS_TILE".into(), Value::String("23KLP".into()));
        properties.insert("SUN_ELEVATION".into(), serde_json::json!(54.2));
        SceneMetadata {
            id: "20230714T131239_20230714T131236_T23KLP".into(),
            acquired: Utc.with_ymd_and_hms(2023, 7, 14, 13, 12, 39).unwrap(),
            cloud_pct: 1.25,
            properties,
        }
    }

    #[test]
    fn fields_include_core_and_properties() {
        let fields = extract_metadata_fields(&meta());
        assert_eq!(fields["DATA"], "2023-07-14");
        assert_eq!(fields["CLOUDY_PIXEL_PERCENTAGE"], "1.25");
        assert_eq!(fields["MGRS_TILE"], "23KLP");
        assert_eq!(fields["SUN_ELEVATION"], "54.2");
    }

    #[test]
    fn sidecar_round_trips_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("ndvi_2023-07-14.jpg");
        let path = write_metadata_sidecar(&image, &meta(), Some([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]), Some("EPSG:4326")).unwrap();
        assert_eq!(path, dir.path().join("ndvi_2023-07-14.json"));
        let text = std::fs::read_to_string(&path).unwrap();
        let back: SceneMetadata = serde_json::from_str(&text).unwrap();
        assert_eq!(back, meta());
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["crs"], "EPSG:4326");
    }
}
