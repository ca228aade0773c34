//! Boundary file reading via GDAL/OGR.
//!
//! Every supported format is opened through OGR, every layer is read, and
//! geometries are reprojected to EPSG:4326 (longitude, latitude order) before
//! they are handed to [`Region::from_sources`]. KMZ archives are unpacked into
//! a temporary directory first and each KML member is read in turn.
use std::fs::File;
use std::path::{Path, PathBuf};

use gdal::Dataset;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::vector::{Geometry, LayerAccess};
use gdal_sys::OGRwkbGeometryType;
use tracing::{debug, info};

use crate::core::region::{Region, SourceCoord, SourceFeature, SourceGeometry};
use crate::error::{Error, Result};

/// Attribute holding the feature name. The LIBKML driver spells it `name`.
pub const NAME_FIELD: &str = "Name";

/// Boundary file formats understood by [`normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryFormat {
    GeoJson,
    Kml,
    Kmz,
    Shapefile,
    GeoPackage,
}

impl BoundaryFormat {
    /// Format from a file name's extension, case-insensitive.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "geojson" | "json" => Some(BoundaryFormat::GeoJson),
            "kml" => Some(BoundaryFormat::Kml),
            "kmz" => Some(BoundaryFormat::Kmz),
            "shp" => Some(BoundaryFormat::Shapefile),
            "gpkg" => Some(BoundaryFormat::GeoPackage),
            _ => None,
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read a boundary file into a normalized region.
pub fn normalize(path: &Path) -> Result<Region> {
    let file = display_name(path);
    let format = BoundaryFormat::from_path(path)
        .ok_or_else(|| Error::format(&file, "unrecognized file extension"))?;
    let sources = match format {
        BoundaryFormat::Kmz => read_kmz(path, &file)?,
        _ => read_vector(path, &file)?,
    };
    let region = Region::from_sources(&file, sources)?;
    info!("Normalized {} into {} features", file, region.len());
    Ok(region)
}

/// Read an uploaded boundary file held in memory.
///
/// `file_name` selects the format and is used in error messages.
pub fn normalize_bytes(file_name: &str, bytes: &[u8]) -> Result<Region> {
    let name = Path::new(file_name)
        .file_name()
        .ok_or_else(|| Error::format(file_name, "missing file name"))?;
    if BoundaryFormat::from_path(Path::new(name)).is_none() {
        return Err(Error::format(file_name, "unrecognized file extension"));
    }
    let dir = tempfile::Builder::new().prefix("s2monitor-upload").tempdir()?;
    let spooled = dir.path().join(name);
    std::fs::write(&spooled, bytes)?;
    normalize(&spooled)
}

fn read_kmz(path: &Path, file: &str) -> Result<Vec<SourceFeature>> {
    let archive_file = File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(archive_file).map_err(|e| Error::parse(file, e.to_string()))?;
    let dir = tempfile::Builder::new().prefix("s2monitor-kmz").tempdir()?;
    archive
        .extract(dir.path())
        .map_err(|e| Error::parse(file, e.to_string()))?;

    let mut members: Vec<PathBuf> = Vec::new();
    collect_kml(dir.path(), &mut members)?;
    members.sort();
    if members.is_empty() {
        return Err(Error::format(file, "archive holds no KML document"));
    }
    debug!("{} contains {} KML members", file, members.len());

    let mut sources = Vec::new();
    for member in &members {
        let origin = format!(
            "{}:{}",
            file,
            member.strip_prefix(dir.path()).unwrap_or(member).display()
        );
        sources.extend(read_vector(member, &origin)?);
    }
    Ok(sources)
}

fn collect_kml(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_kml(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("kml"))
        {
            out.push(path);
        }
    }
    Ok(())
}

fn wgs84() -> Result<SpatialRef> {
    let mut srs = SpatialRef::from_epsg(4326).map_err(crate::io::GdalError::from)?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

/// Read every feature of every layer of an OGR dataset.
fn read_vector(path: &Path, origin: &str) -> Result<Vec<SourceFeature>> {
    let dataset = Dataset::open(path).map_err(|e| Error::parse(origin, e.to_string()))?;
    let target = wgs84()?;
    let mut sources = Vec::new();

    for mut layer in dataset.layers() {
        let layer_origin = format!("{}:{}", origin, layer.name());
        let transform = match layer.spatial_ref() {
            Some(mut srs) => {
                srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
                Some(CoordTransform::new(&srs, &target).map_err(crate::io::GdalError::from)?)
            }
            None => None,
        };
        let mut count = 0usize;
        for feature in layer.features() {
            let Some(geometry) = feature.geometry() else {
                continue;
            };
            let name = [NAME_FIELD, "name"].into_iter().find_map(|field| {
                let idx = feature.field_index(field).ok()?;
                feature.field_as_string(idx).ok().flatten()
            });
            sources.push(SourceFeature {
                name,
                geometry: convert(geometry, transform.as_ref())
                    .map_err(|e| Error::parse(&layer_origin, e.to_string()))?,
                origin: layer_origin.clone(),
            });
            count += 1;
        }
        debug!("Read {} features from {}", count, layer_origin);
    }
    Ok(sources)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Polygon,
    MultiPolygon,
    Collection,
    Other,
}

/// Shape of an OGR geometry with its Z/M flavour dropped, and whether it carries Z.
fn classify(geometry: &Geometry) -> (Shape, bool) {
    use OGRwkbGeometryType::*;
    match geometry.geometry_type() {
        wkbPolygon | wkbPolygonM => (Shape::Polygon, false),
        wkbPolygon25D | wkbPolygonZM => (Shape::Polygon, true),
        wkbMultiPolygon | wkbMultiPolygonM => (Shape::MultiPolygon, false),
        wkbMultiPolygon25D | wkbMultiPolygonZM => (Shape::MultiPolygon, true),
        wkbGeometryCollection | wkbGeometryCollectionM => (Shape::Collection, false),
        wkbGeometryCollection25D | wkbGeometryCollectionZM => (Shape::Collection, true),
        _ => (Shape::Other, false),
    }
}

fn ring(geometry: &Geometry, transform: Option<&CoordTransform>, z: bool) -> Result<Vec<SourceCoord>> {
    let mut points = Vec::new();
    geometry.get_points(&mut points);
    let mut xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let mut ys: Vec<f64> = points.iter().map(|p| p.1).collect();
    let mut zs: Vec<f64> = points.iter().map(|p| p.2).collect();
    if let Some(t) = transform {
        t.transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(crate::io::GdalError::from)?;
    }
    Ok(xs
        .into_iter()
        .zip(ys)
        .zip(zs)
        .map(|((x, y), zv)| if z { SourceCoord::xyz(x, y, zv) } else { SourceCoord::xy(x, y) })
        .collect())
}

fn polygon(
    geometry: &Geometry,
    transform: Option<&CoordTransform>,
    z: bool,
) -> Result<Vec<Vec<SourceCoord>>> {
    (0..geometry.geometry_count())
        .map(|i| ring(&geometry.get_geometry(i), transform, z))
        .collect()
}

/// Convert an OGR geometry to its source form, reprojecting vertices.
fn convert(geometry: &Geometry, transform: Option<&CoordTransform>) -> Result<SourceGeometry> {
    let (shape, z) = classify(geometry);
    Ok(match shape {
        Shape::Polygon => SourceGeometry::Polygon(polygon(geometry, transform, z)?),
        Shape::MultiPolygon => SourceGeometry::MultiPolygon(
            (0..geometry.geometry_count())
                .map(|i| polygon(&geometry.get_geometry(i), transform, z))
                .collect::<Result<_>>()?,
        ),
        Shape::Collection => SourceGeometry::Collection(
            (0..geometry.geometry_count())
                .map(|i| convert(&geometry.get_geometry(i), transform))
                .collect::<Result<_>>()?,
        ),
        Shape::Other => SourceGeometry::Other(geometry.geometry_name()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"Name": "Talhao 1"},
     "geometry": {"type": "Polygon", "coordinates": [[[-46.0, -17.0, 812.0], [-45.99, -17.0, 812.0], [-45.99, -17.01, 812.0], [-46.0, -17.01, 812.0], [-46.0, -17.0, 812.0]]]}},
    {"type": "Feature", "properties": {"Name": "Poco"},
     "geometry": {"type": "Point", "coordinates": [-45.995, -17.005]}},
    {"type": "Feature", "properties": {"Name": "Talhao 1"},
     "geometry": {"type": "Polygon", "coordinates": [[[-45.9, -17.0], [-45.89, -17.0], [-45.89, -17.01], [-45.9, -17.0]]]}},
    {"type": "Feature", "properties": {},
     "geometry": {"type": "MultiPolygon", "coordinates": [[[[-45.8, -17.0], [-45.79, -17.0], [-45.79, -17.01], [-45.8, -17.0]]]]}}
  ]
}"#;

    const KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
<Document>
  <Placemark>
    <name>Talhao A</name>
    <Polygon><outerBoundaryIs><LinearRing>
      <coordinates>-46.0,-17.0,0 -45.99,-17.0,0 -45.99,-17.01,0 -46.0,-17.0,0</coordinates>
    </LinearRing></outerBoundaryIs></Polygon>
  </Placemark>
  <Placemark>
    <name>Sede</name>
    <Point><coordinates>-45.995,-17.005,0</coordinates></Point>
  </Placemark>
</Document>
</kml>"#;

    #[test]
    fn extensions_map_to_formats() {
        assert_eq!(
            BoundaryFormat::from_path(Path::new("farm.GeoJSON")),
            Some(BoundaryFormat::GeoJson)
        );
        assert_eq!(BoundaryFormat::from_path(Path::new("a.kmz")), Some(BoundaryFormat::Kmz));
        assert_eq!(BoundaryFormat::from_path(Path::new("a.shp")), Some(BoundaryFormat::Shapefile));
        assert_eq!(BoundaryFormat::from_path(Path::new("a.gpkg")), Some(BoundaryFormat::GeoPackage));
        assert_eq!(BoundaryFormat::from_path(Path::new("a.csv")), None);
        assert_eq!(BoundaryFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn unknown_extension_is_format_error() {
        let err = normalize(Path::new("/tmp/area.dxf")).unwrap_err();
        assert!(matches!(err, Error::Format { ref file, .. } if file == "area.dxf"));
        let err = normalize_bytes("area.txt", b"hello").unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn geojson_is_flattened_filtered_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fazenda.geojson");
        std::fs::write(&path, GEOJSON).unwrap();

        let region = normalize(&path).unwrap();
        let names: Vec<&str> = region.features().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Talhao 1", "Area of interest"]);
        let first = &region.features()[0].geometry.0[0];
        assert_eq!(first.exterior().0.len(), 5);
        assert!((first.exterior().0[1].x + 45.99).abs() < 1e-9);
    }

    #[test]
    fn kmz_members_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talhoes.kmz");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("doc.kml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(KML.as_bytes()).unwrap();
        zip.finish().unwrap();

        let region = normalize(&path).unwrap();
        assert_eq!(region.len(), 1);
        assert_eq!(region.features()[0].name, "Talhao A");
    }

    #[test]
    fn every_kmz_member_is_unioned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fazenda.kmz");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("a.kml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(KML.as_bytes()).unwrap();
        zip.start_file("sub/b.kml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(KML.replace("Talhao A", "Talhao B").as_bytes())
            .unwrap();
        zip.finish().unwrap();

        let region = normalize(&path).unwrap();
        let names: Vec<&str> = region.features().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Talhao A", "Talhao B"]);
    }

    #[test]
    fn projected_input_comes_out_as_lon_lat() {
        let mercator = r#"{
  "type": "FeatureCollection",
  "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3857"}},
  "features": [
    {"type": "Feature", "properties": {"Name": "Talhao 1"},
     "geometry": {"type": "Polygon", "coordinates": [[[-5120696.5765, -1920825.0404], [-5119583.3816, -1920825.0404], [-5119583.3816, -1921989.1302], [-5120696.5765, -1921989.1302], [-5120696.5765, -1920825.0404]]]}}
  ]
}"#;
        let region = normalize_bytes("mercator.geojson", mercator.as_bytes()).unwrap();
        let ring = &region.features()[0].geometry.0[0].exterior().0;
        assert!((ring[0].x + 46.0).abs() < 1e-6, "x = {}", ring[0].x);
        assert!((ring[0].y + 17.0).abs() < 1e-6, "y = {}", ring[0].y);
        assert!((ring[2].x + 45.99).abs() < 1e-6);
        assert!((ring[2].y + 17.01).abs() < 1e-6);
    }

    #[test]
    fn uploaded_bytes_are_normalized() {
        let region = normalize_bytes("upload/fazenda.geojson", GEOJSON.as_bytes()).unwrap();
        assert_eq!(region.len(), 2);
    }

    #[test]
    fn corrupt_file_is_parse_error() {
        let err = normalize_bytes("broken.geojson", b"{ not json").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        let err = normalize_bytes("broken.kmz", b"PK not an archive").unwrap_err();
        assert!(matches!(err, Error::Parse { ref file, .. } if file == "broken.kmz"));
    }
}
