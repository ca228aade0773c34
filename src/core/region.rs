//! Region of interest: named 2D polygonal features in EPSG:4326.
//!
//! Boundary readers produce [`SourceFeature`]s that may still carry elevation
//! and arbitrary geometry kinds; [`Region::from_sources`] flattens them to 2D,
//! defaults missing names and drops repeated names (first occurrence wins).
use std::collections::HashSet;

use geo::{BoundingRect, Contains, Coord, Intersects, LineString, MultiPolygon, Point, Polygon, Rect};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Name given to features without a usable name attribute.
pub const DEFAULT_FEATURE_NAME: &str = "Area of interest";

/// Reference system of every normalized region.
pub const REGION_CRS: &str = "EPSG:4326";

/// Vertex as read from a boundary file; `z` is `None` for 2D sources.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceCoord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl SourceCoord {
    pub fn xy(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }
}

/// Geometry as read from a boundary file, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceGeometry {
    /// Exterior ring first, then holes.
    Polygon(Vec<Vec<SourceCoord>>),
    MultiPolygon(Vec<Vec<Vec<SourceCoord>>>),
    Collection(Vec<SourceGeometry>),
    /// Any non-areal geometry, by type name (`Point`, `LineString`, ...).
    Other(String),
}

/// One feature of a boundary file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFeature {
    pub name: Option<String>,
    pub geometry: SourceGeometry,
    /// Where the feature came from (`file` or `file:layer`), for diagnostics.
    pub origin: String,
}

fn flatten_ring(ring: &[SourceCoord]) -> LineString<f64> {
    LineString::new(ring.iter().map(|c| Coord { x: c.x, y: c.y }).collect())
}

/// Drop elevation from every vertex, keeping ring count, vertex order and winding.
pub fn flatten_polygon(rings: &[Vec<SourceCoord>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    Some(Polygon::new(
        flatten_ring(exterior),
        interiors.iter().map(|r| flatten_ring(r)).collect(),
    ))
}

/// Flatten the polygonal content of a geometry to a 2D multipolygon.
///
/// Non-areal parts are left out; `None` when nothing polygonal remains.
pub fn flatten(geometry: &SourceGeometry) -> Option<MultiPolygon<f64>> {
    let mut polygons = Vec::new();
    collect_polygons(geometry, &mut polygons);
    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon::new(polygons))
    }
}

fn collect_polygons(geometry: &SourceGeometry, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        SourceGeometry::Polygon(rings) => out.extend(flatten_polygon(rings)),
        SourceGeometry::MultiPolygon(parts) => {
            out.extend(parts.iter().filter_map(|rings| flatten_polygon(rings)))
        }
        SourceGeometry::Collection(members) => {
            for member in members {
                collect_polygons(member, out);
            }
        }
        SourceGeometry::Other(_) => {}
    }
}

/// A named polygonal feature of the region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFeature {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// Normalized region of interest. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    features: Vec<RegionFeature>,
}

impl Region {
    /// Build a region from raw boundary features.
    ///
    /// Non-polygonal features are excluded with a warning. Fails with
    /// [`Error::Format`] when no polygonal feature is left.
    pub fn from_sources(file: &str, sources: Vec<SourceFeature>) -> Result<Self> {
        let mut named = Vec::with_capacity(sources.len());
        for source in sources {
            match flatten(&source.geometry) {
                Some(geometry) => named.push((source.name, geometry)),
                None => warn!(
                    "Skipping non-polygonal feature {:?} from {} ({:?})",
                    source.name.as_deref().unwrap_or(DEFAULT_FEATURE_NAME),
                    source.origin,
                    source.geometry_kind()
                ),
            }
        }
        if named.is_empty() {
            return Err(Error::format(file, "no readable polygon geometries"));
        }
        Ok(Self::from_named(named))
    }

    /// Default missing names, then keep only the first feature of each name.
    pub fn from_named(features: Vec<(Option<String>, MultiPolygon<f64>)>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(features.len());
        for (name, geometry) in features {
            let name = name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_FEATURE_NAME.to_string());
            if seen.insert(name.clone()) {
                kept.push(RegionFeature { name, geometry });
            } else {
                debug!("Dropping duplicate feature name {:?}", name);
            }
        }
        Region { features: kept }
    }

    pub fn features(&self) -> &[RegionFeature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.iter().all(|f| f.geometry.0.is_empty())
    }

    /// Union of all feature polygons.
    pub fn geometry(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(
            self.features
                .iter()
                .flat_map(|f| f.geometry.0.iter().cloned())
                .collect(),
        )
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.geometry().bounding_rect()
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let p = Point::new(x, y);
        self.features.iter().any(|f| f.geometry.contains(&p))
    }

    pub fn intersects(&self, footprint: &Polygon<f64>) -> bool {
        self.features.iter().any(|f| f.geometry.intersects(footprint))
    }

    /// GeoJSON FeatureCollection with a `Name` property per feature.
    pub fn to_geojson(&self) -> Value {
        let features: Vec<Value> = self
            .features
            .iter()
            .map(|f| {
                json!({
                    "type": "Feature",
                    "properties": { "Name": f.name },
                    "geometry": multipolygon_to_geojson(&f.geometry),
                })
            })
            .collect();
        json!({ "type": "FeatureCollection", "features": features })
    }
}

impl SourceFeature {
    fn geometry_kind(&self) -> &str {
        match &self.geometry {
            SourceGeometry::Polygon(_) => "Polygon",
            SourceGeometry::MultiPolygon(_) => "MultiPolygon",
            SourceGeometry::Collection(_) => "GeometryCollection",
            SourceGeometry::Other(kind) => kind,
        }
    }
}

fn ring_to_geojson(ring: &LineString<f64>) -> Value {
    Value::Array(ring.coords().map(|c| json!([c.x, c.y])).collect())
}

fn polygon_rings(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![ring_to_geojson(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_to_geojson));
    Value::Array(rings)
}

pub fn multipolygon_to_geojson(mp: &MultiPolygon<f64>) -> Value {
    json!({
        "type": "MultiPolygon",
        "coordinates": mp.0.iter().map(polygon_rings).collect::<Vec<_>>(),
    })
}
