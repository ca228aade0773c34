//! Imagery catalog seam: a declarative query plan and the backends that run it.
use chrono::NaiveDate;
use geo::Polygon;
use serde::{Deserialize, Serialize};

use crate::core::region::Region;
use crate::core::scene::{Scene, SceneMetadata};
use crate::error::{Error, Result};

/// Sentinel-2 surface reflectance collection queried by default.
pub const DEFAULT_COLLECTION: &str = "COPERNICUS/S2_SR_HARMONIZED";

/// Scene as listed by a catalog search. Pixels are not loaded yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneHandle {
    pub metadata: SceneMetadata,
    /// Scene footprint in EPSG:4326.
    #[serde(skip)]
    pub footprint: Option<Polygon<f64>>,
}

/// Filter of a catalog search: region, inclusive date range and cloud ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub collection: String,
    pub region: Region,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Scenes must be strictly below this cloudy pixel percentage.
    pub cloud_max: f64,
}

impl CatalogQuery {
    pub fn new(region: Region, start: NaiveDate, end: NaiveDate, cloud_max: f64) -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            region,
            start,
            end,
            cloud_max,
        }
    }

    /// Whether a listed scene passes every filter of this query.
    ///
    /// Scenes without a known footprint are assumed to intersect.
    pub fn matches(&self, handle: &SceneHandle) -> bool {
        let date = handle.metadata.date();
        let in_range = date >= self.start && date <= self.end;
        let clear = handle.metadata.cloud_pct < self.cloud_max;
        let overlaps = handle
            .footprint
            .as_ref()
            .is_none_or(|fp| self.region.intersects(fp));
        in_range && clear && overlaps
    }
}

/// A source of Sentinel-2 scenes.
///
/// `search` lists metadata only; pixels are fetched per scene by `load`, so
/// callers decide how much of a search result is ever materialized.
pub trait Catalog {
    fn search(&self, query: &CatalogQuery) -> Result<Vec<SceneHandle>>;

    fn load(&self, handle: &SceneHandle) -> Result<Scene>;
}

/// Catalog over scenes held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    scenes: Vec<Scene>,
}

impl MemoryCatalog {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    pub fn push(&mut self, scene: Scene) {
        self.scenes.push(scene);
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl Catalog for MemoryCatalog {
    fn search(&self, query: &CatalogQuery) -> Result<Vec<SceneHandle>> {
        Ok(self
            .scenes
            .iter()
            .map(|s| SceneHandle {
                metadata: s.metadata.clone(),
                footprint: Some(s.grid.footprint()),
            })
            .filter(|h| query.matches(h))
            .collect())
    }

    fn load(&self, handle: &SceneHandle) -> Result<Scene> {
        self.scenes
            .iter()
            .find(|s| s.metadata.id == handle.metadata.id)
            .cloned()
            .ok_or_else(|| Error::Catalog(format!("scene {} not in catalog", handle.metadata.id)))
    }
}
