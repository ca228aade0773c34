//! Collection pipeline: catalog search, then per-scene masking and index computation.
//!
//! Building a [`CollectionPipeline`] only records the query. Nothing is read
//! until [`CollectionPipeline::execute`] is called, and scenes are loaded one at
//! a time as the returned iterator advances. Executing again re-issues the
//! whole chain against the catalog.
use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::core::catalog::{Catalog, CatalogQuery, SceneHandle};
use crate::core::processing::indices::compute_indices;
use crate::core::processing::mask::mask_clouds_and_shadows;
use crate::core::region::Region;
use crate::core::scene::Scene;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct CollectionPipeline {
    query: CatalogQuery,
    /// Restrict to these `YYYY-MM-DD` keys when set.
    dates: Option<BTreeSet<String>>,
    sort_by_date: bool,
}

impl CollectionPipeline {
    /// Fails with [`Error::NoData`] when the region holds no polygon.
    pub fn new(region: Region, start: NaiveDate, end: NaiveDate, cloud_max: f64) -> Result<Self> {
        if region.is_empty() {
            return Err(Error::NoData("region has no polygon to query".into()));
        }
        if start > end {
            warn!("Start date {} is after end date {}; no scene can match", start, end);
        }
        Ok(Self {
            query: CatalogQuery::new(region, start, end, cloud_max),
            dates: None,
            sort_by_date: false,
        })
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.query.collection = collection.into();
        self
    }

    /// Only process scenes acquired on one of `dates` (`YYYY-MM-DD`).
    pub fn with_dates<I, S>(mut self, dates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dates = Some(dates.into_iter().map(Into::into).collect());
        self
    }

    /// Emit scenes in ascending date order instead of catalog order.
    pub fn sorted_by_date(mut self) -> Self {
        self.sort_by_date = true;
        self
    }

    pub fn query(&self) -> &CatalogQuery {
        &self.query
    }

    pub fn region(&self) -> &Region {
        &self.query.region
    }

    /// Matching scene handles, metadata only.
    pub fn handles<C: Catalog + ?Sized>(&self, catalog: &C) -> Result<Vec<SceneHandle>> {
        let mut handles = catalog.search(&self.query)?;
        if let Some(dates) = &self.dates {
            handles.retain(|h| dates.contains(&h.metadata.date_key()));
        }
        if self.sort_by_date {
            handles.sort_by_key(|h| h.metadata.acquired);
        }
        debug!(
            "Query {} {}..{} cloud<{}: {} scenes",
            self.query.collection,
            self.query.start,
            self.query.end,
            self.query.cloud_max,
            handles.len()
        );
        Ok(handles)
    }

    /// Run the chain against `catalog`, yielding processed scenes lazily.
    pub fn execute<'a, C: Catalog + ?Sized>(&'a self, catalog: &'a C) -> Result<ProcessedScenes<'a, C>> {
        let handles = self.handles(catalog)?;
        info!("Processing {} scenes", handles.len());
        Ok(ProcessedScenes {
            catalog,
            region: &self.query.region,
            handles: handles.into_iter(),
        })
    }
}

/// Lazy sequence of masked scenes carrying index bands.
pub struct ProcessedScenes<'a, C: ?Sized> {
    catalog: &'a C,
    region: &'a Region,
    handles: std::vec::IntoIter<SceneHandle>,
}

impl<C: Catalog + ?Sized> ProcessedScenes<'_, C> {
    fn process(&self, handle: &SceneHandle) -> Result<Scene> {
        let raw = self.catalog.load(handle)?;
        let masked = mask_clouds_and_shadows(&raw, self.region)?;
        compute_indices(&masked)
    }
}

impl<C: Catalog + ?Sized> Iterator for ProcessedScenes<'_, C> {
    type Item = Result<Scene>;

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.handles.next()?;
        debug!("Loading scene {}", handle.metadata.id);
        Some(self.process(&handle))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.handles.size_hint()
    }
}

impl<C: Catalog + ?Sized> ExactSizeIterator for ProcessedScenes<'_, C> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::MemoryCatalog;
    use crate::core::region::{SourceCoord, flatten_polygon};
    use crate::core::scene::{GeoGrid, SceneMetadata};
    use crate::types::band;
    use chrono::{TimeZone, Utc};
    use geo::MultiPolygon;
    use ndarray::Array2;
    use std::cell::Cell;
    use std::collections::BTreeMap;

    fn region() -> Region {
        let ring = vec![
            SourceCoord::xy(0.0, 0.0),
            SourceCoord::xy(1.0, 0.0),
            SourceCoord::xy(1.0, 1.0),
            SourceCoord::xy(0.0, 1.0),
            SourceCoord::xy(0.0, 0.0),
        ];
        Region::from_named(vec![(None, MultiPolygon::new(vec![flatten_polygon(&[ring]).unwrap()]))])
    }

    fn raw_scene(id: &str, day: u32, cloud: f64) -> Scene {
        let full = |v: f64| Array2::from_elem((4, 4), v);
        let mut scene = Scene::new(
            SceneMetadata {
                id: id.into(),
                acquired: Utc.with_ymd_and_hms(2023, 5, day, 13, 0, 0).unwrap(),
                cloud_pct: cloud,
                properties: BTreeMap::new(),
            },
            GeoGrid::new(0.0, 1.0, 0.25, 4, 4),
        );
        for (name, dn) in [
            (band::BLUE, 500.0),
            (band::GREEN, 800.0),
            (band::RED, 1000.0),
            (band::RED_EDGE, 2000.0),
            (band::NIR, 5000.0),
            (band::SWIR1, 3000.0),
            (band::SWIR2, 2500.0),
        ] {
            scene.set_band(name, full(dn)).unwrap();
        }
        scene.set_band(band::CLOUD_PROBABILITY, full(0.0)).unwrap();
        scene.set_band(band::SNOW_PROBABILITY, full(0.0)).unwrap();
        scene.set_band(band::SCENE_CLASSIFICATION, full(4.0)).unwrap();
        scene
    }

    fn pipeline() -> CollectionPipeline {
        CollectionPipeline::new(
            region(),
            NaiveDate::from_ymd_opt(2023, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 5, 31).unwrap(),
            5.0,
        )
        .unwrap()
    }

    #[test]
    fn cloud_ceiling_keeps_only_clear_scene() {
        let catalog = MemoryCatalog::new(vec![
            raw_scene("a", 3, 2.0),
            raw_scene("b", 8, 8.0),
            raw_scene("c", 13, 20.0),
        ]);
        let scenes: Vec<Scene> = pipeline().execute(&catalog).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].metadata.id, "a");
        assert_eq!(scenes[0].date_key(), Some("2023-05-03"));
        assert!(scenes[0].has_band("ndvi"));
        assert!(!scenes[0].has_band(band::SCENE_CLASSIFICATION));
    }

    #[test]
    fn empty_catalog_gives_empty_sequence() {
        let catalog = MemoryCatalog::default();
        assert_eq!(pipeline().execute(&catalog).unwrap().count(), 0);
    }

    #[test]
    fn empty_region_is_no_data() {
        let err = CollectionPipeline::new(
            Region::from_named(vec![]),
            NaiveDate::from_ymd_opt(2023, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 5, 31).unwrap(),
            5.0,
        )
        .unwrap_err();
        assert!(matches!(err, Error::NoData(_)));
    }

    struct CountingCatalog {
        inner: MemoryCatalog,
        searches: Cell<usize>,
        loads: Cell<usize>,
    }

    impl Catalog for CountingCatalog {
        fn search(&self, query: &CatalogQuery) -> Result<Vec<SceneHandle>> {
            self.searches.set(self.searches.get() + 1);
            self.inner.search(query)
        }

        fn load(&self, handle: &SceneHandle) -> Result<Scene> {
            self.loads.set(self.loads.get() + 1);
            self.inner.load(handle)
        }
    }

    #[test]
    fn loading_is_lazy_and_restartable() {
        let catalog = CountingCatalog {
            inner: MemoryCatalog::new(vec![raw_scene("a", 3, 1.0), raw_scene("b", 4, 1.0)]),
            searches: Cell::new(0),
            loads: Cell::new(0),
        };
        let p = pipeline();
        let mut scenes = p.execute(&catalog).unwrap();
        assert_eq!(catalog.loads.get(), 0);
        assert!(scenes.next().is_some());
        assert_eq!(catalog.loads.get(), 1);

        assert_eq!(p.execute(&catalog).unwrap().count(), 2);
        assert_eq!(catalog.searches.get(), 2);
    }

    #[test]
    fn date_selection_and_sorting() {
        let catalog = MemoryCatalog::new(vec![
            raw_scene("late", 20, 1.0),
            raw_scene("early", 2, 1.0),
            raw_scene("skipped", 9, 1.0),
        ]);
        let p = pipeline().with_dates(["2023-05-20", "2023-05-02"]).sorted_by_date();
        let ids: Vec<String> = p
            .handles(&catalog)
            .unwrap()
            .into_iter()
            .map(|h| h.metadata.id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }
}
