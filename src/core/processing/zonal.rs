//! Zonal statistics: per-feature index means for every processed scene.
//!
//! The reducer is a seam: a remote engine answers with generic column names
//! (`mean` for one band, `mean_1`, `mean_2`, ... for several), the in-process
//! [`LocalReducer`] answers the same way, and [`ColumnMapping`] turns either
//! reply into index-named values.
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::processing::mask::rasterize;
use crate::core::processing::ops::masked_mean;
use crate::core::region::Region;
use crate::core::scene::Scene;
use crate::error::{Error, Result};
use crate::types::SpectralIndex;

/// Reduction scale in metres for zonal means.
pub const ZONAL_SCALE_M: f64 = 10.0;

/// Name of the date column in index tables.
pub const DATE_COLUMN: &str = "data";
/// Name of the feature column in index tables.
pub const FEATURE_COLUMN: &str = "Name";

/// One zonal mean call over a scene and the region.
#[derive(Debug, Clone, Copy)]
pub struct ReduceRequest<'a> {
    pub scene: &'a Scene,
    pub region: &'a Region,
    pub bands: &'a [SpectralIndex],
    pub scale: f64,
}

/// Reply for one region feature: engine column name to value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ZonalRecord {
    pub feature: String,
    pub columns: BTreeMap<String, Option<f64>>,
}

pub trait ZonalReducer {
    /// Mean of each requested band over each region feature, one record per feature.
    fn reduce_mean(&self, request: &ReduceRequest<'_>) -> Result<Vec<ZonalRecord>>;
}

/// Positional mapping between engine result columns and selected indices.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    indices: Vec<SpectralIndex>,
}

impl ColumnMapping {
    pub fn new(indices: &[SpectralIndex]) -> Self {
        Self {
            indices: indices.to_vec(),
        }
    }

    /// Engine column carrying the mean of `indices[position]`.
    pub fn engine_column(&self, position: usize) -> String {
        if self.indices.len() == 1 {
            "mean".to_string()
        } else {
            format!("mean_{}", position + 1)
        }
    }

    /// Pairs of (engine column, index), in selection order.
    pub fn columns(&self) -> Vec<(String, SpectralIndex)> {
        self.indices
            .iter()
            .enumerate()
            .map(|(i, &idx)| (self.engine_column(i), idx))
            .collect()
    }

    /// Index-ordered values of one record.
    ///
    /// A band-named column (`ndvi`) is accepted in place of the engine column.
    /// Absent and undefined values are `None`.
    pub fn resolve(&self, record: &ZonalRecord) -> Vec<Option<f64>> {
        self.columns()
            .into_iter()
            .map(|(engine, idx)| {
                record
                    .columns
                    .get(&engine)
                    .or_else(|| record.columns.get(idx.name()))
                    .copied()
                    .flatten()
                    .filter(|v| v.is_finite())
            })
            .collect()
    }
}

/// One table row: a date, a region feature and one value per selected index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    pub date: String,
    pub feature: String,
    pub values: Vec<Option<f64>>,
}

/// Time series of index means keyed by date and feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexTable {
    pub indices: Vec<SpectralIndex>,
    pub rows: Vec<IndexRow>,
}

impl IndexTable {
    pub fn empty(indices: &[SpectralIndex]) -> Self {
        Self {
            indices: indices.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec![DATE_COLUMN.to_string(), FEATURE_COLUMN.to_string()];
        headers.extend(self.indices.iter().map(|i| i.name().to_string()));
        headers
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Value column of `index`, if selected.
    pub fn position(&self, index: SpectralIndex) -> Option<usize> {
        self.indices.iter().position(|&i| i == index)
    }

    /// `(date, value)` pairs of one index, missing values dropped.
    pub fn series(&self, index: SpectralIndex) -> Vec<(&str, f64)> {
        let Some(pos) = self.position(index) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|r| r.values[pos].map(|v| (r.date.as_str(), v)))
            .collect()
    }

    /// Write as CSV with headers; missing cells are empty.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        w.write_record(self.headers())?;
        for row in &self.rows {
            let mut record = vec![row.date.clone(), row.feature.clone()];
            record.extend(row.values.iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
            w.write_record(&record)?;
        }
        w.flush()?;
        Ok(())
    }
}

/// Reduce every scene and collect one row per (date, feature).
///
/// Scenes sharing a date fill each other's gaps; the first defined value wins.
/// Rows come out sorted by date, features in region order.
pub fn aggregate<I, R>(scenes: I, region: &Region, indices: &[SpectralIndex], reducer: &R) -> Result<IndexTable>
where
    I: IntoIterator<Item = Result<Scene>>,
    R: ZonalReducer + ?Sized,
{
    aggregate_at(scenes, region, indices, reducer, ZONAL_SCALE_M)
}

/// [`aggregate`] with an explicit reduction scale in metres.
pub fn aggregate_at<I, R>(
    scenes: I,
    region: &Region,
    indices: &[SpectralIndex],
    reducer: &R,
    scale: f64,
) -> Result<IndexTable>
where
    I: IntoIterator<Item = Result<Scene>>,
    R: ZonalReducer + ?Sized,
{
    if indices.is_empty() {
        return Err(Error::InvalidArgument {
            arg: "indices",
            value: "none selected".into(),
        });
    }
    let mapping = ColumnMapping::new(indices);
    let mut table = IndexTable::empty(indices);
    let mut slots: HashMap<(String, String), usize> = HashMap::new();

    for scene in scenes {
        let scene = scene?;
        let date = scene
            .date_key()
            .map(str::to_string)
            .unwrap_or_else(|| scene.metadata.date_key());
        let records = reducer.reduce_mean(&ReduceRequest {
            scene: &scene,
            region,
            bands: indices,
            scale,
        })?;
        for record in records {
            let values = mapping.resolve(&record);
            match slots.get(&(date.clone(), record.feature.clone())) {
                Some(&row) => {
                    debug!("Merging second scene for {} / {}", date, record.feature);
                    for (cell, v) in table.rows[row].values.iter_mut().zip(values) {
                        if cell.is_none() {
                            *cell = v;
                        }
                    }
                }
                None => {
                    slots.insert((date.clone(), record.feature.clone()), table.rows.len());
                    table.rows.push(IndexRow {
                        date: date.clone(),
                        feature: record.feature,
                        values,
                    });
                }
            }
        }
    }

    table.rows.sort_by(|a, b| a.date.cmp(&b.date));
    info!("Aggregated {} rows for {:?}", table.rows.len(), indices);
    Ok(table)
}

/// In-process reducer averaging defined pixels whose centre lies in each feature.
///
/// Works at the scene's native resolution and answers with engine-style columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalReducer;

impl ZonalReducer for LocalReducer {
    fn reduce_mean(&self, request: &ReduceRequest<'_>) -> Result<Vec<ZonalRecord>> {
        let mapping = ColumnMapping::new(request.bands);
        let (px, py) = request.scene.grid.pixel_size_m();
        if (px.max(py) / request.scale - 1.0).abs() > 0.5 {
            debug!(
                "Reducing at native {:.1}x{:.1} m instead of {} m",
                px, py, request.scale
            );
        }
        let mut out = Vec::with_capacity(request.region.len());
        for feature in request.region.features() {
            let inside = rasterize(&request.scene.grid, &feature.geometry);
            let mut record = ZonalRecord {
                feature: feature.name.clone(),
                columns: BTreeMap::new(),
            };
            for (column, index) in mapping.columns() {
                let band = request.scene.band(index.name())?;
                record.columns.insert(column, masked_mean(band, &inside));
            }
            out.push(record);
        }
        Ok(out)
    }
}
