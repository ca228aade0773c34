//! High-level library API: normalize a boundary file, list matching scenes,
//! build the index time series, export selected dates as GeoTIFFs and render
//! JPEG quicklooks. Prefer these entrypoints over the `core` modules when
//! integrating s2monitor; they take any [`Catalog`], [`ZonalReducer`] and
//! [`DownloadService`], so the same calls run against local directories or a
//! remote imagery engine.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::catalog::Catalog;
use crate::core::export::{DownloadService, ExportReport, TiledExporter};
use crate::core::params::{AnalysisParams, ExportParams, StatsParams};
use crate::core::processing::pipeline::CollectionPipeline;
use crate::core::processing::series::{
    self, HeatmapCell, SceneSummary, latest_date, monthly_heatmap, scene_summaries,
};
use crate::core::processing::zonal::{IndexTable, ZonalReducer, aggregate_at};
use crate::core::region::{REGION_CRS, Region};
use crate::core::scene::Scene;
use crate::core::visualization::{Layer, render_layer};
use crate::error::{Error, Result};
use crate::io::vector;
use crate::io::writers::jpeg::write_rgb_jpeg;
use crate::io::writers::metadata::write_metadata_sidecar;
use crate::types::SpectralIndex;

/// Read a boundary file (GeoJSON, KML, KMZ, Shapefile or GeoPackage) into a region.
pub fn load_region(path: &Path) -> Result<Region> {
    vector::normalize(path)
}

/// Read an uploaded boundary file held in memory; `file_name` selects the format.
pub fn load_region_bytes(file_name: &str, bytes: &[u8]) -> Result<Region> {
    vector::normalize_bytes(file_name, bytes)
}

/// Collection pipeline over `region` configured from analysis parameters.
///
/// The selected `dates` are not applied here: the scene table and the time
/// series always cover the whole period.
pub fn pipeline(region: &Region, params: &AnalysisParams) -> Result<CollectionPipeline> {
    params.validate()?;
    Ok(CollectionPipeline::new(
        region.clone(),
        params.start,
        params.end_or_today(),
        params.cloud_max,
    )?
    .with_collection(params.collection.clone())
    .sorted_by_date())
}

/// Date, cloud cover and id of every matching scene. Pixels are not read.
pub fn scene_table<C: Catalog + ?Sized>(
    catalog: &C,
    region: &Region,
    params: &AnalysisParams,
) -> Result<Vec<SceneSummary>> {
    let handles = pipeline(region, params)?.handles(catalog)?;
    Ok(scene_summaries(&handles))
}

/// Distinct acquisition dates of the matching scenes, oldest first. These are
/// the values accepted in `AnalysisParams::dates`.
pub fn available_dates<C: Catalog + ?Sized>(
    catalog: &C,
    region: &Region,
    params: &AnalysisParams,
) -> Result<Vec<String>> {
    let handles = pipeline(region, params)?.handles(catalog)?;
    Ok(series::available_dates(&handles))
}

/// Time series of the selected index means per date and region feature.
///
/// With no matching scene the table is empty but keeps its headers.
pub fn analyze<C, R>(catalog: &C, region: &Region, params: &AnalysisParams, reducer: &R) -> Result<IndexTable>
where
    C: Catalog + ?Sized,
    R: ZonalReducer + ?Sized,
{
    analyze_with(catalog, region, params, &StatsParams::default(), reducer)
}

/// [`analyze`] with explicit zonal statistics parameters.
pub fn analyze_with<C, R>(
    catalog: &C,
    region: &Region,
    params: &AnalysisParams,
    stats: &StatsParams,
    reducer: &R,
) -> Result<IndexTable>
where
    C: Catalog + ?Sized,
    R: ZonalReducer + ?Sized,
{
    if stats.scale <= 0.0 {
        return Err(Error::InvalidArgument {
            arg: "scale",
            value: stats.scale.to_string(),
        });
    }
    let pipeline = pipeline(region, params)?;
    let scenes = pipeline.execute(catalog)?;
    if scenes.len() == 0 {
        warn!("No scene matches {}..{}", params.start, params.end_or_today());
    }
    aggregate_at(scenes, pipeline.region(), &params.indices, reducer, stats.scale)
}

/// Mean of one index per (year, month); the index must be part of the table.
pub fn heatmap(table: &IndexTable, index: SpectralIndex) -> Result<Vec<HeatmapCell>> {
    if table.position(index).is_none() {
        return Err(Error::InvalidArgument {
            arg: "index",
            value: index.to_string(),
        });
    }
    Ok(monthly_heatmap(table, index))
}

/// Dates to work on: the selected ones, or the most recent scene's date when none is selected.
pub fn target_dates<C: Catalog + ?Sized>(
    catalog: &C,
    region: &Region,
    params: &AnalysisParams,
) -> Result<Vec<String>> {
    if !params.dates.is_empty() {
        return Ok(params.dates.clone());
    }
    let handles = pipeline(region, params)?.handles(catalog)?;
    Ok(latest_date(&handles).into_iter().collect())
}

/// Processed scenes for the target dates, one per date, oldest first.
///
/// When several scenes share a date the first one in acquisition order is kept.
/// A selected date without any matching scene is `Error::NoData`.
fn scenes_for_dates<C: Catalog + ?Sized>(
    catalog: &C,
    region: &Region,
    params: &AnalysisParams,
) -> Result<Vec<(String, Scene)>> {
    let dates = target_dates(catalog, region, params)?;
    if dates.is_empty() {
        warn!("No scene available for the selected period");
        return Ok(Vec::new());
    }
    let pipeline = pipeline(region, params)?.with_dates(dates.iter().cloned());
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for scene in pipeline.execute(catalog)? {
        let scene = scene?;
        let date = scene
            .date_key()
            .map(str::to_string)
            .unwrap_or_else(|| scene.metadata.date_key());
        if !seen.insert(date.clone()) {
            debug!("Skipping {}: {} already has a scene", scene.metadata.id, date);
            continue;
        }
        out.push((date, scene));
    }
    if let Some(missing) = dates.iter().find(|d| !seen.contains(*d)) {
        return Err(Error::NoData(format!("no scene on {missing}")));
    }
    Ok(out)
}

/// Export every target date over `region`, one report per date.
///
/// Each date is attempted as a single request first and falls back to the
/// tile grid when the service reports the size ceiling. Per-unit failures are
/// kept in the reports.
pub fn export_dates<C, S>(
    catalog: &C,
    region: &Region,
    params: &AnalysisParams,
    service: &S,
    export: &ExportParams,
) -> Result<Vec<ExportReport>>
where
    C: Catalog + ?Sized,
    S: DownloadService + ?Sized,
{
    let exporter = TiledExporter::new(service, export.clone());
    let mut reports = Vec::new();
    for (date, scene) in scenes_for_dates(catalog, region, params)? {
        let report = exporter.export(&scene, &date, region)?;
        if !report.is_complete() {
            warn!(
                "{}: {} of {} units failed",
                date,
                report.failures().len(),
                report.units.len()
            );
        }
        reports.push(report);
    }
    info!("Exported {} dates", reports.len());
    Ok(reports)
}

/// Render one layer of a processed scene as a JPEG with a JSON metadata sidecar.
pub fn render_preview(scene: &Scene, layer: Layer, output: &Path) -> Result<PathBuf> {
    let rgb = render_layer(scene, layer)?;
    write_rgb_jpeg(output, scene.grid.cols, scene.grid.rows, &rgb)?;
    write_metadata_sidecar(
        output,
        &scene.metadata,
        Some(scene.grid.geotransform),
        Some(REGION_CRS),
    )?;
    info!("Rendered {} preview {:?}", layer.name(), output);
    Ok(output.to_path_buf())
}

/// Quicklooks of `layer` for every target date, written as `<layer>_<date>.jpg` in `out_dir`.
pub fn preview_dates<C: Catalog + ?Sized>(
    catalog: &C,
    region: &Region,
    params: &AnalysisParams,
    layer: Layer,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;
    scenes_for_dates(catalog, region, params)?
        .iter()
        .map(|(date, scene)| {
            render_preview(scene, layer, &out_dir.join(format!("{}_{}.jpg", layer.name(), date)))
        })
        .collect()
}
