use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use s2monitor::{
    AnalysisParams, DirectoryCatalog, ExportParams, GeoTiffExportService, LocalReducer, Region,
    SpectralIndex, StatsParams, api,
};

use super::args::{CliArgs, Command, QueryArgs, TableFormat};
use super::errors::AppError;

fn open_output(output: Option<&Path>) -> Result<Box<dyn Write>, AppError> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    })
}

fn write_rows<T: Serialize>(rows: &[T], format: TableFormat, output: Option<&Path>) -> Result<(), AppError> {
    let mut out = open_output(output)?;
    match format {
        TableFormat::Csv => {
            let mut w = csv::Writer::from_writer(out);
            for row in rows {
                w.serialize(row)?;
            }
            w.flush()?;
        }
        TableFormat::Json => {
            serde_json::to_writer_pretty(&mut out, rows)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Parameters file (or defaults) with command-line overrides applied.
fn analysis_params(query: &QueryArgs, dates: &[String]) -> Result<AnalysisParams, AppError> {
    let mut params = match &query.params {
        Some(path) => AnalysisParams::from_json_file(path)?,
        None => AnalysisParams::default(),
    };
    if let Some(start) = query.start {
        params.start = start;
    }
    if let Some(end) = query.end {
        params.end = Some(end);
    }
    if let Some(cloud_max) = query.cloud_max {
        params.cloud_max = cloud_max;
    }
    if !dates.is_empty() {
        params.dates = dates.to_vec();
    }
    params.validate()?;
    Ok(params)
}

fn open_query(
    query: &QueryArgs,
    dates: &[String],
) -> Result<(Region, DirectoryCatalog, AnalysisParams), AppError> {
    let region = api::load_region(&query.region)?;
    let catalog = DirectoryCatalog::open(&query.scenes)?;
    let params = analysis_params(query, dates)?;
    info!(
        "Region {:?}: {} features; scenes {:?}; {}..{} cloud < {}",
        query.region,
        region.len(),
        query.scenes,
        params.start,
        params.end_or_today(),
        params.cloud_max
    );
    Ok((region, catalog, params))
}

fn run_series(
    query: &QueryArgs,
    indices: &[SpectralIndex],
    zonal_scale: Option<f64>,
    heatmap: Option<SpectralIndex>,
    format: TableFormat,
    output: Option<&Path>,
) -> Result<(), AppError> {
    let (region, catalog, mut params) = open_query(query, &[])?;
    if !indices.is_empty() {
        params.indices = indices.to_vec();
    }
    let mut stats = StatsParams::default();
    if let Some(scale) = zonal_scale {
        if scale <= 0.0 {
            return Err(AppError::InvalidScale { scale });
        }
        stats.scale = scale;
    }
    let table = api::analyze_with(&catalog, &region, &params, &stats, &LocalReducer)?;
    info!("Time series has {} rows", table.len());

    if let Some(index) = heatmap {
        let cells = api::heatmap(&table, index)?;
        return write_rows(&cells, format, output);
    }

    match format {
        TableFormat::Csv => table.write_csv(open_output(output)?)?,
        TableFormat::Json => {
            let mut out = open_output(output)?;
            serde_json::to_writer_pretty(&mut out, &table)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn run_export(
    query: &QueryArgs,
    dates: &[String],
    output_dir: &Path,
    scale: Option<f64>,
    target_crs: Option<&str>,
) -> Result<(), AppError> {
    let (region, catalog, params) = open_query(query, dates)?;
    let mut export = ExportParams::default();
    if let Some(scale) = scale {
        if scale <= 0.0 {
            return Err(AppError::InvalidScale { scale });
        }
        export.scale = scale;
    }
    if let Some(crs) = target_crs {
        export.crs = crs.to_string();
    }
    let service =
        GeoTiffExportService::new(output_dir)?.with_max_request_bytes(export.max_request_bytes);

    let reports = api::export_dates(&catalog, &region, &params, &service, &export)?;
    let mut errors = 0;
    for report in &reports {
        for url in report.urls() {
            println!("{}\t{}", report.date, url);
        }
        for failure in report.failures() {
            warn!("{}", failure);
            errors += 1;
        }
    }
    info!("Export complete!");
    info!("Dates: {}", reports.len());
    info!("Errors: {}", errors);
    Ok(())
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.log {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match args.command {
        Command::Region { input, output } => {
            let region = api::load_region(&input)?;
            let mut out = open_output(output.as_deref())?;
            serde_json::to_writer_pretty(&mut out, &region.to_geojson())?;
            writeln!(out)?;
            info!("Normalized {:?}: {} features", input, region.len());
        }
        Command::Scenes {
            query,
            format,
            output,
        } => {
            let (region, catalog, params) = open_query(&query, &[])?;
            let rows = api::scene_table(&catalog, &region, &params)?;
            info!("{} scenes match", rows.len());
            write_rows(&rows, format, output.as_deref())?;
        }
        Command::Dates { query } => {
            let (region, catalog, params) = open_query(&query, &[])?;
            let dates = api::available_dates(&catalog, &region, &params)?;
            for date in &dates {
                println!("{}", date);
            }
            info!("{} dates available", dates.len());
        }
        Command::Series {
            query,
            indices,
            zonal_scale,
            heatmap,
            format,
            output,
        } => run_series(&query, &indices, zonal_scale, heatmap, format, output.as_deref())?,
        Command::Export {
            query,
            output_dir,
            dates,
            scale,
            target_crs,
        } => run_export(&query, &dates, &output_dir, scale, target_crs.as_deref())?,
        Command::Preview {
            query,
            layer,
            output_dir,
            dates,
        } => {
            let (region, catalog, params) = open_query(&query, &dates)?;
            let paths = api::preview_dates(&catalog, &region, &params, layer, &output_dir)?;
            for path in &paths {
                println!("{}", path.display());
            }
            info!("Rendered {} previews", paths.len());
        }
    }

    Ok(())
}
