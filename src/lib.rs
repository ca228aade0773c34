#![doc = r#"
s2monitor: cloud-masked Sentinel-2 spectral index monitoring for a region of interest.

This crate turns a boundary file (GeoJSON, KML, KMZ, Shapefile or GeoPackage) into a
normalized region, queries a Sentinel-2 scene catalog over a date range with a cloud
ceiling, masks clouds, shadows and snow, computes NDVI, NDRE, EVI, NDWI, NDMI and
SAVI, and reduces them to a per-date, per-feature time series. Selected dates can be
exported as GeoTIFFs, falling back to a 5×6 tile grid when a single request is too
large for the export service.

Stability
---------
The public library API is experimental in initial releases and may evolve as the
crate stabilizes. Breaking changes can occur.

Requirements
------------
- GDAL development headers and runtime available on your system.
- `gdalwarp` on `PATH` when exporting to a CRS other than EPSG:4326.
- Rust 2024 edition toolchain.

Quick start: index time series
------------------------------
```rust,no_run
use std::path::Path;
use s2monitor::{AnalysisParams, DirectoryCatalog, LocalReducer, analyze, load_region};

fn main() -> s2monitor::Result<()> {
    let region = load_region(Path::new("/data/farm.kmz"))?;
    let catalog = DirectoryCatalog::open("/data/scenes")?;
    let params = AnalysisParams::default(); // 2023-01-01..today, cloud < 5 %, NDVI + EVI

    let table = analyze(&catalog, &region, &params, &LocalReducer)?;
    table.write_csv(std::io::stdout())?;
    Ok(())
}
```

Export the latest scene
-----------------------
```rust,no_run
use std::path::Path;
use s2monitor::{
    AnalysisParams, DirectoryCatalog, ExportParams, GeoTiffExportService, export_dates, load_region,
};

fn main() -> s2monitor::Result<()> {
    let region = load_region(Path::new("/data/farm.geojson"))?;
    let catalog = DirectoryCatalog::open("/data/scenes")?;
    let service = GeoTiffExportService::new("/out")?;

    // No date selected: the most recent matching scene is exported.
    for report in export_dates(&catalog, &region, &AnalysisParams::default(), &service, &ExportParams::default())? {
        for url in report.urls() {
            println!("{} {}", report.date, url);
        }
        for failure in report.failures() {
            eprintln!("{failure}");
        }
    }
    Ok(())
}
```

Bring your own engine
---------------------
The pipeline only talks to three traits: [`Catalog`] (scene search and loading),
[`ZonalReducer`] (per-feature mean) and [`DownloadService`] (download URL for one
request). `MemoryCatalog`, `DirectoryCatalog`, `LocalReducer` and
`GeoTiffExportService` are the bundled implementations.

Error handling
--------------
All public functions return `s2monitor::Result<T>`; match on `s2monitor::Error` to
handle specific cases.

```rust,no_run
use std::path::Path;
use s2monitor::{Error, load_region};

fn main() {
    match load_region(Path::new("/data/area.dxf")) {
        Ok(region) => println!("{} features", region.len()),
        Err(Error::Format { file, reason }) => eprintln!("{file}: {reason}"),
        Err(Error::Parse { file, reason }) => eprintln!("corrupt {file}: {reason}"),
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`]: high-level entry points.
- [`core`]: region, catalog, masking, indices, zonal statistics and tiled export.
- [`types`]: spectral index registry and band names.
- [`io`]: OGR boundary reading, GDAL scene rasters, catalog and export backends, writers.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use core::catalog::{Catalog, CatalogQuery, MemoryCatalog, SceneHandle};
pub use core::export::{DownloadOutcome, DownloadRequest, DownloadService, ExportReport};
pub use core::params::{AnalysisParams, ExportParams, StatsParams};
pub use core::processing::{IndexTable, LocalReducer, ZonalReducer};
pub use core::region::{Region, RegionFeature};
pub use core::scene::{GeoGrid, Scene, SceneMetadata};
pub use core::visualization::Layer;
pub use error::{Error, Result};
pub use types::{ExportFormat, SpectralIndex};

// Readers and backends
pub use io::{DirectoryCatalog, GdalError, GdalMetadata, GdalSceneReader, GeoTiffExportService};

// Selected writer helpers
pub use io::writers::metadata::{embed_tiff_metadata, extract_metadata_fields, write_metadata_sidecar};

// High-level API re-exports
pub use api::{
    analyze, analyze_with, available_dates, export_dates, heatmap, load_region, load_region_bytes, preview_dates, render_preview,
    scene_table, target_dates,
};
