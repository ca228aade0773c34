//! I/O layer: boundary file normalization through OGR, GDAL-backed scene
//! rasters, the directory scene catalog, the local export service and
//! `writers` for GeoTIFF/JPEG outputs and metadata sidecars.
pub mod catalog;
pub use catalog::DirectoryCatalog;

pub mod export;
pub use export::GeoTiffExportService;

pub mod gdal;
pub use gdal::{GdalError, GdalMetadata, GdalSceneReader, warp_to};

pub mod vector;
pub use vector::{BoundaryFormat, normalize, normalize_bytes};

pub mod writers;
