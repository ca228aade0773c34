//! Core building blocks: the region and scene model, the catalog seam,
//! per-scene processing, zonal aggregation, export strategy and display
//! parameters. These are consumed by the high-level `api` module.
pub mod catalog;
pub mod export;
pub mod params;
pub mod processing;
pub mod region;
pub mod scene;
pub mod visualization;
