//! Output writers: float GeoTIFF scenes, RGB JPEG quicklooks, and metadata
//! embedding and JSON sidecars.
pub mod geotiff;
pub mod jpeg;
pub mod metadata;
