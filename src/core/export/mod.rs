//! Raster export: download requests, the typed outcome of the export service,
//! and the whole-then-tiled export strategy.
pub mod fishnet;
pub mod tiled;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::core::scene::Scene;
use crate::types::ExportFormat;

pub use fishnet::{TILE_COLS, TILE_ROWS, fishnet};
pub use tiled::{ExportReport, ExportStrategy, ExportUnit, TiledExporter, UnitStatus};

/// Failure text the upstream engine uses when a request is over its size limit.
pub const SIZE_LIMIT_MARKER: &str = "Total request size";

/// One download request: what to cut out of a scene and how to encode it.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
    /// Output pixel size in metres.
    pub scale: f64,
    pub crs: String,
    pub format: ExportFormat,
}

/// Result of a download request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DownloadOutcome {
    Ready(String),
    /// The request is larger than the service accepts; a smaller area may succeed.
    SizeExceeded,
    Failed(String),
}

impl DownloadOutcome {
    /// Classify a textual service failure.
    ///
    /// Only adapters talking to an engine that reports errors as text should use this.
    pub fn from_failure_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(SIZE_LIMIT_MARKER) {
            DownloadOutcome::SizeExceeded
        } else {
            DownloadOutcome::Failed(message)
        }
    }
}

/// Service producing a downloadable file for a request.
pub trait DownloadService {
    fn download_url(&self, scene: &Scene, request: &DownloadRequest) -> DownloadOutcome;
}
