//! Whole-region export with a fishnet fallback.
//!
//! The exporter first asks for the whole region in one file. Only a
//! [`DownloadOutcome::SizeExceeded`] answer moves it to the tiled state, where
//! every cell of the grid is requested on its own. Tile failures are recorded
//! and do not stop the remaining tiles.
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::export::fishnet::fishnet;
use crate::core::export::{DownloadOutcome, DownloadRequest, DownloadService};
use crate::core::params::ExportParams;
use crate::core::region::Region;
use crate::core::scene::Scene;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportStrategy {
    Whole,
    Tiled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnitStatus {
    Ready { url: String },
    Failed { reason: String },
}

/// Outcome of one export unit: the whole region or one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportUnit {
    pub name: String,
    /// 1-based tile number; `None` for the whole-region unit
    pub tile: Option<usize>,
    pub status: UnitStatus,
}

impl ExportUnit {
    pub fn url(&self) -> Option<&str> {
        match &self.status {
            UnitStatus::Ready { url } => Some(url.as_str()),
            UnitStatus::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    pub date: String,
    pub strategy: ExportStrategy,
    pub units: Vec<ExportUnit>,
    /// Set when the whole-region attempt was abandoned for tiles
    pub size_fallback: bool,
}

impl ExportReport {
    pub fn urls(&self) -> Vec<&str> {
        self.units.iter().filter_map(ExportUnit::url).collect()
    }

    /// Per-unit failures as errors carrying the unit name and date.
    pub fn failures(&self) -> Vec<Error> {
        self.units
            .iter()
            .filter_map(|u| match &u.status {
                UnitStatus::Failed { reason } => Some(Error::Export {
                    unit: u.name.clone(),
                    reason: reason.clone(),
                }),
                UnitStatus::Ready { .. } => None,
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.units.iter().all(|u| u.url().is_some())
    }
}

pub fn whole_name(date: &str) -> String {
    format!("image{}", date)
}

pub fn tile_name(date: &str, tile: usize) -> String {
    format!("image_{}_tile_{}", date, tile)
}

enum State {
    WholeAttempt,
    Tiled,
}

pub struct TiledExporter<'a, S: DownloadService + ?Sized> {
    service: &'a S,
    params: ExportParams,
}

impl<'a, S: DownloadService + ?Sized> TiledExporter<'a, S> {
    pub fn new(service: &'a S, params: ExportParams) -> Self {
        Self { service, params }
    }

    pub fn params(&self) -> &ExportParams {
        &self.params
    }

    fn request(&self, name: String, geometry: MultiPolygon<f64>) -> DownloadRequest {
        DownloadRequest {
            name,
            geometry,
            scale: self.params.scale,
            crs: self.params.crs.clone(),
            format: self.params.format,
        }
    }

    /// Export `scene` over `region`, falling back to tiles when the whole region is too large.
    ///
    /// Errors only when the region has no extent; service failures are reported per unit.
    pub fn export(&self, scene: &Scene, date: &str, region: &Region) -> Result<ExportReport> {
        let bounds = region
            .bounding_rect()
            .ok_or_else(|| Error::NoData(format!("region has no extent to export for {}", date)))?;

        let mut state = State::WholeAttempt;
        loop {
            match state {
                State::WholeAttempt => {
                    let name = whole_name(date);
                    let request = self.request(name.clone(), region.geometry());
                    match self.service.download_url(scene, &request) {
                        DownloadOutcome::Ready(url) => {
                            info!("Exported {} as {}", name, url);
                            return Ok(ExportReport {
                                date: date.to_string(),
                                strategy: ExportStrategy::Whole,
                                units: vec![ExportUnit {
                                    name,
                                    tile: None,
                                    status: UnitStatus::Ready { url },
                                }],
                                size_fallback: false,
                            });
                        }
                        DownloadOutcome::SizeExceeded => {
                            warn!(
                                "{} exceeds the request size limit; exporting {}x{} tiles",
                                name, self.params.tile_rows, self.params.tile_cols
                            );
                            state = State::Tiled;
                        }
                        DownloadOutcome::Failed(reason) => {
                            warn!("Export of {} failed: {}", name, reason);
                            return Ok(ExportReport {
                                date: date.to_string(),
                                strategy: ExportStrategy::Whole,
                                units: vec![ExportUnit {
                                    name,
                                    tile: None,
                                    status: UnitStatus::Failed { reason },
                                }],
                                size_fallback: false,
                            });
                        }
                    }
                }
                State::Tiled => {
                    let cells = fishnet(&bounds, self.params.tile_rows, self.params.tile_cols);
                    let mut units = Vec::with_capacity(cells.len());
                    for (i, cell) in cells.into_iter().enumerate() {
                        let tile = i + 1;
                        let name = tile_name(date, tile);
                        let request = self.request(name.clone(), MultiPolygon::new(vec![cell]));
                        let status = match self.service.download_url(scene, &request) {
                            DownloadOutcome::Ready(url) => {
                                info!("Tile {} exported as {}", tile, url);
                                UnitStatus::Ready { url }
                            }
                            DownloadOutcome::SizeExceeded => {
                                warn!("Tile {} of {} still exceeds the size limit", tile, date);
                                UnitStatus::Failed {
                                    reason: "request size limit exceeded".into(),
                                }
                            }
                            DownloadOutcome::Failed(reason) => {
                                warn!("Tile {} of {} failed: {}", tile, date, reason);
                                UnitStatus::Failed { reason }
                            }
                        };
                        units.push(ExportUnit {
                            name,
                            tile: Some(tile),
                            status,
                        });
                    }
                    return Ok(ExportReport {
                        date: date.to_string(),
                        strategy: ExportStrategy::Tiled,
                        units,
                        size_fallback: true,
                    });
                }
            }
        }
    }
}
