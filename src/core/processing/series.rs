//! Derived tables over a scene search and an index time series.
use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::core::catalog::SceneHandle;
use crate::core::processing::zonal::IndexTable;
use crate::types::SpectralIndex;

/// One line of the scene metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSummary {
    #[serde(rename = "data")]
    pub date: String,
    pub cloud_pct: f64,
    pub id: String,
}

/// Date, cloud cover and id of every scene, oldest first. No pixel is read.
pub fn scene_summaries(handles: &[SceneHandle]) -> Vec<SceneSummary> {
    let mut rows: Vec<SceneSummary> = handles
        .iter()
        .map(|h| SceneSummary {
            date: h.metadata.date_key(),
            cloud_pct: h.metadata.cloud_pct,
            id: h.metadata.id.clone(),
        })
        .collect();
    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    rows
}

/// Distinct acquisition dates, oldest first.
pub fn available_dates(handles: &[SceneHandle]) -> Vec<String> {
    let mut dates: Vec<String> = handles.iter().map(|h| h.metadata.date_key()).collect();
    dates.sort();
    dates.dedup();
    dates
}

/// Date of the most recent scene, used when the user selects no date.
pub fn latest_date(handles: &[SceneHandle]) -> Option<String> {
    handles
        .iter()
        .max_by_key(|h| h.metadata.acquired)
        .map(|h| h.metadata.date_key())
}

/// Mean of one index for a calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub year: i32,
    pub month: u32,
    pub mean: f64,
}

/// Mean of `index` per (year, month) over all rows and features.
///
/// Missing cells and unparseable dates are left out; months without a value
/// produce no cell.
pub fn monthly_heatmap(table: &IndexTable, index: SpectralIndex) -> Vec<HeatmapCell> {
    let mut sums: BTreeMap<(i32, u32), (f64, usize)> = BTreeMap::new();
    for (date, value) in table.series(index) {
        let Ok(day) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
            continue;
        };
        let slot = sums.entry((day.year(), day.month())).or_insert((0.0, 0));
        slot.0 += value;
        slot.1 += 1;
    }
    sums.into_iter()
        .map(|((year, month), (sum, n))| HeatmapCell {
            year,
            month,
            mean: sum / n as f64,
        })
        .collect()
}
