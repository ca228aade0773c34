//! Spectral index computation over masked scenes.
use ndarray::Array2;
use tracing::debug;

use crate::core::processing::ops::{enhanced_vegetation, normalized_difference, soil_adjusted};
use crate::core::scene::Scene;
use crate::error::Result;
use crate::types::{IndexFormula, SpectralIndex};

/// Evaluate one index over the scene's reflectance bands.
pub fn compute_index(scene: &Scene, index: SpectralIndex) -> Result<Array2<f64>> {
    Ok(match index.formula() {
        IndexFormula::NormalizedDifference { a, b } => {
            normalized_difference(scene.band(a)?, scene.band(b)?)
        }
        IndexFormula::Enhanced { nir, red, blue } => {
            enhanced_vegetation(scene.band(nir)?, scene.band(red)?, scene.band(blue)?)
        }
        IndexFormula::SoilAdjusted { nir, red, l } => {
            soil_adjusted(scene.band(nir)?, scene.band(red)?, l)
        }
    })
}

/// Add every registered index band to a copy of `scene` and stamp its date key.
///
/// Existing bands are kept as they are.
pub fn compute_indices(scene: &Scene) -> Result<Scene> {
    let mut out = scene.clone();
    for index in SpectralIndex::ALL {
        out.set_band(index.name(), compute_index(scene, index)?)?;
    }
    out.set_date_key(scene.metadata.date_key());
    debug!("Computed indices for {} ({})", scene.metadata.id, scene.metadata.date_key());
    Ok(out)
}
