//! Display parameters for index layers and colour composites, and rendering
//! of a scene layer to 8-bit RGB for quicklooks.
use clap::ValueEnum;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::core::scene::Scene;
use crate::error::{Error, Result};
use crate::types::{SpectralIndex, band};

pub type Rgb = [u8; 3];

pub const RED: Rgb = [255, 0, 0];
pub const YELLOW: Rgb = [255, 255, 0];
pub const GREEN: Rgb = [0, 128, 0];
pub const CYAN: Rgb = [0, 255, 255];
pub const LIGHT_BLUE: Rgb = [173, 216, 230];
pub const BLUE: Rgb = [0, 0, 255];

/// Vegetation ramp.
pub const RED_YELLOW_GREEN: &[Rgb] = &[RED, YELLOW, GREEN];
/// Water and moisture ramp.
pub const CYAN_BLUE: &[Rgb] = &[CYAN, LIGHT_BLUE, BLUE];

/// Colour used for masked pixels.
pub const NO_DATA: Rgb = [0, 0, 0];

/// Value range and palette of a single-band layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisParams {
    pub min: f64,
    pub max: f64,
    pub palette: &'static [Rgb],
}

impl VisParams {
    pub fn for_index(index: SpectralIndex) -> Self {
        match index {
            SpectralIndex::Ndwi => VisParams {
                min: -0.5,
                max: 0.25,
                palette: CYAN_BLUE,
            },
            SpectralIndex::Ndmi => VisParams {
                min: -1.0,
                max: 1.0,
                palette: CYAN_BLUE,
            },
            SpectralIndex::Ndvi | SpectralIndex::Ndre | SpectralIndex::Evi | SpectralIndex::Savi => {
                VisParams {
                    min: 0.0,
                    max: 1.0,
                    palette: RED_YELLOW_GREEN,
                }
            }
        }
    }

    /// Palette colour for `v`, interpolated linearly between stops.
    pub fn color(&self, v: f64) -> Rgb {
        if v.is_nan() || self.palette.is_empty() {
            return NO_DATA;
        }
        let t = stretch(v, self.min, self.max);
        let last = self.palette.len() - 1;
        let pos = t * last as f64;
        let i = (pos.floor() as usize).min(last);
        let j = (i + 1).min(last);
        let f = pos - i as f64;
        let mut out = [0u8; 3];
        for (k, channel) in out.iter_mut().enumerate() {
            let a = self.palette[i][k] as f64;
            let b = self.palette[j][k] as f64;
            *channel = (a + (b - a) * f).round() as u8;
        }
        out
    }
}

/// Three-band reflectance composite stretched over one range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeVis {
    pub bands: [&'static str; 3],
    pub min: f64,
    pub max: f64,
}

pub const NATURAL_COLOR: CompositeVis = CompositeVis {
    bands: [band::RED, band::GREEN, band::BLUE],
    min: 0.01,
    max: 0.2,
};

pub const FALSE_COLOR: CompositeVis = CompositeVis {
    bands: [band::SWIR2, band::NIR, band::RED],
    min: 0.1,
    max: 0.4,
};

/// Map layer that can be rendered from a processed scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Ndvi,
    Ndre,
    Evi,
    Ndwi,
    Ndmi,
    Savi,
    /// B4/B3/B2
    Natural,
    /// B12/B8/B4
    False,
}

impl Layer {
    pub fn index(self) -> Option<SpectralIndex> {
        match self {
            Layer::Ndvi => Some(SpectralIndex::Ndvi),
            Layer::Ndre => Some(SpectralIndex::Ndre),
            Layer::Evi => Some(SpectralIndex::Evi),
            Layer::Ndwi => Some(SpectralIndex::Ndwi),
            Layer::Ndmi => Some(SpectralIndex::Ndmi),
            Layer::Savi => Some(SpectralIndex::Savi),
            Layer::Natural | Layer::False => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Layer::Natural => "natural",
            Layer::False => "false",
            other => other.index().map(SpectralIndex::name).unwrap_or_default(),
        }
    }
}

fn stretch(v: f64, min: f64, max: f64) -> f64 {
    if max <= min {
        return 0.0;
    }
    ((v - min) / (max - min)).clamp(0.0, 1.0)
}

/// Interleaved RGB bytes of a single-band layer, row-major.
pub fn render_band(data: &Array2<f64>, vis: &VisParams) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 3);
    for &v in data.iter() {
        out.extend_from_slice(&vis.color(v));
    }
    out
}

/// Interleaved RGB bytes of a composite; pixels with any undefined band are black.
pub fn render_composite(scene: &Scene, vis: &CompositeVis) -> Result<Vec<u8>> {
    let r = scene.band(vis.bands[0])?;
    let g = scene.band(vis.bands[1])?;
    let b = scene.band(vis.bands[2])?;
    let mut out = Vec::with_capacity(r.len() * 3);
    for ((&r, &g), &b) in r.iter().zip(g.iter()).zip(b.iter()) {
        if r.is_nan() || g.is_nan() || b.is_nan() {
            out.extend_from_slice(&NO_DATA);
        } else {
            for v in [r, g, b] {
                out.push((stretch(v, vis.min, vis.max) * 255.0).round() as u8);
            }
        }
    }
    Ok(out)
}

/// Render one layer of a processed scene as interleaved RGB.
pub fn render_layer(scene: &Scene, layer: Layer) -> Result<Vec<u8>> {
    match layer {
        Layer::Natural => render_composite(scene, &NATURAL_COLOR),
        Layer::False => render_composite(scene, &FALSE_COLOR),
        other => match other.index() {
            Some(index) => Ok(render_band(scene.band(index.name())?, &VisParams::for_index(index))),
            None => Err(Error::InvalidArgument {
                arg: "layer",
                value: other.name().to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn palette_ends_and_midpoint() {
        let vis = VisParams::for_index(SpectralIndex::Ndvi);
        assert_eq!(vis.color(0.0), RED);
        assert_eq!(vis.color(-0.3), RED);
        assert_eq!(vis.color(0.5), YELLOW);
        assert_eq!(vis.color(1.0), GREEN);
        assert_eq!(vis.color(7.0), GREEN);
        assert_eq!(vis.color(0.25), [255, 128, 0]);
    }

    #[test]
    fn masked_pixels_render_black() {
        let vis = VisParams::for_index(SpectralIndex::Ndwi);
        let rgb = render_band(&array![[f64::NAN, 0.25]], &vis);
        assert_eq!(rgb, vec![0, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn water_ranges() {
        assert_eq!(VisParams::for_index(SpectralIndex::Ndwi).min, -0.5);
        assert_eq!(VisParams::for_index(SpectralIndex::Ndmi).palette, CYAN_BLUE);
    }

    #[test]
    fn every_layer_fills_the_grid() {
        use crate::core::scene::{GeoGrid, SceneMetadata};
        use chrono::{TimeZone, Utc};

        let shape = (2, 3);
        let mut scene = Scene::new(
            SceneMetadata {
                id: "S2A_0714".into(),
                acquired: Utc.with_ymd_and_hms(2023, 7, 14, 13, 0, 0).unwrap(),
                cloud_pct: 2.0,
                properties: Default::default(),
            },
            GeoGrid::new(-46.0, -17.0, 0.001, 2, 3),
        );
        for name in [band::BLUE, band::GREEN, band::RED, band::NIR, band::SWIR2] {
            scene.set_band(name, Array2::from_elem(shape, 0.1)).unwrap();
        }
        for index in SpectralIndex::ALL {
            scene.set_band(index.name(), Array2::from_elem(shape, 0.4)).unwrap();
        }
        for &layer in Layer::value_variants() {
            let rgb = render_layer(&scene, layer).unwrap();
            assert_eq!(rgb.len(), 2 * 3 * 3, "{}", layer.name());
        }
    }

    #[test]
    fn layer_names_follow_indices() {
        assert_eq!(Layer::Savi.name(), "savi");
        assert_eq!(Layer::Natural.index(), None);
        assert_eq!(FALSE_COLOR.bands, ["B12", "B8", "B4"]);
    }
}
