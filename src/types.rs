//! Shared types and enums used across s2monitor.
//! Includes the `SpectralIndex` registry (name, formula and input bands of every
//! supported index), Sentinel-2 band names, and `ExportFormat`.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Sentinel-2 L2A band names as delivered by the catalog.
pub mod band {
    pub const BLUE: &str = "B2";
    pub const GREEN: &str = "B3";
    pub const RED: &str = "B4";
    pub const RED_EDGE: &str = "B5";
    pub const NIR: &str = "B8";
    pub const SWIR1: &str = "B11";
    pub const SWIR2: &str = "B12";

    /// Cloud probability, percent.
    pub const CLOUD_PROBABILITY: &str = "MSK_CLDPRB";
    /// Snow probability, percent.
    pub const SNOW_PROBABILITY: &str = "MSK_SNWPRB";
    /// Scene classification layer.
    pub const SCENE_CLASSIFICATION: &str = "SCL";

    /// `true` for reflectance bands: `B` followed by a digit (`B2`, `B8A`, `B11`).
    pub fn is_reflectance(name: &str) -> bool {
        let mut chars = name.chars();
        matches!(
            (chars.next(), chars.next()),
            (Some('B'), Some(d)) if d.is_ascii_digit()
        )
    }
}

/// Band-math recipe of a spectral index.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum IndexFormula {
    /// `(a - b) / (a + b)`
    NormalizedDifference { a: &'static str, b: &'static str },
    /// `2.5 * (nir - red) / (nir + 6 red - 7.5 blue + 1)`
    Enhanced {
        nir: &'static str,
        red: &'static str,
        blue: &'static str,
    },
    /// `((nir - red) / (nir + red + l)) * (1 + l)`
    SoilAdjusted {
        nir: &'static str,
        red: &'static str,
        l: f64,
    },
}

/// The fixed set of spectral indices. This registry is the single source of
/// band names and output columns for both index computation and aggregation.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Debug, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SpectralIndex {
    Ndvi,
    Ndre,
    Evi,
    Ndwi,
    Ndmi,
    Savi,
}

impl SpectralIndex {
    pub const ALL: [SpectralIndex; 6] = [
        SpectralIndex::Ndvi,
        SpectralIndex::Ndre,
        SpectralIndex::Evi,
        SpectralIndex::Ndwi,
        SpectralIndex::Ndmi,
        SpectralIndex::Savi,
    ];

    /// Output band name, also the table column name.
    pub fn name(self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "ndvi",
            SpectralIndex::Ndre => "ndre",
            SpectralIndex::Evi => "evi",
            SpectralIndex::Ndwi => "ndwi",
            SpectralIndex::Ndmi => "ndmi",
            SpectralIndex::Savi => "savi",
        }
    }

    pub fn formula(self) -> IndexFormula {
        match self {
            SpectralIndex::Ndvi => IndexFormula::NormalizedDifference {
                a: band::NIR,
                b: band::RED,
            },
            SpectralIndex::Ndre => IndexFormula::NormalizedDifference {
                a: band::NIR,
                b: band::RED_EDGE,
            },
            SpectralIndex::Evi => IndexFormula::Enhanced {
                nir: band::NIR,
                red: band::RED,
                blue: band::BLUE,
            },
            SpectralIndex::Ndwi => IndexFormula::NormalizedDifference {
                a: band::GREEN,
                b: band::NIR,
            },
            SpectralIndex::Ndmi => IndexFormula::NormalizedDifference {
                a: band::NIR,
                b: band::SWIR1,
            },
            SpectralIndex::Savi => IndexFormula::SoilAdjusted {
                nir: band::NIR,
                red: band::RED,
                l: 0.5,
            },
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|idx| idx.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum ExportFormat {
    #[serde(rename = "GEO_TIFF")]
    GeoTiff,
}

impl ExportFormat {
    /// Format identifier understood by the imagery engine.
    pub fn engine_name(self) -> &'static str {
        match self {
            ExportFormat::GeoTiff => "GEO_TIFF",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::GeoTiff => "tif",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.engine_name())
    }
}
