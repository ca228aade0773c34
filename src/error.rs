//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, GDAL and serialization errors, and provides
//! semantic variants for boundary-file problems, empty selections and export failures.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL reader error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Unrecognized extension, or a file without any readable polygon.
    #[error("Unsupported boundary file {file}: {reason}")]
    Format { file: String, reason: String },

    /// The boundary file was recognized but could not be read.
    #[error("Corrupt boundary file {file}: {reason}")]
    Parse { file: String, reason: String },

    #[error("No data: {0}")]
    NoData(String),

    #[error("Scene {scene} has no band {band}")]
    MissingBand { scene: String, band: String },

    /// A single export unit failed for a reason other than the size ceiling.
    #[error("Export of {unit} failed: {reason}")]
    Export { unit: String, reason: String },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }

    pub(crate) fn format(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Format {
            file: file.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Parse {
            file: file.into(),
            reason: reason.into(),
        }
    }
}
