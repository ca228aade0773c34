use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use s2monitor::{Layer, SpectralIndex};

#[derive(Parser)]
#[command(name = "s2monitor", version, about = "Sentinel-2 index monitoring CLI")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Enable logging (RUST_LOG overrides the level)
    #[arg(long, global = true, default_value_t = false)]
    pub log: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Normalize a boundary file and print it as GeoJSON
    Region {
        /// Boundary file (GeoJSON, KML, KMZ, Shapefile or GeoPackage)
        input: PathBuf,

        /// Write the GeoJSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List date, cloud cover and id of every matching scene
    Scenes {
        #[command(flatten)]
        query: QueryArgs,

        #[arg(short = 'f', long, value_enum, default_value_t = TableFormat::Csv)]
        format: TableFormat,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the distinct acquisition dates that can be exported or previewed
    Dates {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Build the per-date, per-feature index time series
    Series {
        #[command(flatten)]
        query: QueryArgs,

        /// Indices to report, comma separated (default: ndvi,evi)
        #[arg(long, value_enum, value_delimiter = ',')]
        indices: Vec<SpectralIndex>,

        /// Zonal reduction scale in metres (default 10)
        #[arg(long)]
        zonal_scale: Option<f64>,

        /// Print the monthly means of this index instead of the table
        #[arg(long, value_enum)]
        heatmap: Option<SpectralIndex>,

        #[arg(short = 'f', long, value_enum, default_value_t = TableFormat::Csv)]
        format: TableFormat,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Export the selected dates (or the latest scene) as GeoTIFFs
    Export {
        #[command(flatten)]
        query: QueryArgs,

        /// Directory receiving the GeoTIFFs
        #[arg(long)]
        output_dir: PathBuf,

        /// Dates to export, comma separated (default: latest scene)
        #[arg(long, value_delimiter = ',')]
        dates: Vec<String>,

        /// Output pixel size in metres (default 20)
        #[arg(long)]
        scale: Option<f64>,

        /// Output CRS (default EPSG:4674)
        #[arg(long)]
        target_crs: Option<String>,
    },
    /// Render JPEG quicklooks of one layer for the selected dates (or the latest scene)
    Preview {
        #[command(flatten)]
        query: QueryArgs,

        #[arg(long, value_enum, default_value_t = Layer::Ndvi)]
        layer: Layer,

        #[arg(long)]
        output_dir: PathBuf,

        /// Dates to render, comma separated (default: latest scene)
        #[arg(long, value_delimiter = ',')]
        dates: Vec<String>,
    },
}

/// Region, scene source and filters shared by the scene-reading commands.
#[derive(Args)]
pub struct QueryArgs {
    /// Boundary file (GeoJSON, KML, KMZ, Shapefile or GeoPackage)
    #[arg(short, long)]
    pub region: PathBuf,

    /// Directory of scene GeoTIFFs with JSON metadata sidecars
    #[arg(long)]
    pub scenes: PathBuf,

    /// JSON file with analysis parameters; flags below override it
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// First acquisition date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last acquisition date, inclusive (default: today)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Keep scenes strictly below this cloudy pixel percentage
    #[arg(long)]
    pub cloud_max: Option<f64>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum TableFormat {
    Csv,
    Json,
}
