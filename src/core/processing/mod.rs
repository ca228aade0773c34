//! Per-scene processing stages and the collection pipeline that chains them.
pub mod indices;
pub mod mask;
pub mod ops;
pub mod pipeline;
pub mod series;
pub mod zonal;

pub use indices::compute_indices;
pub use mask::mask_clouds_and_shadows;
pub use pipeline::{CollectionPipeline, ProcessedScenes};
pub use zonal::{IndexTable, LocalReducer, ZonalReducer, aggregate, aggregate_at};
