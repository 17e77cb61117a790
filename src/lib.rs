//! changeprep: dataset preparation for building change detection.
//!
//! Cuts paired before/after rasters along one shared tile grid, splits
//! multi-band imagery into single bands, rasterizes building footprints into
//! priority-encoded class masks, and turns predicted masks back into
//! georeferenced polygons.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use config::{BoundaryType, MaskConfig, NamingConfig, PipelineConfig, TilerConfig, VectorizeConfig};
pub use types::{
    BoundingBox, ClassMask, CrsUnits, GeoTransform, MaskClass, PixelWindow, PrepError, PrepResult,
    SampleType,
};

pub use crate::core::{
    ContourVectorizer, CoordinateMapper, MaskEncoder, PairedTiler, Pipeline, PolygonFeature,
    PolygonGeoreferencer, TilePlan,
};
pub use io::{RasterSink, RasterSource};
