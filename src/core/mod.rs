//! Core dataset preparation algorithms

pub mod band_split;
pub mod georef;
pub mod geotransform;
pub mod mask;
pub mod morphology;
pub mod pipeline;
pub mod rasterize;
pub mod rescale;
pub mod tiling;
pub mod vectorize;

// Re-export main types
pub use band_split::{BandSplitReport, BandSplitter};
pub use georef::{georeference_polygon, AxisOrder, PixelSpace, PolygonFeature, PolygonGeoreferencer, WorldSpace};
pub use geotransform::{bounding_box, intersect, pixel_to_world, world_to_pixel, CoordinateMapper};
pub use mask::{MaskEncoder, MaskLayers};
pub use pipeline::{BatchReport, DatasetPair, PairedTiles, Pipeline, TileMask, TilePair, TrainingItem};
pub use tiling::{tile_name, PairedTiler, RasterTile, TilePlan, TileSpec};
pub use vectorize::ContourVectorizer;
