//! Collaborator ports and file adapters

pub mod archive;
pub mod aux_xml;
pub mod catalog;
#[cfg(feature = "gdal")]
pub mod gdal_raster;
pub mod geojson;
pub mod mask_image;
pub mod output;
pub mod raster;

pub use archive::{unpack, unpack_all};
pub use aux_xml::{read_aux_xml, write_aux_xml, PamMetadata};
pub use catalog::{CatalogRecord, CatalogSink, JsonCatalog, MemoryCatalog};
#[cfg(feature = "gdal")]
pub use gdal_raster::{GdalOpener, GdalRaster, GdalSink};
pub use geojson::{read_footprints, write_feature_collection};
pub use mask_image::{encode_jpeg, encode_mask_png, read_mask_png, write_mask_png};
pub use output::write_atomic;
pub use raster::{MemRaster, MemRasterSink, RasterData, RasterOpener, RasterSink, RasterSource};
