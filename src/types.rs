use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raster sample type. f32 holds every 8- and 16-bit sample exactly.
pub type Sample = f32;

/// Storage type of a raster's samples on disk.
///
/// Pixels are processed as [`Sample`]; the original type is carried along so
/// written rasters keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    I16,
    U32,
    I32,
    #[default]
    F32,
    F64,
}

/// 2D single-band raster data (rows x cols)
pub type Band = Array2<Sample>;

/// 3D multi-band raster data (band x rows x cols)
pub type BandStack = Array3<Sample>;

/// 2D grid of class codes, see [`MaskClass`]
pub type ClassMask = Array2<u8>;

/// Class codes written into a [`ClassMask`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MaskClass {
    Background = 0,
    Boundary = 1,
    Contact = 2,
    Interior = 3,
}

impl MaskClass {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Units of a raster's world coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrsUnits {
    /// Projected coordinates, assumed to be metres
    Linear,
    /// Geographic longitude/latitude in degrees
    Degrees,
}

impl CrsUnits {
    /// Guess the units from a WKT, PROJ or `AUTH:CODE` projection string.
    ///
    /// Geographic CRSs are recognised by a top-level `GEOGCS`/`GEOGCRS` WKT
    /// node, a `longlat` PROJ string or a well-known lon/lat code. Anything
    /// else, including a missing projection, is treated as linear.
    pub fn from_projection(projection: Option<&str>) -> Self {
        let Some(projection) = projection else {
            return CrsUnits::Linear;
        };
        let upper = projection.trim().to_ascii_uppercase();
        let geographic = upper.starts_with("GEOGCS")
            || upper.starts_with("GEOGCRS")
            || upper.contains("+PROJ=LONGLAT")
            || upper.contains("+PROJ=LATLONG")
            || matches!(upper.as_str(), "EPSG:4326" | "EPSG:4269" | "EPSG:4258" | "OGC:CRS84");
        if geographic {
            CrsUnits::Degrees
        } else {
            CrsUnits::Linear
        }
    }
}

/// Axis-aligned rectangle in world coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl BoundingBox {
    /// Build a box from two arbitrary corners, normalizing the ordering.
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            minx: x0.min(x1),
            miny: y0.min(y1),
            maxx: x0.max(x1),
            maxy: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }
}

/// Affine (non-rotated) mapping between pixel space and world space for one raster.
///
/// `pixel_height` is negative for north-up rasters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    /// Raster width in pixels
    pub width: usize,
    /// Raster height in pixels
    pub height: usize,
}

impl GeoTransform {
    /// Create a transform, rejecting zero or non-finite pixel sizes.
    pub fn new(
        origin: (f64, f64),
        pixel_size: (f64, f64),
        width: usize,
        height: usize,
    ) -> PrepResult<Self> {
        let gt = Self {
            origin_x: origin.0,
            origin_y: origin.1,
            pixel_width: pixel_size.0,
            pixel_height: pixel_size.1,
            width,
            height,
        };
        gt.validate()?;
        Ok(gt)
    }

    /// Build from a GDAL-style six-coefficient array plus raster size.
    ///
    /// Rotated transforms are not supported.
    pub fn from_gdal(coeffs: [f64; 6], width: usize, height: usize) -> PrepResult<Self> {
        if coeffs[2] != 0.0 || coeffs[4] != 0.0 {
            return Err(PrepError::CoordinateTransform(format!(
                "rotated geotransform not supported (rotation terms {}, {})",
                coeffs[2], coeffs[4]
            )));
        }
        Self::new((coeffs[0], coeffs[3]), (coeffs[1], coeffs[5]), width, height)
    }

    /// GDAL six-coefficient form
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    pub fn validate(&self) -> PrepResult<()> {
        let values = [self.origin_x, self.origin_y, self.pixel_width, self.pixel_height];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PrepError::CoordinateTransform(format!(
                "non-finite geotransform coefficients: {:?}",
                values
            )));
        }
        if self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return Err(PrepError::CoordinateTransform(format!(
                "zero pixel size ({}, {})",
                self.pixel_width, self.pixel_height
            )));
        }
        Ok(())
    }

    /// Same georeferencing with a different raster size
    pub fn with_size(&self, width: usize, height: usize) -> Self {
        Self { width, height, ..*self }
    }

    /// (rows, cols) as used by ndarray
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

/// Rectangular pixel window (x = column offset, y = row offset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelWindow {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Error types for dataset preparation
#[derive(Debug, thiserror::Error)]
pub enum PrepError {
    #[error("Rasters do not overlap: {a:?} and {b:?}")]
    NoOverlap { a: BoundingBox, b: BoundingBox },

    #[error("No paired {expected} for {item}")]
    MissingPair { item: String, expected: PathBuf },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Corrupt archive {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("Coordinate transform error: {0}")]
    CoordinateTransform(String),

    #[error("Pixel sizes differ: {0}")]
    ResolutionMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Raster error: {0}")]
    Raster(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("XML parsing error: {0}")]
    Xml(String),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl PrepError {
    /// Whether a batch may log this error and continue with the next item.
    ///
    /// Structural failures (no overlap, mismatched grids, bad configuration)
    /// abort the job that depends on them.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PrepError::NoOverlap { .. }
                | PrepError::ResolutionMismatch(_)
                | PrepError::InvalidConfig(_)
        )
    }
}

/// Result type for preparation operations
pub type PrepResult<T> = Result<T, PrepError>;
