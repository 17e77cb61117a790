//! Pipeline configuration
//!
//! Every recognized option is a named field with a default; a configuration is
//! validated once at entry by [`PipelineConfig::validate`] and then passed
//! down explicitly.

use crate::types::{CrsUnits, PrepError, PrepResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tile grid parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilerConfig {
    /// Tile width in pixels
    pub tile_width: usize,
    /// Tile height in pixels
    pub tile_height: usize,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            tile_width: 360,
            tile_height: 360,
        }
    }
}

impl TilerConfig {
    pub fn validate(&self) -> PrepResult<()> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(PrepError::InvalidConfig(format!(
                "tile size must be non-zero, got {}x{}",
                self.tile_width, self.tile_height
            )));
        }
        Ok(())
    }
}

/// Which side of the footprint edge the boundary class is drawn on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryType {
    /// Boundary pixels lie inside the footprint
    Inner,
    /// Boundary pixels lie just outside the footprint
    Outer,
}

/// Mask encoding parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Boundary thickness in pixels
    pub boundary_width: usize,
    pub boundary_type: BoundaryType,
    /// Distance under which two footprints are considered in contact
    pub contact_spacing: f64,
    /// Measure `contact_spacing` in metres instead of pixels
    pub meters: bool,
    /// Units of the reference raster's coordinates when `meters` is set.
    /// `None` detects them from the raster's projection.
    pub crs_units: Option<CrsUnits>,
    /// Output (rows, cols); `None` uses the reference raster's shape
    pub output_shape: Option<(usize, usize)>,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            boundary_width: 3,
            boundary_type: BoundaryType::Inner,
            contact_spacing: 10.0,
            meters: false,
            crs_units: None,
            output_shape: None,
        }
    }
}

impl MaskConfig {
    pub fn validate(&self) -> PrepResult<()> {
        if self.boundary_width == 0 {
            return Err(PrepError::InvalidConfig(
                "boundary_width must be at least one pixel".to_string(),
            ));
        }
        if !self.contact_spacing.is_finite() || self.contact_spacing < 0.0 {
            return Err(PrepError::InvalidConfig(format!(
                "contact_spacing must be a non-negative number, got {}",
                self.contact_spacing
            )));
        }
        if let Some((rows, cols)) = self.output_shape {
            if rows == 0 || cols == 0 {
                return Err(PrepError::InvalidConfig(format!(
                    "output_shape must be non-empty, got {}x{}",
                    rows, cols
                )));
            }
        }
        Ok(())
    }
}

/// Mask vectorization parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizeConfig {
    /// Douglas-Peucker tolerance in pixels
    pub tolerance: f64,
    /// Class code treated as foreground
    pub foreground: u8,
}

impl Default for VectorizeConfig {
    fn default() -> Self {
        Self {
            tolerance: 1.0,
            foreground: 3,
        }
    }
}

impl VectorizeConfig {
    pub fn validate(&self) -> PrepResult<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(PrepError::InvalidConfig(format!(
                "simplification tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// File naming used to pair footprint files with imagery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Prefix stripped from footprint file stems to obtain the item id
    pub vector_prefix: String,
    /// Prefix of the matching raster file name
    pub raster_prefix: String,
    /// Extension of the matching raster file
    pub raster_extension: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            vector_prefix: "buildings_".to_string(),
            raster_prefix: "RGB-PanSharpen_".to_string(),
            raster_extension: "tif".to_string(),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tiling: TilerConfig,
    pub mask: MaskConfig,
    pub vectorize: VectorizeConfig,
    pub naming: NamingConfig,
    /// Worker pool size; `None` lets rayon pick
    pub workers: Option<usize>,
}

impl PipelineConfig {
    /// Load and validate a JSON configuration file. Missing keys take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> PrepResult<Self> {
        log::info!("Loading pipeline configuration: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PrepResult<()> {
        self.tiling.validate()?;
        self.mask.validate()?;
        self.vectorize.validate()?;
        if self.workers == Some(0) {
            return Err(PrepError::InvalidConfig(
                "workers must be at least 1 when set".to_string(),
            ));
        }
        if self.naming.raster_extension.is_empty() {
            return Err(PrepError::InvalidConfig(
                "raster_extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tiling.tile_width, 360);
        assert_eq!(config.mask.boundary_width, 3);
        assert_eq!(config.mask.boundary_type, BoundaryType::Inner);
        assert_eq!(config.mask.contact_spacing, 10.0);
        assert!(!config.mask.meters);
        assert_eq!(config.vectorize.tolerance, 1.0);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "mask": { "boundary_width": 5, "boundary_type": "outer", "meters": true } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mask.boundary_width, 5);
        assert_eq!(config.mask.boundary_type, BoundaryType::Outer);
        assert!(config.mask.meters);
        assert_eq!(config.mask.contact_spacing, 10.0);
        assert_eq!(config.mask.crs_units, None);
        assert_eq!(config.tiling, TilerConfig::default());

        let json = r#"{ "mask": { "meters": true, "crs_units": "degrees" } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mask.crs_units, Some(CrsUnits::Degrees));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = PipelineConfig::default();
        config.tiling.tile_height = 0;
        assert!(matches!(config.validate(), Err(PrepError::InvalidConfig(_))));

        let mut config = PipelineConfig::default();
        config.mask.contact_spacing = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.workers = Some(0);
        assert!(config.validate().is_err());
    }
}
