use crate::config::{BoundaryType, MaskConfig};
use crate::core::geotransform::pixel_size_metres;
use crate::core::georef::{PixelSpace, PolygonFeature, PolygonGeoreferencer, WorldSpace};
use crate::core::morphology::{dilate, erode};
use crate::core::rasterize::{burn, polygon_spans, Span};
use crate::types::{ClassMask, CrsUnits, GeoTransform, MaskClass, PrepResult};
use ndarray::{Array2, Zip};

/// The three binary layers a class mask is composited from
#[derive(Debug, Clone)]
pub struct MaskLayers {
    pub footprint: Array2<bool>,
    pub boundary: Array2<bool>,
    pub contact: Array2<bool>,
}

impl MaskLayers {
    /// Composite into one class mask with fixed priority.
    ///
    /// Starts from the boundary layer (code 1); pixels still 0 take
    /// `contact * 2`; pixels still 0 after that take `footprint * 3`.
    pub fn composite(&self) -> ClassMask {
        let mut mask = self.boundary.mapv(|b| b as u8 * MaskClass::Boundary.code());
        Zip::from(&mut mask).and(&self.contact).for_each(|m, &c| {
            if *m == 0 {
                *m = c as u8 * MaskClass::Contact.code();
            }
        });
        Zip::from(&mut mask).and(&self.footprint).for_each(|m, &f| {
            if *m == 0 {
                *m = f as u8 * MaskClass::Interior.code();
            }
        });
        mask
    }
}

/// Rasterizes building footprints into a priority-encoded class mask
#[derive(Debug, Clone)]
pub struct MaskEncoder {
    config: MaskConfig,
}

impl MaskEncoder {
    pub fn new(config: MaskConfig) -> PrepResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MaskConfig {
        &self.config
    }

    /// Encoder for a reference raster with the given projection.
    ///
    /// Fills in `crs_units` from the projection unless the configuration
    /// already sets it.
    pub fn for_projection(&self, projection: Option<&str>) -> Self {
        let mut config = self.config;
        if config.crs_units.is_none() {
            config.crs_units = Some(CrsUnits::from_projection(projection));
        }
        Self { config }
    }

    /// Contact radius in pixels along (x, y)
    pub fn contact_radius(&self, reference: &GeoTransform) -> (f64, f64) {
        let spacing = self.config.contact_spacing;
        if !self.config.meters {
            return (spacing, spacing);
        }
        let units = self.config.crs_units.unwrap_or(CrsUnits::Linear);
        let (mx, my) = pixel_size_metres(reference, units);
        (spacing / mx, spacing / my)
    }

    /// Output (rows, cols) for a reference raster
    pub fn output_shape(&self, reference: &GeoTransform) -> (usize, usize) {
        self.config.output_shape.unwrap_or_else(|| reference.shape())
    }

    /// Encode world-space footprints against a reference raster.
    pub fn encode_world(
        &self,
        footprints: &[PolygonFeature<WorldSpace>],
        reference: &GeoTransform,
    ) -> PrepResult<ClassMask> {
        let georef = PolygonGeoreferencer::new(*reference)?;
        let pixel: Vec<PolygonFeature<PixelSpace>> =
            footprints.iter().map(|f| georef.to_pixel(f)).collect();
        self.encode_pixel(&pixel, reference)
    }

    /// Encode footprints already in the reference raster's pixel space.
    ///
    /// Any invalid footprint fails the whole mask with
    /// [`crate::PrepError::InvalidGeometry`].
    pub fn encode_pixel(
        &self,
        footprints: &[PolygonFeature<PixelSpace>],
        reference: &GeoTransform,
    ) -> PrepResult<ClassMask> {
        Ok(self.layers(footprints, reference)?.composite())
    }

    /// Build the footprint, boundary and contact layers.
    pub fn layers(
        &self,
        footprints: &[PolygonFeature<PixelSpace>],
        reference: &GeoTransform,
    ) -> PrepResult<MaskLayers> {
        reference.validate()?;
        for footprint in footprints {
            footprint.validate()?;
        }
        let shape = self.output_shape(reference);
        log::debug!(
            "Encoding {} footprints into {}x{} mask",
            footprints.len(),
            shape.0,
            shape.1
        );

        let instances: Vec<Vec<Span>> = footprints
            .iter()
            .map(|f| polygon_spans(f.polygon(), shape))
            .collect();

        let mut footprint = Array2::from_elem(shape, false);
        for spans in &instances {
            burn(&mut footprint, spans);
        }

        let boundary = match self.config.boundary_type {
            BoundaryType::Inner => xor(&footprint, &erode(&footprint, self.config.boundary_width)),
            BoundaryType::Outer => xor(&dilate(&footprint, self.config.boundary_width), &footprint),
        };

        let contact = self.contact_layer(&instances, shape, reference);

        Ok(MaskLayers {
            footprint,
            boundary,
            contact,
        })
    }

    /// Pixels within `contact_spacing` of at least two distinct footprints
    fn contact_layer(
        &self,
        instances: &[Vec<Span>],
        shape: (usize, usize),
        reference: &GeoTransform,
    ) -> Array2<bool> {
        let (rx, ry) = self.contact_radius(reference);
        let (rows, cols) = shape;
        log::debug!("Contact radius {:.2}x{:.2} pixels", rx, ry);
        let offsets = ellipse_offsets(rx, ry, (rows, cols));

        let mut coverage: Array2<u8> = Array2::zeros(shape);
        let mut stamped_by: Array2<u32> = Array2::zeros(shape);

        for (k, spans) in instances.iter().enumerate() {
            let Some(local) = LocalMask::from_spans(spans) else {
                continue;
            };
            let id = k as u32 + 1;
            let mut stamp = |r: isize, c: isize| {
                if r < 0 || c < 0 || r as usize >= rows || c as usize >= cols {
                    return;
                }
                let idx = [r as usize, c as usize];
                if stamped_by[idx] != id {
                    stamped_by[idx] = id;
                    coverage[idx] = coverage[idx].saturating_add(1);
                }
            };

            for span in spans {
                for col in span.start..span.end {
                    let (r, c) = (span.row as isize, col as isize);
                    stamp(r, c);
                    if local.is_edge(r, c) {
                        for &(dr, dc) in &offsets {
                            stamp(r + dr, c + dc);
                        }
                    }
                }
            }
        }
        coverage.mapv(|n| n >= 2)
    }
}

fn xor(a: &Array2<bool>, b: &Array2<bool>) -> Array2<bool> {
    Zip::from(a).and(b).map_collect(|&x, &y| x ^ y)
}

/// Integer offsets inside an axis-aligned ellipse of radii (rx, ry).
///
/// Offsets reaching past a raster of `shape` from every pixel are left out.
fn ellipse_offsets(rx: f64, ry: f64, shape: (usize, usize)) -> Vec<(isize, isize)> {
    let max_c = rx.floor().min(shape.1 as f64) as isize;
    let max_r = ry.floor().min(shape.0 as f64) as isize;
    let mut offsets = Vec::new();
    for dr in -max_r..=max_r {
        for dc in -max_c..=max_c {
            let nx = if rx > 0.0 { dc as f64 / rx } else { 0.0 };
            let ny = if ry > 0.0 { dr as f64 / ry } else { 0.0 };
            if nx * nx + ny * ny <= 1.0 {
                offsets.push((dr, dc));
            }
        }
    }
    offsets
}

/// One footprint's pixels within its own bounding window
struct LocalMask {
    row0: isize,
    col0: isize,
    cells: Array2<bool>,
}

impl LocalMask {
    fn from_spans(spans: &[Span]) -> Option<Self> {
        let row0 = spans.iter().map(|s| s.row).min()?;
        let row1 = spans.iter().map(|s| s.row).max()?;
        let col0 = spans.iter().map(|s| s.start).min()?;
        let col1 = spans.iter().map(|s| s.end).max()?;
        let mut cells = Array2::from_elem((row1 - row0 + 1, col1 - col0), false);
        for span in spans {
            for col in span.start..span.end {
                cells[[span.row - row0, col - col0]] = true;
            }
        }
        Some(Self {
            row0: row0 as isize,
            col0: col0 as isize,
            cells,
        })
    }

    fn contains(&self, r: isize, c: isize) -> bool {
        let (lr, lc) = (r - self.row0, c - self.col0);
        if lr < 0 || lc < 0 {
            return false;
        }
        self.cells
            .get([lr as usize, lc as usize])
            .copied()
            .unwrap_or(false)
    }

    /// Covered pixel with at least one uncovered 4-neighbour
    fn is_edge(&self, r: isize, c: isize) -> bool {
        [(r - 1, c), (r + 1, c), (r, c - 1), (r, c + 1)]
            .iter()
            .any(|&(nr, nc)| !self.contains(nr, nc))
    }
}
