use crate::config::TilerConfig;
use crate::core::geotransform::{bounding_box, intersect, CoordinateMapper};
use crate::io::raster::{RasterData, RasterSource};
use crate::types::{BoundingBox, GeoTransform, PixelWindow, PrepError, PrepResult};
use serde::{Deserialize, Serialize};

/// Relative tolerance when comparing pixel sizes of paired rasters
const RESOLUTION_TOLERANCE: f64 = 1e-6;

/// One tile of a [`TilePlan`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileSpec {
    /// Row-major position in the plan
    pub index: usize,
    pub row: usize,
    pub col: usize,
    /// Window relative to the plan grid origin
    pub pixel_window: PixelWindow,
    pub world_bbox: BoundingBox,
}

/// Tile grid computed once over a bounding box.
///
/// A plan is immutable after construction; paired rasters are cut from the
/// same instance so that corresponding tiles cover identical world rectangles.
#[derive(Debug, Clone, PartialEq)]
pub struct TilePlan {
    bbox: BoundingBox,
    grid: GeoTransform,
    tile_width: usize,
    tile_height: usize,
    rows: usize,
    cols: usize,
    tiles: Vec<TileSpec>,
}

impl TilePlan {
    /// Partition `bbox` into row-major tiles of `tile_width` x `tile_height` pixels
    /// at the given pixel size. Edge tiles are clipped, never padded.
    pub fn new(
        bbox: BoundingBox,
        pixel_size: (f64, f64),
        tile_width: usize,
        tile_height: usize,
    ) -> PrepResult<Self> {
        if tile_width == 0 || tile_height == 0 {
            return Err(PrepError::InvalidConfig(format!(
                "tile size must be non-zero, got {}x{}",
                tile_width, tile_height
            )));
        }
        let (sx, sy) = pixel_size;

        let extent_x = (bbox.width() / sx.abs()).round() as usize;
        let extent_y = (bbox.height() / sy.abs()).round() as usize;

        // Anchor the grid at the corner that pixel (0, 0) of a raster with this
        // pixel size would occupy.
        let origin_x = if sx > 0.0 { bbox.minx } else { bbox.maxx };
        let origin_y = if sy < 0.0 { bbox.maxy } else { bbox.miny };
        let grid = GeoTransform::new((origin_x, origin_y), (sx, sy), extent_x, extent_y)?;

        let cols = extent_x.div_ceil(tile_width);
        let rows = extent_y.div_ceil(tile_height);

        let mut tiles = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let x = col * tile_width;
                let y = row * tile_height;
                let width = tile_width.min(extent_x - x);
                let height = tile_height.min(extent_y - y);
                let window = PixelWindow { x, y, width, height };
                tiles.push(TileSpec {
                    index: tiles.len(),
                    row,
                    col,
                    pixel_window: window,
                    world_bbox: window_bbox(&grid, &window),
                });
            }
        }

        log::debug!(
            "Tile plan: {}x{} pixels, {}x{} tiles of {}x{}",
            extent_x,
            extent_y,
            cols,
            rows,
            tile_width,
            tile_height
        );

        Ok(Self {
            bbox,
            grid,
            tile_width,
            tile_height,
            rows,
            cols,
            tiles,
        })
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Pixel grid the tile windows are expressed in
    pub fn grid(&self) -> &GeoTransform {
        &self.grid
    }

    pub fn tiles(&self) -> &[TileSpec] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// (rows, cols) of the tile grid
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn tile_size(&self) -> (usize, usize) {
        (self.tile_width, self.tile_height)
    }

    pub fn tile(&self, row: usize, col: usize) -> Option<&TileSpec> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.tiles.get(row * self.cols + col)
    }

    /// Georeferencing of one tile, derived from the plan grid
    pub fn tile_geo_transform(&self, spec: &TileSpec) -> GeoTransform {
        let mapper_origin = (
            self.grid.origin_x + spec.pixel_window.x as f64 * self.grid.pixel_width,
            self.grid.origin_y + spec.pixel_window.y as f64 * self.grid.pixel_height,
        );
        GeoTransform {
            origin_x: mapper_origin.0,
            origin_y: mapper_origin.1,
            pixel_width: self.grid.pixel_width,
            pixel_height: self.grid.pixel_height,
            width: spec.pixel_window.width,
            height: spec.pixel_window.height,
        }
    }
}

fn window_bbox(grid: &GeoTransform, window: &PixelWindow) -> BoundingBox {
    let x0 = grid.origin_x + window.x as f64 * grid.pixel_width;
    let y0 = grid.origin_y + window.y as f64 * grid.pixel_height;
    let x1 = grid.origin_x + (window.x + window.width) as f64 * grid.pixel_width;
    let y1 = grid.origin_y + (window.y + window.height) as f64 * grid.pixel_height;
    BoundingBox::from_corners(x0, y0, x1, y1)
}

/// A tile cut from one raster using a shared plan
#[derive(Debug, Clone)]
pub struct RasterTile {
    pub spec: TileSpec,
    /// Window the tile was read from, in the source raster's own pixel grid
    pub source_window: PixelWindow,
    pub data: RasterData,
}

/// Cuts two rasters along one shared tile grid
#[derive(Debug, Clone)]
pub struct PairedTiler {
    config: TilerConfig,
}

impl PairedTiler {
    pub fn new(config: TilerConfig) -> PrepResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Plan tiles over the intersection of two rasters.
    ///
    /// Fails with [`PrepError::NoOverlap`] when the rasters share no area and
    /// with [`PrepError::ResolutionMismatch`] when their pixel sizes differ.
    pub fn plan(&self, a: &GeoTransform, b: &GeoTransform) -> PrepResult<TilePlan> {
        a.validate()?;
        b.validate()?;
        check_same_resolution(a, b)?;

        let bbox_a = bounding_box(a);
        let bbox_b = bounding_box(b);
        let shared = intersect(&bbox_a, &bbox_b).ok_or(PrepError::NoOverlap {
            a: bbox_a,
            b: bbox_b,
        })?;

        let plan = TilePlan::new(
            shared,
            (a.pixel_width, a.pixel_height),
            self.config.tile_width,
            self.config.tile_height,
        )?;
        if plan.is_empty() {
            // Overlap narrower than one pixel
            return Err(PrepError::NoOverlap { a: bbox_a, b: bbox_b });
        }

        log::info!(
            "Planned {} tiles over shared extent {:?}",
            plan.len(),
            plan.bbox()
        );
        Ok(plan)
    }

    /// Plan tiles directly from two sources
    pub fn plan_sources(
        &self,
        a: &dyn RasterSource,
        b: &dyn RasterSource,
    ) -> PrepResult<TilePlan> {
        self.plan(&a.geo_transform()?, &b.geo_transform()?)
    }

    /// Window covering `spec` in the pixel grid of a raster with transform `gt`.
    pub fn source_window(
        &self,
        gt: &GeoTransform,
        plan: &TilePlan,
        spec: &TileSpec,
    ) -> PrepResult<PixelWindow> {
        check_same_resolution(gt, plan.grid())?;
        let mapper = CoordinateMapper::new(*gt)?;
        let tile_gt = plan.tile_geo_transform(spec);
        let (fx, fy) = mapper.world_to_pixel_f64(tile_gt.origin_x, tile_gt.origin_y);

        let width = spec.pixel_window.width;
        let height = spec.pixel_window.height;
        if width > gt.width || height > gt.height {
            return Err(PrepError::Raster(format!(
                "tile {} ({}x{}) larger than raster ({}x{})",
                spec.index, width, height, gt.width, gt.height
            )));
        }

        // Sub-pixel misregistration between the rasters rounds to the nearest
        // pixel; the clamp only absorbs that rounding at the far edges.
        let x = (fx.round().max(0.0) as usize).min(gt.width - width);
        let y = (fy.round().max(0.0) as usize).min(gt.height - height);
        Ok(PixelWindow { x, y, width, height })
    }

    /// Cut one tile of `plan` out of `source`.
    pub fn cut_tile(
        &self,
        source: &dyn RasterSource,
        plan: &TilePlan,
        spec: &TileSpec,
    ) -> PrepResult<RasterTile> {
        let gt = source.geo_transform()?;
        let window = self.source_window(&gt, plan, spec)?;
        log::debug!(
            "Cutting tile {} of {} from window {:?}",
            spec.index,
            source.name(),
            window
        );
        let bands = source.read_window(window)?;
        let data = RasterData::new(plan.tile_geo_transform(spec), bands)?.with_metadata_of(source);
        Ok(RasterTile {
            spec: *spec,
            source_window: window,
            data,
        })
    }

    /// Cut every tile of `plan` from `source`, in plan order.
    pub fn cut_all(
        &self,
        source: &dyn RasterSource,
        plan: &TilePlan,
    ) -> PrepResult<Vec<RasterTile>> {
        plan.tiles()
            .iter()
            .map(|spec| self.cut_tile(source, plan, spec))
            .collect()
    }
}

fn check_same_resolution(a: &GeoTransform, b: &GeoTransform) -> PrepResult<()> {
    let close = |p: f64, q: f64| (p - q).abs() <= RESOLUTION_TOLERANCE * p.abs().max(q.abs());
    if !close(a.pixel_width, b.pixel_width) || !close(a.pixel_height, b.pixel_height) {
        return Err(PrepError::ResolutionMismatch(format!(
            "({}, {}) vs ({}, {})",
            a.pixel_width, a.pixel_height, b.pixel_width, b.pixel_height
        )));
    }
    Ok(())
}

/// Output name of a tile: `{stem}_{minx}_{maxy}`
pub fn tile_name(stem: &str, spec: &TileSpec) -> String {
    format!("{}_{}_{}", stem, spec.world_bbox.minx, spec.world_bbox.maxy)
}
