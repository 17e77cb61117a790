use crate::types::{BoundingBox, CrsUnits, GeoTransform, PrepError, PrepResult};

/// Snap tolerance applied before flooring continuous pixel coordinates
const PIXEL_SNAP_EPSILON: f64 = 1e-6;

/// Length of one degree of longitude at the equator (WGS84)
const METRES_PER_DEGREE_LON: f64 = 111_320.0;
/// Mean length of one degree of latitude (WGS84)
const METRES_PER_DEGREE_LAT: f64 = 110_574.0;

/// World-space extent covered by a raster.
pub fn bounding_box(gt: &GeoTransform) -> BoundingBox {
    let far_x = gt.origin_x + gt.pixel_width * gt.width as f64;
    let far_y = gt.origin_y + gt.pixel_height * gt.height as f64;
    BoundingBox::from_corners(gt.origin_x, gt.origin_y, far_x, far_y)
}

/// Overlapping rectangle of two boxes, `None` when they do not overlap on either axis.
///
/// Ranges are closed, so boxes that touch along an edge or at a corner give a
/// zero-width or zero-height box.
pub fn intersect(a: &BoundingBox, b: &BoundingBox) -> Option<BoundingBox> {
    let minx = a.minx.max(b.minx);
    let maxx = a.maxx.min(b.maxx);
    let miny = a.miny.max(b.miny);
    let maxy = a.maxy.min(b.maxy);

    if minx > maxx || miny > maxy {
        return None;
    }
    Some(BoundingBox { minx, miny, maxx, maxy })
}

/// Like [`intersect`] but turns an empty result into [`PrepError::NoOverlap`].
pub fn require_overlap(a: &BoundingBox, b: &BoundingBox) -> PrepResult<BoundingBox> {
    intersect(a, b).ok_or(PrepError::NoOverlap { a: *a, b: *b })
}

/// Pixel <-> world conversion for a single raster
#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    gt: GeoTransform,
}

impl CoordinateMapper {
    pub fn new(gt: GeoTransform) -> PrepResult<Self> {
        gt.validate()?;
        Ok(Self { gt })
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.gt
    }

    /// World coordinates of a (possibly fractional) pixel position.
    pub fn pixel_to_world(&self, px: f64, py: f64) -> (f64, f64) {
        (
            px * self.gt.pixel_width + self.gt.origin_x,
            py * self.gt.pixel_height + self.gt.origin_y,
        )
    }

    /// Continuous pixel position of a world coordinate, without rounding.
    pub fn world_to_pixel_f64(&self, wx: f64, wy: f64) -> (f64, f64) {
        (
            (wx - self.gt.origin_x) / self.gt.pixel_width,
            (wy - self.gt.origin_y) / self.gt.pixel_height,
        )
    }

    /// Integer pixel containing a world coordinate.
    ///
    /// Both axes round toward negative infinity, so rows follow raster row
    /// ordering. Values within 1e-6 of an integer snap to it first, which keeps
    /// `world_to_pixel(pixel_to_world(p)) == p` exact for integer pixels.
    pub fn world_to_pixel(&self, wx: f64, wy: f64) -> (i64, i64) {
        let (px, py) = self.world_to_pixel_f64(wx, wy);
        (snap_floor(px), snap_floor(py))
    }
}

fn snap_floor(value: f64) -> i64 {
    let nearest = value.round();
    if (value - nearest).abs() < PIXEL_SNAP_EPSILON {
        nearest as i64
    } else {
        value.floor() as i64
    }
}

/// Ground size of one pixel in metres, (x, y).
///
/// Degree pixels are scaled at the latitude of the raster centre, with
/// longitude shrinking by its cosine.
pub fn pixel_size_metres(gt: &GeoTransform, units: CrsUnits) -> (f64, f64) {
    let (sx, sy) = (gt.pixel_width.abs(), gt.pixel_height.abs());
    match units {
        CrsUnits::Linear => (sx, sy),
        CrsUnits::Degrees => {
            let centre_lat = gt.origin_y + gt.pixel_height * gt.height as f64 / 2.0;
            let cos_lat = centre_lat.clamp(-90.0, 90.0).to_radians().cos().abs();
            (sx * METRES_PER_DEGREE_LON * cos_lat, sy * METRES_PER_DEGREE_LAT)
        }
    }
}

/// Free-function form of [`CoordinateMapper::pixel_to_world`]
pub fn pixel_to_world(gt: &GeoTransform, px: f64, py: f64) -> (f64, f64) {
    (px * gt.pixel_width + gt.origin_x, py * gt.pixel_height + gt.origin_y)
}

/// Free-function form of [`CoordinateMapper::world_to_pixel`]
pub fn world_to_pixel(gt: &GeoTransform, wx: f64, wy: f64) -> PrepResult<(i64, i64)> {
    Ok(CoordinateMapper::new(*gt)?.world_to_pixel(wx, wy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bbox(minx: f64, miny: f64, maxx: f64, maxy: f64) -> BoundingBox {
        BoundingBox { minx, miny, maxx, maxy }
    }

    #[test]
    fn test_bounding_box_north_up() {
        let gt = GeoTransform::new((100.0, 200.0), (0.5, -0.5), 20, 10).unwrap();
        let b = bounding_box(&gt);
        assert_eq!(b, bbox(100.0, 195.0, 110.0, 200.0));
    }

    #[test]
    fn test_intersection_scenario() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(5.0, 5.0, 15.0, 15.0);
        assert_eq!(intersect(&a, &b), Some(bbox(5.0, 5.0, 10.0, 10.0)));
        assert_eq!(intersect(&a, &b), intersect(&b, &a));
    }

    #[test]
    fn test_intersection_none_when_either_axis_disjoint() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        // overlaps in y only
        assert_eq!(intersect(&a, &bbox(11.0, 2.0, 20.0, 8.0)), None);
        // overlaps in x only
        assert_eq!(intersect(&a, &bbox(2.0, -9.0, 8.0, -1.0)), None);
        // touching edge is a degenerate overlap
        assert_eq!(
            intersect(&a, &bbox(10.0, 0.0, 20.0, 10.0)),
            Some(bbox(10.0, 0.0, 10.0, 10.0))
        );
        assert_eq!(intersect(&a, &bbox(10.0, 10.0, 12.0, 12.0)), Some(bbox(10.0, 10.0, 10.0, 10.0)));
        assert!(matches!(
            require_overlap(&a, &bbox(50.0, 50.0, 60.0, 60.0)),
            Err(PrepError::NoOverlap { .. })
        ));
    }

    #[test]
    fn test_pixel_to_world_scenario() {
        let gt = GeoTransform::new((100.0, 200.0), (0.5, -0.5), 10, 10).unwrap();
        assert_eq!(pixel_to_world(&gt, 0.0, 0.0), (100.0, 200.0));
        assert_eq!(pixel_to_world(&gt, 2.0, 2.0), (101.0, 199.0));
    }

    #[test]
    fn test_affine_round_trip() {
        let gt = GeoTransform::new((-115.3075, 36.1283), (2.7e-6, -2.7e-6), 64, 48).unwrap();
        let mapper = CoordinateMapper::new(gt).unwrap();
        for py in 0..48 {
            for px in 0..64 {
                let (wx, wy) = mapper.pixel_to_world(px as f64, py as f64);
                assert_eq!(mapper.world_to_pixel(wx, wy), (px, py));
            }
        }
    }

    #[test]
    fn test_world_to_pixel_floors_inside_pixel() {
        let gt = GeoTransform::new((0.0, 10.0), (1.0, -1.0), 10, 10).unwrap();
        let mapper = CoordinateMapper::new(gt).unwrap();
        assert_eq!(mapper.world_to_pixel(3.7, 6.2), (3, 3));
        let (fx, fy) = mapper.world_to_pixel_f64(3.7, 6.2);
        assert_relative_eq!(fx, 3.7, epsilon = 1e-12);
        assert_relative_eq!(fy, 3.8, epsilon = 1e-12);
    }

    #[test]
    fn test_pixel_size_in_metres() {
        let utm = GeoTransform::new((500000.0, 4100000.0), (0.3, -0.3), 10, 10).unwrap();
        assert_eq!(pixel_size_metres(&utm, CrsUnits::Linear), (0.3, 0.3));

        let equator = GeoTransform::new((10.0, 0.005), (1e-5, -1e-5), 1000, 1000).unwrap();
        let (mx, my) = pixel_size_metres(&equator, CrsUnits::Degrees);
        assert_relative_eq!(mx, 1.1132, epsilon = 1e-6);
        assert_relative_eq!(my, 1.10574, epsilon = 1e-6);

        let north = GeoTransform::new((10.0, 60.0), (1e-5, -1e-5), 2, 2).unwrap();
        let (mx, _) = pixel_size_metres(&north, CrsUnits::Degrees);
        assert_relative_eq!(mx, 1.1132 / 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_zero_pixel_size_rejected() {
        assert!(matches!(
            GeoTransform::new((0.0, 0.0), (0.0, -1.0), 1, 1),
            Err(PrepError::CoordinateTransform(_))
        ));
        let rotated = GeoTransform::from_gdal([0.0, 1.0, 0.2, 0.0, 0.0, -1.0], 5, 5);
        assert!(rotated.is_err());
    }
}
