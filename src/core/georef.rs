//! Polygons tagged with their coordinate space, and the pixel -> world lift.
//!
//! The space a polygon lives in is part of its type ([`PixelSpace`] or
//! [`WorldSpace`]); the axis order of its vertices is part of its value.
//! Georeferenced polygons are produced in [`AxisOrder::XY`], i.e.
//! (easting/longitude, northing/latitude).

use crate::core::geotransform::CoordinateMapper;
use crate::types::{GeoTransform, PrepError, PrepResult};
use geo::{Area, Contains, Coord, Intersects, Line, LineString, MapCoords, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::marker::PhantomData;

/// Marker for a coordinate space
pub trait CoordSpace: Copy + Debug + Default + Send + Sync + 'static {
    const NAME: &'static str;
}

/// Continuous raster pixel coordinates; pixel (col, row) covers [col, col+1) x [row, row+1)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelSpace;

/// World (map) coordinates of the raster's reference system
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldSpace;

impl CoordSpace for PixelSpace {
    const NAME: &'static str = "pixel";
}

impl CoordSpace for WorldSpace {
    const NAME: &'static str = "world";
}

/// Order of the two components of each vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisOrder {
    /// (x, y): column/easting/longitude first
    XY,
    /// (y, x): row/northing/latitude first
    YX,
}

/// Closed polygon (exterior ring plus optional holes) in space `S`
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonFeature<S: CoordSpace> {
    polygon: Polygon<f64>,
    axis_order: AxisOrder,
    _space: PhantomData<S>,
}

impl<S: CoordSpace> PolygonFeature<S> {
    /// Wrap a polygon whose vertices are in (x, y) order
    pub fn new(polygon: Polygon<f64>) -> Self {
        Self {
            polygon,
            axis_order: AxisOrder::XY,
            _space: PhantomData,
        }
    }

    /// Build from an exterior ring; the ring is closed if it is not already
    pub fn from_ring(vertices: Vec<(f64, f64)>) -> Self {
        Self::new(Polygon::new(LineString::from(vertices), vec![]))
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    pub fn into_polygon(self) -> Polygon<f64> {
        self.polygon
    }

    pub fn axis_order(&self) -> AxisOrder {
        self.axis_order
    }

    /// Exterior vertices in stored axis order, including the closing vertex
    pub fn exterior(&self) -> Vec<(f64, f64)> {
        self.polygon.exterior().coords().map(|c| (c.x, c.y)).collect()
    }

    pub fn interiors(&self) -> Vec<Vec<(f64, f64)>> {
        self.polygon
            .interiors()
            .iter()
            .map(|ring| ring.coords().map(|c| (c.x, c.y)).collect())
            .collect()
    }

    pub fn area(&self) -> f64 {
        self.polygon.unsigned_area()
    }

    /// Copy of this polygon with vertices in `order`
    pub fn with_axis_order(&self, order: AxisOrder) -> Self {
        if order == self.axis_order {
            return self.clone();
        }
        Self {
            polygon: self.polygon.map_coords(|c| Coord { x: c.y, y: c.x }),
            axis_order: order,
            _space: PhantomData,
        }
    }

    /// Polygon in (x, y) order regardless of how it is stored
    pub fn xy_polygon(&self) -> Polygon<f64> {
        match self.axis_order {
            AxisOrder::XY => self.polygon.clone(),
            AxisOrder::YX => self.polygon.map_coords(|c| Coord { x: c.y, y: c.x }),
        }
    }

    /// Reject polygons that cannot be rasterized or serialized meaningfully.
    pub fn validate(&self) -> PrepResult<()> {
        check_polygon(&self.polygon, S::NAME)?;
        if self.area() <= f64::EPSILON {
            return Err(PrepError::InvalidGeometry(format!(
                "{} polygon has zero area",
                S::NAME
            )));
        }
        Ok(())
    }
}

/// Ring vertices without the closing duplicate or repeated points
fn distinct_vertices(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut points: Vec<Coord<f64>> = ring.0.clone();
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// Edges of a ring given by its distinct vertices, including the closing edge
fn ring_edges(points: &[Coord<f64>]) -> Vec<Line<f64>> {
    let n = points.len();
    (0..n).map(|i| Line::new(points[i], points[(i + 1) % n])).collect()
}

/// Signed shoelace area of a ring; positive for counter-clockwise in a y-up frame
pub fn signed_ring_area(ring: &LineString<f64>) -> f64 {
    Polygon::new(ring.clone(), vec![]).signed_area()
}

/// Ring checks: finite coordinates, at least 3 distinct vertices, non-zero
/// area and no self-intersection.
pub fn check_ring(ring: &LineString<f64>, space: &str) -> PrepResult<()> {
    if ring.coords().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(PrepError::InvalidGeometry(format!(
            "{} ring has non-finite coordinates",
            space
        )));
    }
    let points = distinct_vertices(ring);
    if points.len() < 3 {
        return Err(PrepError::InvalidGeometry(format!(
            "{} ring has {} distinct vertices",
            space,
            points.len()
        )));
    }
    if signed_ring_area(&LineString::from(points.clone())).abs() <= f64::EPSILON {
        return Err(PrepError::InvalidGeometry(format!("{} ring is degenerate", space)));
    }

    let edges = ring_edges(&points);
    let n = edges.len();
    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if edges[i].intersects(&edges[j]) {
                return Err(PrepError::InvalidGeometry(format!(
                    "{} ring self-intersects between edges {} and {}",
                    space, i, j
                )));
            }
        }
    }
    Ok(())
}

/// Check `hole` as an interior ring of `exterior` alongside already
/// `accepted` holes: it must be a valid ring, lie inside the exterior, and
/// neither touch nor cross the exterior or any other hole.
pub fn check_hole(
    exterior: &LineString<f64>,
    accepted: &[LineString<f64>],
    hole: &LineString<f64>,
    space: &str,
) -> PrepResult<()> {
    check_ring(hole, space)?;
    let hole_points = distinct_vertices(hole);
    let hole_edges = ring_edges(&hole_points);
    let touches = |other: &LineString<f64>| {
        let other_edges = ring_edges(&distinct_vertices(other));
        hole_edges
            .iter()
            .any(|a| other_edges.iter().any(|b| a.intersects(b)))
    };

    if touches(exterior) {
        return Err(PrepError::InvalidGeometry(format!(
            "{} hole touches its exterior ring",
            space
        )));
    }
    let outer = Polygon::new(exterior.clone(), vec![]);
    if !outer.contains(&Point::from(hole_points[0])) {
        return Err(PrepError::InvalidGeometry(format!(
            "{} hole lies outside its exterior ring",
            space
        )));
    }
    for other in accepted {
        let nested = Polygon::new(other.clone(), vec![]).contains(&Point::from(hole_points[0]))
            || Polygon::new(hole.clone(), vec![]).contains(&Point::from(other.0[0]));
        if touches(other) || nested {
            return Err(PrepError::InvalidGeometry(format!(
                "{} hole overlaps another hole",
                space
            )));
        }
    }
    Ok(())
}

/// Full polygon validity: every ring valid, holes strictly inside the
/// exterior and disjoint from each other.
pub fn check_polygon(polygon: &Polygon<f64>, space: &str) -> PrepResult<()> {
    check_ring(polygon.exterior(), space)?;
    let interiors = polygon.interiors();
    for (i, hole) in interiors.iter().enumerate() {
        check_hole(polygon.exterior(), &interiors[..i], hole, space)?;
    }
    Ok(())
}

/// Lifts pixel-space polygons into world space for one raster
#[derive(Debug, Clone, Copy)]
pub struct PolygonGeoreferencer {
    mapper: CoordinateMapper,
}

impl PolygonGeoreferencer {
    pub fn new(gt: GeoTransform) -> PrepResult<Self> {
        Ok(Self {
            mapper: CoordinateMapper::new(gt)?,
        })
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    /// Map every vertex through `pixel_to_world`, keeping order and ring closure.
    pub fn to_world(&self, poly: &PolygonFeature<PixelSpace>) -> PolygonFeature<WorldSpace> {
        let mapper = self.mapper;
        let world = poly.xy_polygon().map_coords(|c| {
            let (x, y) = mapper.pixel_to_world(c.x, c.y);
            Coord { x, y }
        });
        PolygonFeature::new(world)
    }

    /// Inverse mapping into continuous (unrounded) pixel coordinates
    pub fn to_pixel(&self, poly: &PolygonFeature<WorldSpace>) -> PolygonFeature<PixelSpace> {
        let mapper = self.mapper;
        let pixel = poly.xy_polygon().map_coords(|c| {
            let (x, y) = mapper.world_to_pixel_f64(c.x, c.y);
            Coord { x, y }
        });
        PolygonFeature::new(pixel)
    }
}

/// Georeference a single pixel-space polygon
pub fn georeference_polygon(
    gt: &GeoTransform,
    poly: &PolygonFeature<PixelSpace>,
) -> PrepResult<PolygonFeature<WorldSpace>> {
    Ok(PolygonGeoreferencer::new(*gt)?.to_world(poly))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x: f64, y: f64, side: f64) -> Vec<(f64, f64)> {
        vec![(x, y), (x + side, y), (x + side, y + side), (x, y + side)]
    }

    #[test]
    fn test_georeference_keeps_order_and_closure() {
        let gt = GeoTransform::new((100.0, 200.0), (0.5, -0.5), 10, 10).unwrap();
        let pixel = PolygonFeature::<PixelSpace>::from_ring(square(0.0, 0.0, 2.0));
        let world = georeference_polygon(&gt, &pixel).unwrap();

        assert_eq!(world.axis_order(), AxisOrder::XY);
        let ring = world.exterior();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
        assert_eq!(ring[0], (100.0, 200.0));
        assert_eq!(ring[1], (101.0, 200.0));
        assert_eq!(ring[2], (101.0, 199.0));
        assert_relative_eq!(world.area(), 1.0);
    }

    #[test]
    fn test_world_to_pixel_inverts() {
        let gt = GeoTransform::new((100.0, 200.0), (0.5, -0.5), 10, 10).unwrap();
        let geo = PolygonGeoreferencer::new(gt).unwrap();
        let pixel = PolygonFeature::<PixelSpace>::from_ring(square(1.0, 2.0, 3.0));
        let back = geo.to_pixel(&geo.to_world(&pixel));
        for (a, b) in back.exterior().iter().zip(pixel.exterior()) {
            assert_relative_eq!(a.0, b.0, epsilon = 1e-9);
            assert_relative_eq!(a.1, b.1, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_axis_order_swap_is_explicit() {
        let world = PolygonFeature::<WorldSpace>::from_ring(vec![(10.0, 50.0), (11.0, 50.0), (11.0, 51.0)]);
        let yx = world.with_axis_order(AxisOrder::YX);
        assert_eq!(yx.axis_order(), AxisOrder::YX);
        assert_eq!(yx.exterior()[0], (50.0, 10.0));
        assert_eq!(yx.xy_polygon(), *world.polygon());
    }

    #[test]
    fn test_validity_checks() {
        assert!(PolygonFeature::<PixelSpace>::from_ring(square(0.0, 0.0, 4.0)).validate().is_ok());

        let bowtie = PolygonFeature::<PixelSpace>::from_ring(vec![(0.0, 0.0), (4.0, 4.0), (4.0, 0.0), (0.0, 4.0)]);
        assert!(matches!(bowtie.validate(), Err(PrepError::InvalidGeometry(_))));

        let line = PolygonFeature::<PixelSpace>::from_ring(vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert!(line.validate().is_err());

        let two = PolygonFeature::<PixelSpace>::from_ring(vec![(0.0, 0.0), (1.0, 1.0), (1.0, 1.0)]);
        assert!(two.validate().is_err());

        let nan = PolygonFeature::<WorldSpace>::from_ring(vec![(0.0, 0.0), (f64::NAN, 1.0), (1.0, 0.0)]);
        assert!(nan.validate().is_err());
    }

    fn ring(points: Vec<(f64, f64)>) -> LineString<f64> {
        let mut ring = LineString::from(points);
        ring.close();
        ring
    }

    #[test]
    fn test_hole_placement_checked_against_exterior() {
        let exterior = ring(square(0.0, 0.0, 10.0));
        let inside = ring(square(2.0, 2.0, 3.0));
        assert!(PolygonFeature::<PixelSpace>::new(Polygon::new(exterior.clone(), vec![inside.clone()]))
            .validate()
            .is_ok());

        // hole vertex on the exterior edge
        let touching = ring(vec![(0.0, 4.0), (3.0, 3.0), (3.0, 5.0)]);
        // hole crossing the exterior
        let crossing = ring(square(8.0, 4.0, 4.0));
        // hole entirely outside
        let outside = ring(square(20.0, 20.0, 2.0));
        // two holes overlapping each other
        let overlapping = ring(square(3.0, 3.0, 3.0));
        for interiors in [
            vec![touching],
            vec![crossing],
            vec![outside],
            vec![inside.clone(), overlapping],
            vec![inside.clone(), inside],
        ] {
            let polygon = PolygonFeature::<PixelSpace>::new(Polygon::new(exterior.clone(), interiors));
            assert!(matches!(polygon.validate(), Err(PrepError::InvalidGeometry(_))));
        }
    }

    #[test]
    fn test_ring_orientation_sign() {
        let ccw = ring(square(0.0, 0.0, 2.0));
        assert_relative_eq!(signed_ring_area(&ccw), 4.0);
        let cw = ring(square(0.0, 0.0, 2.0).into_iter().rev().collect());
        assert_relative_eq!(signed_ring_area(&cw), -4.0);
    }
}
