use crate::config::VectorizeConfig;
use crate::core::georef::{check_hole, check_ring, signed_ring_area, PixelSpace, PolygonFeature};
use crate::types::{ClassMask, PrepResult};
use geo::{Area, Contains, Coord, LineString, Point, Polygon, Simplify};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Edge midpoint in doubled pixel coordinates, so every vertex is integral
type Key = (i64, i64);

/// Extracts simplified polygons from the interior class of a mask
#[derive(Debug, Clone)]
pub struct ContourVectorizer {
    config: VectorizeConfig,
}

impl ContourVectorizer {
    pub fn new(config: VectorizeConfig) -> PrepResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Trace, simplify and validate polygons around pixels equal to the
    /// foreground code. The order of the returned polygons carries no meaning.
    ///
    /// Rings that simplify to fewer than 3 vertices, zero area or a
    /// self-intersection are dropped. A simplified hole that touches its
    /// exterior or an earlier hole, or leaves the exterior, is dropped on its
    /// own; the rest of the polygon is kept.
    pub fn vectorize(&self, mask: &ClassMask) -> Vec<PolygonFeature<PixelSpace>> {
        let foreground = mask.mapv(|v| v == self.config.foreground);
        let rings: Vec<LineString<f64>> = trace_rings(&foreground).into_iter().map(LineString::from).collect();

        let (exteriors, holes): (Vec<LineString<f64>>, Vec<LineString<f64>>) =
            rings.into_iter().partition(|ring| signed_ring_area(ring) > 0.0);

        let mut holes_of: Vec<Vec<LineString<f64>>> = vec![Vec::new(); exteriors.len()];
        for hole in holes {
            if let Some(owner) = enclosing_ring(&exteriors, hole.0[0]) {
                holes_of[owner].push(hole);
            }
        }

        let mut polygons = Vec::new();
        let mut dropped = 0usize;
        let mut dropped_holes = 0usize;
        for (exterior, holes) in exteriors.into_iter().zip(holes_of) {
            let exterior = self.simplify_ring(exterior);
            if let Err(e) = check_ring(&exterior, "pixel") {
                log::debug!("Dropping contour: {}", e);
                dropped += 1;
                continue;
            }

            let mut interiors: Vec<LineString<f64>> = Vec::with_capacity(holes.len());
            for hole in holes {
                let hole = self.simplify_ring(hole);
                match check_hole(&exterior, &interiors, &hole, "pixel") {
                    Ok(()) => interiors.push(hole),
                    Err(e) => {
                        log::debug!("Dropping hole: {}", e);
                        dropped_holes += 1;
                    }
                }
            }

            let polygon = PolygonFeature::new(Polygon::new(exterior, interiors));
            if let Err(e) = polygon.validate() {
                log::debug!("Dropping contour: {}", e);
                dropped += 1;
                continue;
            }
            polygons.push(polygon);
        }

        log::debug!(
            "Vectorized {} polygons ({} degenerate contours, {} holes dropped)",
            polygons.len(),
            dropped,
            dropped_holes
        );
        polygons
    }

    fn simplify_ring(&self, mut ring: LineString<f64>) -> LineString<f64> {
        ring.close();
        if self.config.tolerance == 0.0 {
            return ring;
        }
        ring.simplify(&self.config.tolerance)
    }
}

/// Marching squares over pixel centres at the 0.5 level.
///
/// Returns closed rings (first vertex not repeated) oriented so that
/// exteriors have positive shoelace area and holes negative. Diagonally
/// touching foreground pixels are kept apart.
pub fn trace_rings(foreground: &Array2<bool>) -> Vec<Vec<Coord<f64>>> {
    let (rows, cols) = foreground.dim();
    let sample = |r: isize, c: isize| -> bool {
        r >= 0
            && c >= 0
            && (r as usize) < rows
            && (c as usize) < cols
            && foreground[[r as usize, c as usize]]
    };

    let mut next: BTreeMap<Key, Key> = BTreeMap::new();
    for r in -1..rows as isize {
        for c in -1..cols as isize {
            let tl = sample(r, c);
            let tr = sample(r, c + 1);
            let br = sample(r + 1, c + 1);
            let bl = sample(r + 1, c);

            let (r2, c2) = (2 * r as i64, 2 * c as i64);
            let top = (c2 + 2, r2 + 1);
            let bottom = (c2 + 2, r2 + 3);
            let left = (c2 + 1, r2 + 2);
            let right = (c2 + 3, r2 + 2);

            let segments: &[(Key, Key)] = match (tl, tr, br, bl) {
                (false, false, false, false) | (true, true, true, true) => &[],
                (true, false, false, false) => &[(top, left)],
                (false, true, false, false) => &[(right, top)],
                (false, false, true, false) => &[(bottom, right)],
                (false, false, false, true) => &[(left, bottom)],
                (true, true, false, false) => &[(right, left)],
                (false, false, true, true) => &[(left, right)],
                (true, false, false, true) => &[(top, bottom)],
                (false, true, true, false) => &[(bottom, top)],
                (false, true, true, true) => &[(left, top)],
                (true, false, true, true) => &[(top, right)],
                (true, true, false, true) => &[(right, bottom)],
                (true, true, true, false) => &[(bottom, left)],
                (true, false, true, false) => &[(top, left), (bottom, right)],
                (false, true, false, true) => &[(right, top), (left, bottom)],
            };
            for &(from, to) in segments {
                next.insert(from, to);
            }
        }
    }

    let mut rings = Vec::new();
    while let Some((&start, _)) = next.iter().next() {
        let mut ring = Vec::new();
        let mut current = start;
        while let Some(to) = next.remove(&current) {
            ring.push(Coord {
                x: current.0 as f64 / 2.0,
                y: current.1 as f64 / 2.0,
            });
            current = to;
            if current == start {
                break;
            }
        }
        if ring.len() >= 3 {
            rings.push(ring);
        }
    }
    rings
}

/// Index of the smallest ring containing `point`
fn enclosing_ring(rings: &[LineString<f64>], point: Coord<f64>) -> Option<usize> {
    let point = Point::from(point);
    rings
        .iter()
        .map(|ring| Polygon::new(ring.clone(), vec![]))
        .enumerate()
        .filter(|(_, outline)| outline.contains(&point))
        .map(|(i, outline)| (i, outline.signed_area().abs()))
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}
