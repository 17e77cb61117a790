use geo::{Coord, Polygon};
use ndarray::Array2;

/// Horizontal run of covered pixels: row, first column, one-past-last column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub row: usize,
    pub start: usize,
    pub end: usize,
}

/// Scanline fill of a pixel-space polygon into spans, clipped to `shape` (rows, cols).
///
/// A pixel is covered when its centre lies inside the polygon under the
/// even-odd rule, so interior rings punch holes.
pub fn polygon_spans(polygon: &Polygon<f64>, shape: (usize, usize)) -> Vec<Span> {
    let (rows, cols) = shape;
    let mut edges: Vec<(Coord<f64>, Coord<f64>)> = Vec::new();
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
        for line in ring.lines() {
            edges.push((line.start, line.end));
            min_y = min_y.min(line.start.y).min(line.end.y);
            max_y = max_y.max(line.start.y).max(line.end.y);
        }
    }
    if edges.is_empty() || rows == 0 || cols == 0 || !min_y.is_finite() || !max_y.is_finite() {
        return Vec::new();
    }

    let first_row = (min_y - 0.5).ceil().max(0.0) as usize;
    let last_row = ((max_y - 0.5).floor().max(-1.0) + 1.0).min(rows as f64) as usize;

    let mut spans = Vec::new();
    let mut crossings: Vec<f64> = Vec::new();
    for row in first_row..last_row {
        let yc = row as f64 + 0.5;
        crossings.clear();
        for (p, q) in &edges {
            if (p.y <= yc) != (q.y <= yc) {
                crossings.push(p.x + (yc - p.y) * (q.x - p.x) / (q.y - p.y));
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        for pair in crossings.chunks_exact(2) {
            let start = (pair[0] - 0.5).ceil().clamp(0.0, cols as f64) as usize;
            let end = (pair[1] - 0.5).ceil().clamp(0.0, cols as f64) as usize;
            if end > start {
                spans.push(Span { row, start, end });
            }
        }
    }
    spans
}

/// Set every pixel covered by `spans`
pub fn burn(mask: &mut Array2<bool>, spans: &[Span]) {
    for span in spans {
        for col in span.start..span.end {
            mask[[span.row, col]] = true;
        }
    }
}
