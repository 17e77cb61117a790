use ndarray::{Array2, ArrayView1, ArrayViewMut1, Axis};

/// Binary dilation with a (2r+1) x (2r+1) square structuring element
pub fn dilate(mask: &Array2<bool>, radius: usize) -> Array2<bool> {
    separable(mask, radius, |window| window.iter().any(|&v| v))
}

/// Binary erosion with a (2r+1) x (2r+1) square structuring element.
///
/// Pixels beyond the raster edge are ignored rather than treated as
/// background, so footprints cut by a tile edge keep no boundary along it.
pub fn erode(mask: &Array2<bool>, radius: usize) -> Array2<bool> {
    separable(mask, radius, |window| window.iter().all(|&v| v))
}

fn separable<F>(mask: &Array2<bool>, radius: usize, reduce: F) -> Array2<bool>
where
    F: Fn(ArrayView1<bool>) -> bool + Copy,
{
    if radius == 0 {
        return mask.clone();
    }
    let mut horizontal = Array2::from_elem(mask.dim(), false);
    for (src, dst) in mask.axis_iter(Axis(0)).zip(horizontal.axis_iter_mut(Axis(0))) {
        filter_line(src, dst, radius, reduce);
    }
    let mut output = Array2::from_elem(mask.dim(), false);
    for (src, dst) in horizontal.axis_iter(Axis(1)).zip(output.axis_iter_mut(Axis(1))) {
        filter_line(src, dst, radius, reduce);
    }
    output
}

fn filter_line<F>(src: ArrayView1<bool>, mut dst: ArrayViewMut1<bool>, radius: usize, reduce: F)
where
    F: Fn(ArrayView1<bool>) -> bool,
{
    let n = src.len();
    for i in 0..n {
        let lo = i.saturating_sub(radius);
        let hi = (i + radius + 1).min(n);
        dst[i] = reduce(src.slice(ndarray::s![lo..hi]));
    }
}
