use crate::types::{Band, BandStack};
use ndarray::{Array2, Array3, Axis};

/// Linear min/max stretch of one band to 0..=255.
///
/// Non-finite and nodata samples map to 0 and are excluded from the
/// statistics. A constant band maps to 0 everywhere.
pub fn rescale_band_u8(band: &Band, nodata: Option<f64>) -> Array2<u8> {
    let is_valid = |v: f32| v.is_finite() && nodata.map_or(true, |nd| (v as f64) != nd);

    let (min, max) = band
        .iter()
        .copied()
        .filter(|&v| is_valid(v))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return Array2::zeros(band.dim());
    }

    band.mapv(|v| {
        if !is_valid(v) {
            return 0;
        }
        (((v - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8
    })
}

/// Rescale each of the first `max_bands` bands independently.
/// Output layout is (rows, cols, channels), ready for interleaved image encoders.
pub fn rescale_stack_u8(bands: &BandStack, nodata: Option<f64>, max_bands: usize) -> Array3<u8> {
    let (count, rows, cols) = bands.dim();
    let channels = count.min(max_bands);
    let mut out = Array3::<u8>::zeros((rows, cols, channels));
    for (i, band) in bands.axis_iter(Axis(0)).take(channels).enumerate() {
        let scaled = rescale_band_u8(&band.to_owned(), nodata);
        out.index_axis_mut(Axis(2), i).assign(&scaled);
    }
    out
}
