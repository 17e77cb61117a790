use crate::io::output::write_atomic;
use crate::types::{ClassMask, PrepError, PrepResult};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use ndarray::{s, Array2, Array3};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// JPEG quality used for 8-bit previews
pub const JPEG_QUALITY: u8 = 95;

fn dimensions(rows: usize, cols: usize) -> PrepResult<(u32, u32)> {
    let w = u32::try_from(cols).map_err(|_| PrepError::Raster(format!("image too wide: {}", cols)))?;
    let h = u32::try_from(rows).map_err(|_| PrepError::Raster(format!("image too tall: {}", rows)))?;
    Ok((w, h))
}

/// Single-channel 8-bit PNG of the class codes
pub fn encode_mask_png(mask: &ClassMask) -> PrepResult<Vec<u8>> {
    let (rows, cols) = mask.dim();
    let (w, h) = dimensions(rows, cols)?;
    let pixels: Vec<u8> = mask.iter().copied().collect();

    let mut bytes = Vec::new();
    PngEncoder::new(Cursor::new(&mut bytes)).write_image(&pixels, w, h, ColorType::L8)?;
    Ok(bytes)
}

pub fn write_mask_png<P: AsRef<Path>>(path: P, mask: &ClassMask) -> PrepResult<PathBuf> {
    write_atomic(path, &encode_mask_png(mask)?)
}

/// Read a mask back as class codes. Colour images are reduced to luma.
pub fn read_mask_png<P: AsRef<Path>>(path: P) -> PrepResult<ClassMask> {
    let gray = image::open(path.as_ref())?.to_luma8();
    let (w, h) = gray.dimensions();
    Array2::from_shape_vec((h as usize, w as usize), gray.into_raw())
        .map_err(|e| PrepError::Raster(format!("{}: {}", path.as_ref().display(), e)))
}

/// Encode (rows, cols, channels) 8-bit pixels as JPEG.
/// One channel is written as grayscale; three or more as RGB from the first three.
pub fn encode_jpeg(pixels: &Array3<u8>, quality: u8) -> PrepResult<Vec<u8>> {
    let (rows, cols, channels) = pixels.dim();
    let (w, h) = dimensions(rows, cols)?;
    let (data, color): (Vec<u8>, ColorType) = match channels {
        1 => (pixels.iter().copied().collect(), ColorType::L8),
        c if c >= 3 => (
            pixels.slice(s![.., .., 0..3]).iter().copied().collect(),
            ColorType::Rgb8,
        ),
        c => {
            return Err(PrepError::Raster(format!(
                "cannot encode {} channels as JPEG",
                c
            )))
        }
    };

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(Cursor::new(&mut bytes), quality).write_image(&data, w, h, color)?;
    Ok(bytes)
}
