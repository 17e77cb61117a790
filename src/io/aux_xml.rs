//! GDAL PAM sidecar (`<image>.aux.xml`) carrying the georeferencing of
//! images written without embedded metadata (PNG masks, JPEG previews).
//!
//! ```xml
//! <PAMDataset>
//!   <SRS>GEOGCS["WGS 84", ...]</SRS>
//!   <GeoTransform> 1.0e2, 5.0e-1, 0.0e0, 2.0e2, 0.0e0, -5.0e-1</GeoTransform>
//! </PAMDataset>
//! ```

use crate::io::output::write_atomic;
use crate::types::{GeoTransform, PrepError, PrepResult};
use quick_xml::de::from_str;
use quick_xml::escape::escape;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct PamDataset {
    #[serde(rename = "SRS", default)]
    srs: Option<SrsElement>,
    #[serde(rename = "GeoTransform", default)]
    geo_transform: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SrsElement {
    #[serde(rename = "$text", default)]
    wkt: String,
}

/// Georeferencing recovered from a sidecar
#[derive(Debug, Clone, PartialEq)]
pub struct PamMetadata {
    pub srs: Option<String>,
    pub geo_transform: GeoTransform,
}

/// `mask.png` -> `mask.png.aux.xml`
pub fn sidecar_path<P: AsRef<Path>>(image: P) -> PathBuf {
    let mut name = image.as_ref().as_os_str().to_os_string();
    name.push(".aux.xml");
    PathBuf::from(name)
}

/// Parse sidecar text for an image of `width` x `height` pixels.
///
/// A missing, malformed or rotated transform is a `CoordinateTransform`
/// error: without it the image cannot be mapped back to world space.
pub fn parse_aux_xml(xml: &str, width: usize, height: usize) -> PrepResult<PamMetadata> {
    let pam: PamDataset = from_str(xml)
        .map_err(|e| PrepError::Xml(format!("Failed to parse PAM sidecar: {}", e)))?;

    let text = pam
        .geo_transform
        .ok_or_else(|| PrepError::CoordinateTransform("sidecar has no GeoTransform".to_string()))?;

    let values: Vec<f64> = text
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| {
            PrepError::CoordinateTransform(format!("unparsable GeoTransform '{}': {}", text.trim(), e))
        })?;
    let coeffs: [f64; 6] = values.try_into().map_err(|v: Vec<f64>| {
        PrepError::CoordinateTransform(format!("GeoTransform has {} coefficients, expected 6", v.len()))
    })?;

    let srs = pam
        .srs
        .map(|s| s.wkt.trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(PamMetadata {
        srs,
        geo_transform: GeoTransform::from_gdal(coeffs, width, height)?,
    })
}

pub fn read_aux_xml<P: AsRef<Path>>(image: P, width: usize, height: usize) -> PrepResult<PamMetadata> {
    let path = sidecar_path(&image);
    log::debug!("Reading PAM sidecar: {}", path.display());
    let xml = std::fs::read_to_string(&path)?;
    parse_aux_xml(&xml, width, height)
}

pub fn render_aux_xml(gt: &GeoTransform, srs: Option<&str>) -> String {
    let coeffs = gt
        .to_gdal()
        .iter()
        .map(|c| format!("{:.16e}", c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut xml = String::from("<PAMDataset>\n");
    if let Some(srs) = srs {
        xml.push_str(&format!("  <SRS>{}</SRS>\n", escape(srs)));
    }
    xml.push_str(&format!("  <GeoTransform> {}</GeoTransform>\n", coeffs));
    xml.push_str("</PAMDataset>\n");
    xml
}

/// Write the sidecar next to `image`, returning the sidecar path
pub fn write_aux_xml<P: AsRef<Path>>(image: P, gt: &GeoTransform, srs: Option<&str>) -> PrepResult<PathBuf> {
    gt.validate()?;
    write_atomic(sidecar_path(image), render_aux_xml(gt, srs).as_bytes())
}
