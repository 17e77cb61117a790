use crate::io::raster::{RasterData, RasterSink, RasterSource};
use crate::types::{PrepError, PrepResult};
use ndarray::Axis;
use std::path::PathBuf;

/// Outcome of splitting one raster
#[derive(Debug, Default)]
pub struct BandSplitReport {
    /// Paths of single-band rasters that were written, in band order
    pub written: Vec<PathBuf>,
    /// Bands (1-based) whose write failed, with the cause
    pub failed: Vec<(usize, PrepError)>,
}

/// Fans a multi-band raster out into single-band rasters
#[derive(Debug, Clone)]
pub struct BandSplitter {
    extension: String,
}

impl BandSplitter {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// Output name for band `index` (1-based): `{stem}_band{index}.{ext}`
    pub fn band_name(&self, stem: &str, index: usize) -> String {
        format!("{}_band{}.{}", stem, index, self.extension)
    }

    /// Write every band of `source` as its own raster.
    ///
    /// A failed band write is recorded and the remaining bands are still
    /// attempted; bands already written stay in place.
    pub fn split(
        &self,
        source: &dyn RasterSource,
        stem: &str,
        sink: &dyn RasterSink,
    ) -> PrepResult<BandSplitReport> {
        let gt = source.geo_transform()?;
        let window = source.full_window()?;
        let count = source.band_count();
        log::info!("Splitting {} into {} single-band rasters", source.name(), count);

        let mut report = BandSplitReport::default();
        for index in 1..=count {
            let name = self.band_name(stem, index);
            let result = source.read_band(index, window).and_then(|band| {
                let data = RasterData::new(gt, band.insert_axis(Axis(0)))?.with_metadata_of(source);
                sink.write(&name, &data)
            });
            match result {
                Ok(path) => {
                    log::debug!("Wrote band {} to {}", index, path.display());
                    report.written.push(path);
                }
                Err(e) => {
                    log::warn!("Failed to write band {} of {} as {}: {}", index, source.name(), name, e);
                    report.failed.push((index, e));
                }
            }
        }
        Ok(report)
    }
}

impl Default for BandSplitter {
    fn default() -> Self {
        Self::new("tif")
    }
}
