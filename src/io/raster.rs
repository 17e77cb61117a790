use crate::types::{Band, BandStack, GeoTransform, PixelWindow, PrepError, PrepResult, SampleType};
use ndarray::{s, Array3, Axis};
use num_traits::ToPrimitive;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Raster pixels plus the georeferencing metadata written alongside them
#[derive(Debug, Clone)]
pub struct RasterData {
    pub geo_transform: GeoTransform,
    /// Spatial reference as WKT or PROJ string, copied through untouched
    pub projection: Option<String>,
    pub nodata: Option<f64>,
    /// Storage type of the source band; samples are held as f32 regardless
    pub sample_type: SampleType,
    /// band x rows x cols
    pub bands: BandStack,
}

impl RasterData {
    /// Wrap a band stack, checking its shape against the transform.
    pub fn new(geo_transform: GeoTransform, bands: BandStack) -> PrepResult<Self> {
        let (_, rows, cols) = bands.dim();
        if (rows, cols) != geo_transform.shape() {
            return Err(PrepError::Raster(format!(
                "band shape {}x{} does not match geotransform size {}x{}",
                rows, cols, geo_transform.height, geo_transform.width
            )));
        }
        Ok(Self {
            geo_transform,
            projection: None,
            nodata: None,
            sample_type: SampleType::default(),
            bands,
        })
    }

    pub fn with_projection(mut self, projection: Option<String>) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    /// Carry projection, nodata and sample type over from the raster this
    /// data was cut from
    pub fn with_metadata_of(mut self, source: &dyn RasterSource) -> Self {
        self.projection = source.projection();
        self.nodata = source.nodata();
        self.sample_type = source.sample_type();
        self
    }

    pub fn band_count(&self) -> usize {
        self.bands.len_of(Axis(0))
    }

    /// Band `index` (1-based) as an owned 2D array
    pub fn band(&self, index: usize) -> PrepResult<Band> {
        if index == 0 || index > self.band_count() {
            return Err(PrepError::Raster(format!(
                "band {} out of range (1..={})",
                index,
                self.band_count()
            )));
        }
        Ok(self.bands.index_axis(Axis(0), index - 1).to_owned())
    }
}

/// Read side of the raster I/O collaborator
pub trait RasterSource: Send + Sync {
    /// Identity used in logs and output names
    fn name(&self) -> &str;

    fn geo_transform(&self) -> PrepResult<GeoTransform>;

    fn projection(&self) -> Option<String> {
        None
    }

    fn nodata(&self) -> Option<f64> {
        None
    }

    /// Storage type of the pixels on disk
    fn sample_type(&self) -> SampleType {
        SampleType::F32
    }

    fn band_count(&self) -> usize;

    /// Read a window of band `band` (1-based)
    fn read_band(&self, band: usize, window: PixelWindow) -> PrepResult<Band>;

    /// Read a window of every band
    fn read_window(&self, window: PixelWindow) -> PrepResult<BandStack> {
        let count = self.band_count();
        let mut stack = Array3::zeros((count, window.height, window.width));
        for band in 1..=count {
            let data = self.read_band(band, window)?;
            stack.index_axis_mut(Axis(0), band - 1).assign(&data);
        }
        Ok(stack)
    }

    /// Full extent window
    fn full_window(&self) -> PrepResult<PixelWindow> {
        let gt = self.geo_transform()?;
        Ok(PixelWindow {
            x: 0,
            y: 0,
            width: gt.width,
            height: gt.height,
        })
    }
}

/// Write side of the raster I/O collaborator.
///
/// Implementations must not expose partially written files under `name`.
pub trait RasterSink: Send + Sync {
    /// Persist `raster` under `name` and return where it landed
    fn write(&self, name: &str, raster: &RasterData) -> PrepResult<PathBuf>;
}

/// Opens raster files by path for batch jobs that discover inputs on disk
pub trait RasterOpener: Send + Sync {
    fn open(&self, path: &Path) -> PrepResult<Box<dyn RasterSource>>;
}

impl<F> RasterOpener for F
where
    F: Fn(&Path) -> PrepResult<Box<dyn RasterSource>> + Send + Sync,
{
    fn open(&self, path: &Path) -> PrepResult<Box<dyn RasterSource>> {
        self(path)
    }
}

/// Check a window against a raster's extent
pub fn check_window(gt: &GeoTransform, window: &PixelWindow) -> PrepResult<()> {
    if window.width == 0
        || window.height == 0
        || window.x + window.width > gt.width
        || window.y + window.height > gt.height
    {
        return Err(PrepError::Raster(format!(
            "window {:?} outside raster of {}x{}",
            window, gt.width, gt.height
        )));
    }
    Ok(())
}

/// In-memory raster, used for tests and for callers that decode imagery themselves
#[derive(Debug, Clone)]
pub struct MemRaster {
    name: String,
    data: RasterData,
}

impl MemRaster {
    pub fn new(name: impl Into<String>, data: RasterData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Build from row-major per-band sample vectors of any numeric type
    pub fn from_samples<T: ToPrimitive + Copy>(
        name: impl Into<String>,
        geo_transform: GeoTransform,
        bands: &[Vec<T>],
    ) -> PrepResult<Self> {
        let (rows, cols) = geo_transform.shape();
        let mut stack = Array3::zeros((bands.len(), rows, cols));
        for (b, samples) in bands.iter().enumerate() {
            if samples.len() != rows * cols {
                return Err(PrepError::Raster(format!(
                    "band {} has {} samples, expected {}",
                    b + 1,
                    samples.len(),
                    rows * cols
                )));
            }
            for (i, value) in samples.iter().enumerate() {
                let v = value.to_f32().ok_or_else(|| {
                    PrepError::Raster(format!("sample {} of band {} is not representable", i, b + 1))
                })?;
                stack[[b, i / cols, i % cols]] = v;
            }
        }
        Ok(Self::new(name, RasterData::new(geo_transform, stack)?))
    }

    pub fn data(&self) -> &RasterData {
        &self.data
    }
}

impl RasterSource for MemRaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn geo_transform(&self) -> PrepResult<GeoTransform> {
        Ok(self.data.geo_transform)
    }

    fn projection(&self) -> Option<String> {
        self.data.projection.clone()
    }

    fn nodata(&self) -> Option<f64> {
        self.data.nodata
    }

    fn sample_type(&self) -> SampleType {
        self.data.sample_type
    }

    fn band_count(&self) -> usize {
        self.data.band_count()
    }

    fn read_band(&self, band: usize, window: PixelWindow) -> PrepResult<Band> {
        check_window(&self.data.geo_transform, &window)?;
        let full = self.data.band(band)?;
        Ok(full
            .slice(s![
                window.y..window.y + window.height,
                window.x..window.x + window.width
            ])
            .to_owned())
    }
}

/// Sink that keeps written rasters in memory, keyed by name
#[derive(Debug, Default)]
pub struct MemRasterSink {
    written: Mutex<BTreeMap<String, RasterData>>,
}

impl MemRasterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<RasterData> {
        self.written.lock().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.written
            .lock()
            .map(|w| w.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.written.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RasterSink for MemRasterSink {
    fn write(&self, name: &str, raster: &RasterData) -> PrepResult<PathBuf> {
        let mut written = self
            .written
            .lock()
            .map_err(|_| PrepError::Raster("in-memory sink lock poisoned".to_string()))?;
        written.insert(name.to_string(), raster.clone());
        Ok(PathBuf::from(name))
    }
}
