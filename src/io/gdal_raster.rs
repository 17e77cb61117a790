//! GDAL-backed raster collaborator (feature `gdal`).

use crate::io::raster::{check_window, RasterData, RasterOpener, RasterSink, RasterSource};
use crate::types::{Band, GeoTransform, PixelWindow, PrepError, PrepResult, SampleType};
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, Axis};
use num_traits::NumCast;
use std::path::{Path, PathBuf};

fn sample_type_of(band_type: GdalDataType) -> SampleType {
    match band_type {
        GdalDataType::UInt8 => SampleType::U8,
        GdalDataType::UInt16 => SampleType::U16,
        GdalDataType::Int16 => SampleType::I16,
        GdalDataType::UInt32 => SampleType::U32,
        GdalDataType::Int32 => SampleType::I32,
        GdalDataType::Float64 => SampleType::F64,
        _ => SampleType::F32,
    }
}

/// Raster file read through GDAL.
///
/// Metadata is read once at open; pixel reads reopen the dataset because
/// GDAL handles cannot be shared between worker threads.
#[derive(Debug, Clone)]
pub struct GdalRaster {
    path: PathBuf,
    name: String,
    geo_transform: GeoTransform,
    projection: Option<String>,
    nodata: Option<f64>,
    sample_type: SampleType,
    band_count: usize,
}

impl GdalRaster {
    pub fn open<P: AsRef<Path>>(path: P) -> PrepResult<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening raster: {}", path.display());

        let dataset = Dataset::open(&path)?;
        let (width, height) = dataset.raster_size();
        let coeffs = dataset.geo_transform().map_err(|e| {
            PrepError::CoordinateTransform(format!("{}: {}", path.display(), e))
        })?;
        let geo_transform = GeoTransform::from_gdal(coeffs, width, height)?;

        let band_count = dataset.raster_count().max(0) as usize;
        let (nodata, sample_type) = if band_count > 0 {
            let first = dataset.rasterband(1)?;
            (first.no_data_value(), sample_type_of(first.band_type()))
        } else {
            (None, SampleType::default())
        };
        let projection = Some(dataset.projection()).filter(|p| !p.is_empty());
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path,
            name,
            geo_transform,
            projection,
            nodata,
            sample_type,
            band_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterSource for GdalRaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn geo_transform(&self) -> PrepResult<GeoTransform> {
        Ok(self.geo_transform)
    }

    fn projection(&self) -> Option<String> {
        self.projection.clone()
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    fn band_count(&self) -> usize {
        self.band_count
    }

    fn read_band(&self, band: usize, window: PixelWindow) -> PrepResult<Band> {
        check_window(&self.geo_transform, &window)?;
        if band == 0 || band > self.band_count {
            return Err(PrepError::Raster(format!(
                "{}: band {} out of range (1..={})",
                self.name, band, self.band_count
            )));
        }

        let dataset = Dataset::open(&self.path)?;
        let size = (window.width, window.height);
        let buffer = dataset
            .rasterband(band as isize)?
            .read_as::<f32>((window.x as isize, window.y as isize), size, size, None)?;

        Array2::from_shape_vec((window.height, window.width), buffer.data)
            .map_err(|e| PrepError::Raster(format!("Failed to reshape band {}: {}", band, e)))
    }
}

/// Opens inputs as [`GdalRaster`]
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalOpener;

impl RasterOpener for GdalOpener {
    fn open(&self, path: &Path) -> PrepResult<Box<dyn RasterSource>> {
        Ok(Box::new(GdalRaster::open(path)?))
    }
}

/// Writes GeoTIFFs into a directory, in the sample type the raster carries.
///
/// Each raster is created under a hidden partial name and renamed into
/// place once GDAL has closed it.
#[derive(Debug, Clone)]
pub struct GdalSink {
    dir: PathBuf,
    driver: String,
}

impl GdalSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            driver: "GTiff".to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_typed<T: GdalType + NumCast + Copy>(&self, path: &Path, raster: &RasterData) -> PrepResult<()> {
        let gt = raster.geo_transform;
        let driver = DriverManager::get_driver_by_name(&self.driver)?;
        let mut dataset = driver.create_with_band_type::<T, _>(
            path,
            gt.width as isize,
            gt.height as isize,
            raster.band_count() as isize,
        )?;
        dataset.set_geo_transform(&gt.to_gdal())?;
        if let Some(projection) = &raster.projection {
            dataset.set_projection(projection)?;
        }

        for (i, band) in raster.bands.axis_iter(Axis(0)).enumerate() {
            let samples = band
                .iter()
                .map(|&v| {
                    num_traits::cast::<f32, T>(v).ok_or_else(|| {
                        PrepError::Raster(format!(
                            "sample {} of band {} does not fit {:?}",
                            v,
                            i + 1,
                            raster.sample_type
                        ))
                    })
                })
                .collect::<PrepResult<Vec<T>>>()?;
            let mut rasterband = dataset.rasterband(i as isize + 1)?;
            let buffer = Buffer::new((gt.width, gt.height), samples);
            rasterband.write((0, 0), (gt.width, gt.height), &buffer)?;
            if raster.nodata.is_some() {
                rasterband.set_no_data_value(raster.nodata)?;
            }
        }
        Ok(())
    }
}

impl RasterSink for GdalSink {
    fn write(&self, name: &str, raster: &RasterData) -> PrepResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let final_path = self.dir.join(name);
        let partial_path = self.dir.join(format!(".{}.partial", name));

        let written = match raster.sample_type {
            SampleType::U8 => self.write_typed::<u8>(&partial_path, raster),
            SampleType::U16 => self.write_typed::<u16>(&partial_path, raster),
            SampleType::I16 => self.write_typed::<i16>(&partial_path, raster),
            SampleType::U32 => self.write_typed::<u32>(&partial_path, raster),
            SampleType::I32 => self.write_typed::<i32>(&partial_path, raster),
            SampleType::F32 => self.write_typed::<f32>(&partial_path, raster),
            SampleType::F64 => self.write_typed::<f64>(&partial_path, raster),
        };
        if let Err(e) = written {
            let _ = std::fs::remove_file(&partial_path);
            return Err(e);
        }

        std::fs::rename(&partial_path, &final_path)?;
        log::debug!(
            "Wrote {} ({} bands, {:?})",
            final_path.display(),
            raster.band_count(),
            raster.sample_type
        );
        Ok(final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::raster::MemRaster;
    use tempfile::TempDir;

    #[test]
    fn test_geotiff_write_then_read() {
        let dir = TempDir::new().unwrap();
        let gt = GeoTransform::new((500000.0, 4100000.0), (0.3, -0.3), 4, 3).unwrap();
        let samples: Vec<u16> = (0..12).collect();
        let raster = MemRaster::from_samples("src", gt, &[samples.clone(), samples]).unwrap();

        let sink = GdalSink::new(dir.path());
        let path = sink.write("src.tif", raster.data()).unwrap();
        assert!(!dir.path().join(".src.tif.partial").exists());

        let reread = GdalRaster::open(&path).unwrap();
        assert_eq!(reread.band_count(), 2);
        assert_eq!(reread.geo_transform().unwrap(), gt);
        let window = PixelWindow { x: 1, y: 1, width: 2, height: 2 };
        let band = reread.read_band(2, window).unwrap();
        assert_eq!(band[[0, 0]], 5.0);
        assert_eq!(band[[1, 1]], 10.0);
    }

    #[test]
    fn test_sample_type_survives_round_trip() {
        let dir = TempDir::new().unwrap();
        let gt = GeoTransform::new((500000.0, 4100000.0), (0.3, -0.3), 3, 2).unwrap();
        let samples: Vec<u16> = vec![0, 1, 300, 4095, 40000, 65535];
        let raster = MemRaster::from_samples("src", gt, &[samples]).unwrap();
        let data = raster.data().clone().with_sample_type(SampleType::U16);

        let sink = GdalSink::new(dir.path());
        let path = sink.write("u16.tif", &data).unwrap();
        let reread = GdalRaster::open(&path).unwrap();
        assert_eq!(reread.sample_type(), SampleType::U16);
        let band = reread.read_band(1, reread.full_window().unwrap()).unwrap();
        assert_eq!(band[[0, 2]], 300.0);
        assert_eq!(band[[1, 1]], 40000.0);
        assert_eq!(band[[1, 2]], 65535.0);

        // negative samples do not fit u8
        let negative = MemRaster::from_samples("neg", gt, &[vec![-1.0f32, 0.0, 1.0, 2.0, 3.0, 4.0]]).unwrap();
        let bytes = negative.data().clone().with_sample_type(SampleType::U8);
        assert!(matches!(sink.write("neg.tif", &bytes), Err(PrepError::Raster(_))));
        assert!(!dir.path().join(".neg.tif.partial").exists());
        assert!(!dir.path().join("neg.tif").exists());
    }
}
