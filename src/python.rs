//! Python bindings (feature `python`)

use crate::config::{BoundaryType, MaskConfig, TilerConfig, VectorizeConfig};
use crate::core::geotransform::intersect;
use crate::core::georef::{PolygonFeature, PolygonGeoreferencer, WorldSpace};
use crate::core::mask::MaskEncoder;
use crate::core::tiling::{PairedTiler, TilePlan};
use crate::core::vectorize::ContourVectorizer;
use crate::types::{BoundingBox, GeoTransform, PrepError};
use numpy::{PyArray2, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(e: PrepError) -> PyErr {
    match e {
        PrepError::InvalidConfig(_) | PrepError::InvalidGeometry(_) | PrepError::CoordinateTransform(_) => {
            PyErr::new::<PyValueError, _>(format!("{}", e))
        }
        other => PyErr::new::<PyRuntimeError, _>(format!("{}", other)),
    }
}

fn geo_transform(coeffs: Vec<f64>, width: usize, height: usize) -> PyResult<GeoTransform> {
    let coeffs: [f64; 6] = coeffs.try_into().map_err(|v: Vec<f64>| {
        PyErr::new::<PyValueError, _>(format!("geotransform needs 6 coefficients, got {}", v.len()))
    })?;
    GeoTransform::from_gdal(coeffs, width, height).map_err(to_py_err)
}

/// Python wrapper for a shared tile plan
#[pyclass(name = "TilePlan")]
struct PyTilePlan {
    inner: TilePlan,
}

#[pymethods]
impl PyTilePlan {
    fn __len__(&self) -> usize {
        self.inner.len()
    }

    /// (x, y, width, height) of every tile on the shared grid
    fn windows(&self) -> Vec<(usize, usize, usize, usize)> {
        self.inner
            .tiles()
            .iter()
            .map(|t| (t.pixel_window.x, t.pixel_window.y, t.pixel_window.width, t.pixel_window.height))
            .collect()
    }

    /// (minx, miny, maxx, maxy) of every tile
    fn bounds(&self) -> Vec<(f64, f64, f64, f64)> {
        self.inner
            .tiles()
            .iter()
            .map(|t| (t.world_bbox.minx, t.world_bbox.miny, t.world_bbox.maxx, t.world_bbox.maxy))
            .collect()
    }

    fn geotransform(&self, index: usize) -> PyResult<Vec<f64>> {
        let spec = self.inner.tiles().get(index).ok_or_else(|| {
            PyErr::new::<PyValueError, _>(format!("tile {} out of range", index))
        })?;
        Ok(self.inner.tile_geo_transform(spec).to_gdal().to_vec())
    }

    fn __repr__(&self) -> String {
        let (rows, cols) = self.inner.grid_shape();
        format!("TilePlan({} tiles, {}x{} grid)", self.inner.len(), rows, cols)
    }
}

/// Plan one tile grid over the overlap of two rasters
#[pyfunction]
#[pyo3(signature = (gt_a, size_a, gt_b, size_b, tile_size=(360, 360)))]
fn plan_tiles(
    gt_a: Vec<f64>,
    size_a: (usize, usize),
    gt_b: Vec<f64>,
    size_b: (usize, usize),
    tile_size: (usize, usize),
) -> PyResult<PyTilePlan> {
    let a = geo_transform(gt_a, size_a.0, size_a.1)?;
    let b = geo_transform(gt_b, size_b.0, size_b.1)?;
    let tiler = PairedTiler::new(TilerConfig {
        tile_width: tile_size.0,
        tile_height: tile_size.1,
    })
    .map_err(to_py_err)?;
    let plan = tiler.plan(&a, &b).map_err(to_py_err)?;
    Ok(PyTilePlan { inner: plan })
}

/// Rasterize world-space footprint rings into a class mask
#[pyfunction]
#[pyo3(signature = (footprints, geotransform, shape, boundary_width=3, boundary_type="inner", contact_spacing=10.0, meters=false, crs=None))]
#[allow(clippy::too_many_arguments)]
fn encode_mask<'py>(
    py: Python<'py>,
    footprints: Vec<Vec<(f64, f64)>>,
    geotransform: Vec<f64>,
    shape: (usize, usize),
    boundary_width: usize,
    boundary_type: &str,
    contact_spacing: f64,
    meters: bool,
    crs: Option<&str>,
) -> PyResult<&'py PyArray2<u8>> {
    let boundary_type = match boundary_type.to_lowercase().as_str() {
        "inner" => BoundaryType::Inner,
        "outer" => BoundaryType::Outer,
        other => {
            return Err(PyErr::new::<PyValueError, _>(format!(
                "Invalid boundary type: {}",
                other
            )))
        }
    };
    let (rows, cols) = shape;
    let gt = geo_transform(geotransform, cols, rows)?;
    let encoder = MaskEncoder::new(MaskConfig {
        boundary_width,
        boundary_type,
        contact_spacing,
        meters,
        crs_units: None,
        output_shape: Some(shape),
    })
    .map_err(to_py_err)?
    .for_projection(crs);

    let polygons: Vec<PolygonFeature<WorldSpace>> =
        footprints.into_iter().map(PolygonFeature::from_ring).collect();
    let mask = py
        .allow_threads(|| encoder.encode_world(&polygons, &gt))
        .map_err(to_py_err)?;
    Ok(mask.to_pyarray(py))
}

/// Vectorize the interior class of a mask. Rings are in pixel space, or in
/// world (x, y) order when a geotransform is given.
#[pyfunction]
#[pyo3(signature = (mask, geotransform=None, tolerance=1.0))]
fn vectorize_mask(
    mask: PyReadonlyArray2<u8>,
    geotransform: Option<Vec<f64>>,
    tolerance: f64,
) -> PyResult<Vec<Vec<(f64, f64)>>> {
    let mask = mask.as_array().to_owned();
    let vectorizer = ContourVectorizer::new(VectorizeConfig {
        tolerance,
        ..Default::default()
    })
    .map_err(to_py_err)?;
    let polygons = vectorizer.vectorize(&mask);

    match geotransform {
        None => Ok(polygons.iter().map(|p| p.exterior()).collect()),
        Some(coeffs) => {
            let (rows, cols) = mask.dim();
            let georef = PolygonGeoreferencer::new(geo_transform(coeffs, cols, rows)?).map_err(to_py_err)?;
            Ok(polygons.iter().map(|p| georef.to_world(p).exterior()).collect())
        }
    }
}

/// Overlap of two (minx, miny, maxx, maxy) boxes, or None
#[pyfunction]
fn intersect_bounds(
    a: (f64, f64, f64, f64),
    b: (f64, f64, f64, f64),
) -> Option<(f64, f64, f64, f64)> {
    let a = BoundingBox::from_corners(a.0, a.1, a.2, a.3);
    let b = BoundingBox::from_corners(b.0, b.1, b.2, b.3);
    intersect(&a, &b).map(|r| (r.minx, r.miny, r.maxx, r.maxy))
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyTilePlan>()?;
    m.add_function(wrap_pyfunction!(plan_tiles, m)?)?;
    m.add_function(wrap_pyfunction!(encode_mask, m)?)?;
    m.add_function(wrap_pyfunction!(vectorize_mask, m)?)?;
    m.add_function(wrap_pyfunction!(intersect_bounds, m)?)?;
    Ok(())
}
