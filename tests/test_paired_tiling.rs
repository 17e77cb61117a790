use changeprep::config::{PipelineConfig, TilerConfig};
use changeprep::core::{bounding_box, Pipeline};
use changeprep::io::{MemRaster, MemRasterSink, MemoryCatalog, RasterSource};
use changeprep::types::{GeoTransform, PrepError};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Raster whose sample at (row, col) encodes its world position: x * 1000 + y
fn world_coded_raster(name: &str, origin: (f64, f64), size: usize) -> MemRaster {
    let gt = GeoTransform::new(origin, (1.0, -1.0), size, size).expect("valid transform");
    let samples: Vec<f64> = (0..size * size)
        .map(|i| {
            let (row, col) = (i / size, i % size);
            let x = origin.0 + col as f64;
            let y = origin.1 - row as f64;
            x * 1000.0 + y
        })
        .collect();
    MemRaster::from_samples(name, gt, &[samples.clone(), samples]).expect("raster")
}

fn pipeline(tile: usize) -> Pipeline {
    Pipeline::new(PipelineConfig {
        tiling: TilerConfig { tile_width: tile, tile_height: tile },
        ..Default::default()
    })
    .expect("pipeline")
}

#[test]
fn test_tile_pairs_are_coregistered() {
    init_logging();
    let before = world_coded_raster("before", (0.0, 100.0), 100);
    let after = world_coded_raster("after", (30.0, 80.0), 100);
    let sink = MemRasterSink::new();
    let catalog = MemoryCatalog::new();

    let tiles = pipeline(32)
        .tile_pair(&before, &after, &sink, Some(&catalog))
        .expect("overlapping rasters tile");

    // Overlap is 70 x 80 pixels
    assert_eq!(tiles.plan.grid_shape(), (3, 3));
    assert!(tiles.report.is_complete());
    assert_eq!(tiles.report.processed.len(), 9);
    assert_eq!(sink.len(), 18);
    assert_eq!(catalog.len(), 18);

    for pair in &tiles.report.processed {
        let a = sink.get(pair.before.to_str().unwrap()).expect("before tile");
        let b = sink.get(pair.after.to_str().unwrap()).expect("after tile");

        assert_eq!(a.geo_transform, b.geo_transform);
        assert_eq!(bounding_box(&a.geo_transform), pair.spec.world_bbox);
        // Same world position in every pixel of both tiles
        assert_eq!(a.bands, b.bands);
        let expected = pair.spec.world_bbox.minx * 1000.0 + pair.spec.world_bbox.maxy;
        assert_eq!(a.bands[[0, 0, 0]] as f64, expected);
    }

    let corner = tiles.plan.tile(2, 2).expect("last tile");
    assert_eq!(corner.pixel_window.width, 70 - 64);
    assert_eq!(corner.pixel_window.height, 80 - 64);
    assert_eq!(catalog.path_of("before_30_80").unwrap().to_str(), Some("before_30_80.tif"));
}

#[test]
fn test_disjoint_rasters_emit_nothing() {
    init_logging();
    let before = world_coded_raster("before", (0.0, 10.0), 10);
    let after = world_coded_raster("after", (50.0, 60.0), 10);
    let sink = MemRasterSink::new();

    let result = pipeline(4).tile_pair(&before, &after, &sink, None);
    assert!(matches!(result, Err(PrepError::NoOverlap { .. })));
    assert!(sink.is_empty());
}

#[test]
fn test_band_split_batch() {
    init_logging();
    let a = world_coded_raster("a", (0.0, 10.0), 10);
    let b = world_coded_raster("b", (0.0, 10.0), 10);
    let sink = MemRasterSink::new();
    let catalog = MemoryCatalog::new();

    let sources: Vec<&dyn RasterSource> = vec![&a, &b];
    let report = pipeline(4).split_bands(&sources, &sink, Some(&catalog));

    assert!(report.is_complete());
    assert_eq!(sink.names(), vec!["a_band1.tif", "a_band2.tif", "b_band1.tif", "b_band2.tif"]);
    assert_eq!(catalog.len(), 4);
    let band = sink.get("b_band2.tif").expect("band written");
    assert_eq!(band.geo_transform, a.geo_transform().unwrap());
    assert_eq!(band.band(1).unwrap(), b.data().band(2).unwrap());
}
