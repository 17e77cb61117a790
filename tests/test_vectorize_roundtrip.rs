use approx::assert_relative_eq;
use changeprep::config::{MaskConfig, PipelineConfig};
use changeprep::core::{georeference_polygon, AxisOrder, Pipeline, PolygonFeature, WorldSpace};
use changeprep::io::geojson::{parse_footprints, to_feature_collection};
use changeprep::types::{ClassMask, GeoTransform};

#[test]
fn test_square_mask_yields_one_polygon() {
    let mut mask = ClassMask::zeros((64, 64));
    mask.slice_mut(ndarray::s![10..30, 10..30]).fill(3);

    let pipeline = Pipeline::new(PipelineConfig::default()).expect("pipeline");
    let polygons = pipeline.vectorizer().vectorize(&mask);
    assert_eq!(polygons.len(), 1);

    // Douglas-Peucker with a 1 pixel tolerance may shave up to half a pixel per edge
    let area = polygons[0].area();
    assert!(area <= 400.0 && area >= 400.0 - 40.0, "area {}", area);
}

#[test]
fn test_footprint_survives_mask_and_back() {
    let gt = GeoTransform::new((-115.3075, 36.1283), (2.7e-6, -2.7e-6), 650, 650).expect("transform");
    // 100 x 60 pixel building, as lon/lat
    let (x0, y0) = (-115.3075 + 200.0 * 2.7e-6, 36.1283 - 100.0 * 2.7e-6);
    let (x1, y1) = (x0 + 100.0 * 2.7e-6, y0 - 60.0 * 2.7e-6);
    let footprint = PolygonFeature::<WorldSpace>::from_ring(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)]);

    let config = PipelineConfig {
        mask: MaskConfig {
            boundary_width: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    let pipeline = Pipeline::new(config).expect("pipeline");
    let mask = pipeline.encoder().encode_world(&[footprint.clone()], &gt).expect("mask");
    assert_eq!(mask.iter().filter(|&&v| v != 0).count(), 6000);

    let world = pipeline.vectorize_to_world(&mask, &gt).expect("vectorize");
    assert_eq!(world.len(), 1);
    assert_eq!(world[0].axis_order(), AxisOrder::XY);

    // Interior is the footprint minus its 1 pixel ring
    let pixel_area = 2.7e-6 * 2.7e-6;
    let interior = 98.0 * 58.0 * pixel_area;
    assert_relative_eq!(world[0].area(), interior, max_relative = 0.03);

    let ring = world[0].exterior();
    for (x, y) in &ring {
        assert!(*x > x0 && *x < x1);
        assert!(*y < y0 && *y > y1);
    }

    // GeoJSON keeps (lon, lat) order
    let collection = to_feature_collection(&world);
    let reparsed = parse_footprints(&collection.to_string()).expect("reparse");
    assert_eq!(reparsed[0].exterior(), ring);
}

#[test]
fn test_georeference_scenario() {
    let gt = GeoTransform::new((100.0, 200.0), (0.5, -0.5), 10, 10).unwrap();
    let pixel = PolygonFeature::from_ring(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]);
    let world = georeference_polygon(&gt, &pixel).unwrap();
    let ring = world.exterior();
    assert_eq!(ring[0], (100.0, 200.0));
    assert_eq!(ring[2], (101.0, 199.0));
    assert_eq!(ring.first(), ring.last());
}
