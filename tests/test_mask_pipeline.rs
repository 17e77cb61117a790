use changeprep::config::PipelineConfig;
use changeprep::core::Pipeline;
use changeprep::io::aux_xml::read_aux_xml;
use changeprep::io::{read_mask_png, MemRaster, RasterSource};
use changeprep::types::{GeoTransform, PrepError, PrepResult};
use std::path::Path;
use tempfile::TempDir;

const BUILDINGS: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {},
     "geometry": {"type": "Polygon", "coordinates": [[[510,990],[530,990],[530,970],[510,970],[510,990]]]}},
    {"type": "Feature", "properties": {},
     "geometry": {"type": "Polygon", "coordinates": [[[540,985],[555,985],[555,965],[540,965],[540,985]]]}}
  ]
}"#;

const BOWTIE: &str = r#"{"type": "Polygon", "coordinates": [[[500,1000],[520,980],[520,1000],[500,980],[500,1000]]]}"#;

fn scene_transform() -> GeoTransform {
    GeoTransform::new((500.0, 1000.0), (1.0, -1.0), 60, 60).expect("valid transform")
}

fn scene(name: &str) -> MemRaster {
    let samples: Vec<u16> = (0..3600).map(|i| (i % 60) as u16 * 100).collect();
    MemRaster::from_samples(name, scene_transform(), &[samples.clone(), samples.clone(), samples])
        .expect("raster")
}

fn open_scene(path: &Path) -> PrepResult<Box<dyn RasterSource>> {
    let name = path.file_stem().unwrap_or_default().to_string_lossy().into_owned();
    Ok(Box::new(scene(&name)))
}

#[test]
fn test_training_masks_and_vectorization() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().expect("temp dir");
    let vectors = dir.path().join("geojson");
    let rasters = dir.path().join("imagery");
    let out = dir.path().join("out");
    std::fs::create_dir_all(&vectors).unwrap();
    std::fs::create_dir_all(&rasters).unwrap();

    std::fs::write(vectors.join("buildings_img1.geojson"), BUILDINGS).unwrap();
    std::fs::write(vectors.join("buildings_img2.geojson"), BOWTIE).unwrap();
    std::fs::write(vectors.join("buildings_img3.geojson"), BUILDINGS).unwrap();
    std::fs::write(rasters.join("RGB-PanSharpen_img1.tif"), b"").unwrap();
    std::fs::write(rasters.join("RGB-PanSharpen_img2.tif"), b"").unwrap();

    let pipeline = Pipeline::new(PipelineConfig::default()).expect("pipeline");
    let report = pipeline
        .build_training_masks(&vectors, &rasters, &out, &open_scene)
        .expect("batch runs");

    // img2 has invalid geometry, img3 has no imagery; both are skipped
    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.skipped.len(), 2);
    assert!(report
        .skipped
        .iter()
        .any(|(id, e)| id == "img2" && matches!(e, PrepError::InvalidGeometry(_))));
    assert!(report
        .skipped
        .iter()
        .any(|(id, e)| id == "img3" && matches!(e, PrepError::MissingPair { .. })));

    let item = &report.processed[0];
    assert_eq!(item.mask, out.join("masks").join("img1.png"));
    assert!(item.image.exists());
    assert!(out.join("images").join("img1.jpg.aux.xml").exists());

    let mask = read_mask_png(&item.mask).expect("mask readable");
    assert_eq!(mask.dim(), (60, 60));
    assert_eq!(mask[[0, 0]], 0);
    assert_eq!(mask[[10, 10]], 1); // boundary ring of the first building
    assert_eq!(mask[[20, 20]], 3); // interior
    assert_eq!(mask[[20, 35]], 2); // gap between the buildings
    assert!(mask.iter().all(|&v| v <= 3));

    let pam = read_aux_xml(&item.mask, 60, 60).expect("sidecar");
    assert_eq!(pam.geo_transform, scene_transform());

    let geojson_dir = dir.path().join("polygons");
    let vectorized = pipeline.masks_to_geojson(&[item.mask.clone()], &geojson_dir);
    assert!(vectorized.is_complete());

    let text = std::fs::read_to_string(geojson_dir.join("img1.geojson")).unwrap();
    let collection: serde_json::Value = serde_json::from_str(&text).unwrap();
    let features = collection["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    for feature in features {
        for position in feature["geometry"]["coordinates"][0].as_array().unwrap() {
            let x = position[0].as_f64().unwrap();
            let y = position[1].as_f64().unwrap();
            assert!((500.0..=560.0).contains(&x), "x {}", x);
            assert!((940.0..=1000.0).contains(&y), "y {}", y);
        }
    }
}

#[test]
fn test_mask_without_sidecar_is_excluded() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().expect("temp dir");
    let mask_path = dir.path().join("orphan.png");
    let mut mask = changeprep::ClassMask::zeros((20, 20));
    mask.slice_mut(ndarray::s![5..15, 5..15]).fill(3);
    changeprep::io::write_mask_png(&mask_path, &mask).unwrap();

    let pipeline = Pipeline::new(PipelineConfig::default()).expect("pipeline");
    let report = pipeline.masks_to_geojson(&[mask_path], dir.path());
    assert!(report.processed.is_empty());
    assert!(matches!(report.skipped[0].1, PrepError::CoordinateTransform(_)));
}

#[test]
fn test_failed_image_leaves_no_mask_behind() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().expect("temp dir");
    let vectors = dir.path().join("geojson");
    let rasters = dir.path().join("imagery");
    let out = dir.path().join("out");
    std::fs::create_dir_all(&vectors).unwrap();
    std::fs::create_dir_all(&rasters).unwrap();
    std::fs::write(vectors.join("buildings_img1.geojson"), BUILDINGS).unwrap();
    std::fs::write(rasters.join("RGB-PanSharpen_img1.tif"), b"").unwrap();

    // two bands cannot be written as JPEG
    let two_band = |_: &Path| -> PrepResult<Box<dyn RasterSource>> {
        let samples = vec![7u8; 3600];
        let raster = MemRaster::from_samples("img1", scene_transform(), &[samples.clone(), samples])?;
        Ok(Box::new(raster))
    };

    let pipeline = Pipeline::new(PipelineConfig::default()).expect("pipeline");
    let report = pipeline
        .build_training_masks(&vectors, &rasters, &out, &two_band)
        .expect("batch runs");

    assert!(report.processed.is_empty());
    assert!(matches!(report.skipped[0].1, PrepError::Raster(_)));
    assert!(!out.join("masks").join("img1.png").exists());
    assert!(!out.join("masks").join("img1.png.aux.xml").exists());
}
