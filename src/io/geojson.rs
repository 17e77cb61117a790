use crate::core::georef::{PolygonFeature, WorldSpace};
use crate::io::output::write_atomic;
use crate::types::{PrepError, PrepResult};
use geo::Geometry;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue, PolygonType};
use std::path::{Path, PathBuf};

/// Footprint polygons from GeoJSON text.
///
/// Accepts a FeatureCollection, a single Feature or a bare geometry.
/// Polygon and MultiPolygon geometries are kept; other geometry types and
/// null geometries are skipped. Coordinates are read as (x, y) with any
/// third component ignored.
pub fn parse_footprints(text: &str) -> PrepResult<Vec<PolygonFeature<WorldSpace>>> {
    let geometries: Vec<geojson::Geometry> = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::Geometry(geometry) => vec![geometry],
    };

    let mut polygons = Vec::new();
    for geometry in geometries {
        match &geometry.value {
            geojson::Value::Polygon(rings) => check_rings(rings)?,
            geojson::Value::MultiPolygon(parts) => parts.iter().try_for_each(check_rings)?,
            other => {
                log::debug!("Skipping non-polygon geometry {}", other.type_name());
                continue;
            }
        }
        match Geometry::<f64>::try_from(geometry)? {
            Geometry::Polygon(polygon) => polygons.push(PolygonFeature::new(polygon)),
            Geometry::MultiPolygon(multi) => polygons.extend(multi.0.into_iter().map(PolygonFeature::new)),
            _ => {}
        }
    }
    Ok(polygons)
}

pub fn read_footprints<P: AsRef<Path>>(path: P) -> PrepResult<Vec<PolygonFeature<WorldSpace>>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let polygons = parse_footprints(&text)?;
    log::debug!(
        "Read {} footprints from {}",
        polygons.len(),
        path.as_ref().display()
    );
    Ok(polygons)
}

/// Every polygon needs an exterior ring and two components per position.
fn check_rings(rings: &PolygonType) -> PrepResult<()> {
    if rings.is_empty() {
        return Err(PrepError::InvalidGeometry("polygon without rings".to_string()));
    }
    match rings.iter().flatten().find(|position| position.len() < 2) {
        Some(position) => Err(PrepError::InvalidGeometry(format!(
            "position with {} components",
            position.len()
        ))),
        None => Ok(()),
    }
}

/// FeatureCollection with one Polygon feature per input.
///
/// Coordinates are always emitted in (x, y) order, whatever order the
/// polygons are stored in.
pub fn to_feature_collection(polygons: &[PolygonFeature<WorldSpace>]) -> FeatureCollection {
    let features = polygons
        .iter()
        .enumerate()
        .map(|(id, poly)| {
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), JsonValue::from(id));
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&poly.xy_polygon()))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_feature_collection<P: AsRef<Path>>(
    path: P,
    polygons: &[PolygonFeature<WorldSpace>],
) -> PrepResult<PathBuf> {
    let bytes = serde_json::to_vec_pretty(&to_feature_collection(polygons))?;
    write_atomic(path, &bytes)
}
