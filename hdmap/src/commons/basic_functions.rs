use anyhow::{Context, Result};
use geo::{Area, BooleanOps, BoundingRect, Geometry, Polygon, Rect};
use geojson::{Feature, GeoJson, JsonObject};

/// Area of `polygon ∩ rect`, holes included
pub fn polygon_rect_area(polygon: &Polygon<f64>, rect: &Rect<f64>) -> f64 {
    match polygon.bounding_rect() {
        Some(bbox) if rects_overlap(&bbox, rect) => {
            polygon.intersection(&rect.to_polygon()).unsigned_area()
        }
        _ => 0.0,
    }
}

/// True when two rectangles share a positive area
fn rects_overlap(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x < b.max().x && b.min().x < a.max().x && a.min().y < b.max().y && b.min().y < a.max().y
}

/// Extract a numeric property, accepting numbers and numeric strings
pub fn numeric_property(props: &JsonObject, key: &str) -> Option<f64> {
    let value = props.get(key)?;
    if let Some(num) = value.as_f64() {
        return Some(num);
    }
    if let Some(int) = value.as_i64() {
        return Some(int as f64);
    }
    value.as_str().and_then(|s| s.trim().parse::<f64>().ok())
}

/// Features of a Feature or FeatureCollection
pub fn geojson_features(geojson: GeoJson) -> Result<Vec<Feature>> {
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc.features),
        GeoJson::Feature(f) => Ok(vec![f]),
        GeoJson::Geometry(_) => {
            anyhow::bail!("GeoJSON must be a Feature or FeatureCollection")
        }
    }
}

/// Parse GeoJSON text
pub fn parse_geojson(content: &str) -> Result<GeoJson> {
    content.parse::<GeoJson>().context("Failed to parse GeoJSON")
}

/// Convert a GeoJSON feature geometry to geo
pub fn feature_geometry(feature: &Feature) -> Result<Option<Geometry<f64>>> {
    let Some(geometry) = feature.geometry.as_ref() else {
        return Ok(None);
    };
    let geo_geom: Geometry<f64> = geometry
        .try_into()
        .context("Failed to convert GeoJSON geometry to geo::Geometry")?;
    Ok(Some(geo_geom))
}

/// All polygons of a GeoJSON document (multipolygons are flattened)
pub fn polygons_from_geojson(geojson: GeoJson) -> Result<Vec<Polygon<f64>>> {
    let mut polygons = Vec::new();
    for feature in geojson_features(geojson)? {
        match feature_geometry(&feature)? {
            Some(Geometry::Polygon(p)) => polygons.push(p),
            Some(Geometry::MultiPolygon(mp)) => polygons.extend(mp.0),
            _ => continue,
        }
    }
    Ok(polygons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, polygon, LineString};

    fn unit_rect(x: f64, y: f64, size: f64) -> Rect<f64> {
        Rect::new(coord! { x: x, y: y }, coord! { x: x + size, y: y + size })
    }

    #[test]
    fn test_square_fully_inside() {
        let poly = polygon![
            (x: 1.0, y: 1.0),
            (x: 3.0, y: 1.0),
            (x: 3.0, y: 3.0),
            (x: 1.0, y: 3.0),
            (x: 1.0, y: 1.0),
        ];
        assert!((polygon_rect_area(&poly, &unit_rect(0.0, 0.0, 10.0)) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_square_straddling_cells() {
        let poly = polygon![
            (x: 5.0, y: 5.0),
            (x: 15.0, y: 5.0),
            (x: 15.0, y: 15.0),
            (x: 5.0, y: 15.0),
            (x: 5.0, y: 5.0),
        ];
        let total: f64 = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)]
            .iter()
            .map(|(x, y)| polygon_rect_area(&poly, &unit_rect(*x, *y, 10.0)))
            .sum();
        assert!((polygon_rect_area(&poly, &unit_rect(0.0, 0.0, 10.0)) - 25.0).abs() < 1e-9);
        assert!((total - poly.unsigned_area()).abs() < 1e-9);
    }

    #[test]
    fn test_concave_polygon_area_is_conserved() {
        // U-shape crossing a cell edge
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 30.0, y: 0.0),
            (x: 30.0, y: 30.0),
            (x: 20.0, y: 30.0),
            (x: 20.0, y: 10.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 30.0),
            (x: 0.0, y: 30.0),
            (x: 0.0, y: 0.0),
        ];
        let mut total = 0.0;
        for i in 0..2 {
            for j in 0..2 {
                total += polygon_rect_area(&poly, &unit_rect(i as f64 * 15.0, j as f64 * 15.0, 15.0));
            }
        }
        assert!((total - poly.unsigned_area()).abs() < 1e-9);
        assert!((poly.unsigned_area() - 700.0).abs() < 1e-9);

        // the top band cuts both arms into two separate pieces
        let band = Rect::new(coord! { x: 0.0, y: 20.0 }, coord! { x: 30.0, y: 30.0 });
        assert!((polygon_rect_area(&poly, &band) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_shared_edge_has_no_area() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ];
        assert_eq!(polygon_rect_area(&poly, &unit_rect(10.0, 0.0, 10.0)), 0.0);
    }

    #[test]
    fn test_holes_are_subtracted() {
        let poly = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]),
            vec![LineString::from(vec![
                (2.0, 2.0),
                (4.0, 2.0),
                (4.0, 4.0),
                (2.0, 4.0),
                (2.0, 2.0),
            ])],
        );
        let area = polygon_rect_area(&poly, &unit_rect(0.0, 0.0, 5.0));
        assert!((area - 21.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_is_zero() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        assert_eq!(polygon_rect_area(&poly, &unit_rect(5.0, 5.0, 1.0)), 0.0);
    }

    #[test]
    fn test_numeric_property() {
        let props: JsonObject = serde_json::from_str(
            r#"{"a": 1.5, "b": 3, "c": " 2.25 ", "d": "n/a", "e": null}"#,
        )
        .unwrap();
        assert_eq!(numeric_property(&props, "a"), Some(1.5));
        assert_eq!(numeric_property(&props, "b"), Some(3.0));
        assert_eq!(numeric_property(&props, "c"), Some(2.25));
        assert_eq!(numeric_property(&props, "d"), None);
        assert_eq!(numeric_property(&props, "e"), None);
        assert_eq!(numeric_property(&props, "missing"), None);
    }

    #[test]
    fn test_geometry_only_geojson_is_rejected() {
        let geojson = parse_geojson(r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#).unwrap();
        assert!(geojson_features(geojson).is_err());
    }
}
