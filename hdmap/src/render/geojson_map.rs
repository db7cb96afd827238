use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use serde_json::json;
use std::path::Path;

use crate::geometric::heat_demand::HeatDemandLayer;
use crate::geometric::mask::PolygonMask;
use crate::render::legend::Legend;
use crate::render::OutputMap;

pub const HD_MWH_FIELD: &str = "HD[MWh]";
pub const HD_DENSITY_FIELD: &str = "HD[MWh/ha]";

/// Cells of a layer as a FeatureCollection of squares
pub fn layer_to_geojson(
    map: OutputMap,
    layer: &HeatDemandLayer,
    mask: &PolygonMask,
    legend: &Legend,
) -> GeoJson {
    let features: Vec<Feature> = layer
        .iter()
        .filter_map(|(id, mwh)| {
            let cell = mask.cell(id)?;
            let density = layer.density_mwh_per_ha(id)?;
            let class = legend.classify(density);

            let polygon = cell.rect.to_polygon();
            let mut feature = Feature::from(Geometry::new(Value::from(&polygon)));
            feature.set_property("cell_id", id as u64);
            feature.set_property("col", cell.col as u64);
            feature.set_property("row", cell.row as u64);
            feature.set_property(HD_MWH_FIELD, mwh);
            feature.set_property(HD_DENSITY_FIELD, density);
            feature.set_property("class", class as u64);
            feature.set_property("label", legend.label(class));
            feature.set_property("color", legend.color(class));
            Some(feature)
        })
        .collect();

    let mut foreign_members = JsonObject::new();
    foreign_members.insert("name".to_string(), json!(map.file_stem()));
    foreign_members.insert(
        "crs".to_string(),
        json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", mask.epsg()) }
        }),
    );

    GeoJson::from(FeatureCollection {
        bbox: None,
        foreign_members: Some(foreign_members),
        features,
    })
}

pub fn write_geojson(
    map: OutputMap,
    layer: &HeatDemandLayer,
    mask: &PolygonMask,
    legend: &Legend,
    path: &Path,
) -> Result<()> {
    let geojson = layer_to_geojson(map, layer, mask, legend);
    std::fs::write(path, geojson.to_string())
        .context(format!("Failed to write GeoJSON file: {:?}", path))?;
    Ok(())
}
