// Example: harmonize an in-memory residential dataset onto a 100 m grid
// and write the residential map as GeoJSON and ASCII grid
use anyhow::Result;
use hdmap::collect::dataset::{DatasetMeta, HeatDemandDataset, Sector};
use hdmap::commons::units::{AreaUnit, EnergyUnit, ValueKind};
use hdmap::geometric::heat_demand::{data_intersect, AllocationMethod};
use hdmap::geometric::mask::create_polygon_mask;
use hdmap::pipeline::covering_bounds;
use hdmap::render::legend::Legend;
use hdmap::render::{render_map, MapFormat, OutputMap};
use std::path::Path;

fn main() -> Result<()> {
    println!("=== Example: harmonizing a GeoJSON heat-demand dataset ===\n");

    // A building block and an address point in EPSG:3034, demand in GJ
    let geojson_data = r#"
    {
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"HD": 7200.0, "name": "Block A"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [3500020.0, 2800010.0],
                        [3500180.0, 2800010.0],
                        [3500180.0, 2800090.0],
                        [3500020.0, 2800090.0],
                        [3500020.0, 2800010.0]
                    ]]
                }
            },
            {
                "type": "Feature",
                "properties": {"HD": 950.0, "name": "Block B"},
                "geometry": {
                    "type": "Point",
                    "coordinates": [3500250.0, 2800150.0]
                }
            }
        ]
    }
    "#;

    let meta = DatasetMeta::new("Example residential", Sector::Residential, "HD")
        .with_unit(EnergyUnit::GJ)
        .with_country("NL")
        .with_epsg(3034);
    let dataset = HeatDemandDataset::from_geojson(geojson_data.as_bytes(), meta)?;
    println!(
        "Loaded {} features, {:.3} MWh in total",
        dataset.len(),
        dataset.total_mwh()
    );

    let bounds = dataset
        .bounds()
        .ok_or_else(|| anyhow::anyhow!("dataset has no features"))?;
    let bounds = covering_bounds(&bounds, 100.0).aligned_to(100.0);
    let mask = create_polygon_mask(&bounds, 100.0, 3034)?;
    println!("Mask: {} x {} cells", mask.n_cols, mask.n_rows);

    let (layer, stats) = data_intersect(&dataset, &mask, AllocationMethod::AreaWeighted)?;
    println!(
        "Allocated {:.3} MWh to {} cells ({:.3} MWh outside the grid)",
        stats.allocated_mwh,
        layer.len(),
        stats.outside_grid_mwh
    );
    for (cell, mwh) in layer.iter() {
        println!(
            "  cell {:>3}: {:>10.3} MWh {:>10.3} MWh/ha",
            cell,
            mwh,
            layer.density_mwh_per_ha(cell).unwrap_or(0.0)
        );
    }

    let output_dir = Path::new("output");
    let legend = Legend::default();
    for format in [MapFormat::GeoJson, MapFormat::Asc] {
        let path = render_map(
            OutputMap::Residential,
            &layer,
            &mask,
            &legend,
            format,
            output_dir,
        )?;
        println!("Saved {:?}", path);
    }

    // Density values are multiplied by the feature area
    let density = ValueKind::Density(AreaUnit::SquareMetre);
    println!(
        "\n100 kWh/m2 over 1 ha = {:.1} MWh",
        density.feature_mwh(EnergyUnit::KWh, 100.0, 10_000.0)
    );

    Ok(())
}
