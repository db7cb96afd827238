use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::geometric::heat_demand::HeatDemandLayer;
use crate::geometric::mask::PolygonMask;

#[derive(Debug, Serialize)]
struct CellRow {
    cell_id: usize,
    col: usize,
    row: usize,
    x_min: f64,
    y_min: f64,
    hd_mwh: f64,
    hd_mwh_per_ha: f64,
}

/// One line per non-empty cell
pub fn write_csv(layer: &HeatDemandLayer, mask: &PolygonMask, path: &Path) -> Result<()> {
    let file =
        std::fs::File::create(path).context(format!("Failed to create CSV file: {:?}", path))?;
    write_csv_to(layer, mask, file).context(format!("Failed to write CSV file: {:?}", path))
}

pub fn write_csv_to<W: Write>(layer: &HeatDemandLayer, mask: &PolygonMask, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for (id, mwh) in layer.iter() {
        let Some(cell) = mask.cell(id) else {
            continue;
        };
        csv_writer.serialize(CellRow {
            cell_id: id,
            col: cell.col,
            row: cell.row,
            x_min: cell.rect.min().x,
            y_min: cell.rect.min().y,
            hd_mwh: mwh,
            hd_mwh_per_ha: layer.density_mwh_per_ha(id).unwrap_or(0.0),
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}
