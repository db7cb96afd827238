use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::collect::global_variables::NODATA_VALUE;
use crate::geometric::heat_demand::HeatDemandLayer;
use crate::geometric::mask::PolygonMask;

/// Write the MWh/ha densities as an ESRI ASCII grid, north row first
pub fn write_ascii_grid(layer: &HeatDemandLayer, mask: &PolygonMask, path: &Path) -> Result<()> {
    let file = File::create(path).context(format!("Failed to create ASCII grid: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    write_ascii_grid_to(layer, mask, &mut writer)
        .context(format!("Failed to write ASCII grid: {:?}", path))?;
    writer.flush()?;
    Ok(())
}

pub fn write_ascii_grid_to<W: Write>(
    layer: &HeatDemandLayer,
    mask: &PolygonMask,
    writer: &mut W,
) -> Result<()> {
    writeln!(writer, "ncols {}", mask.n_cols)?;
    writeln!(writer, "nrows {}", mask.n_rows)?;
    writeln!(writer, "xllcorner {}", mask.origin_x)?;
    writeln!(writer, "yllcorner {}", mask.origin_y)?;
    writeln!(writer, "cellsize {}", mask.stepsize)?;
    writeln!(writer, "NODATA_value {}", NODATA_VALUE)?;

    for row in (0..mask.n_rows).rev() {
        let line: Vec<String> = (0..mask.n_cols)
            .map(|col| {
                layer
                    .density_mwh_per_ha(mask.cell_id(col, row))
                    .map(|v| format!("{:.4}", v))
                    .unwrap_or_else(|| NODATA_VALUE.to_string())
            })
            .collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_core::BoundingBox;
    use crate::geometric::mask::create_polygon_mask;

    #[test]
    fn test_ascii_grid_layout() {
        let mask =
            create_polygon_mask(&BoundingBox::new(1000.0, 2000.0, 1300.0, 2200.0), 100.0, 3034)
                .unwrap();
        let mut layer = HeatDemandLayer::for_mask(None, &mask);
        // lower-left and upper-right cells
        layer.add(mask.cell_id(0, 0), 1.5);
        layer.add(mask.cell_id(2, 1), 30.0);

        let mut buffer = Vec::new();
        write_ascii_grid_to(&layer, &mask, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "ncols 3");
        assert_eq!(lines[1], "nrows 2");
        assert_eq!(lines[2], "xllcorner 1000");
        assert_eq!(lines[3], "yllcorner 2000");
        assert_eq!(lines[4], "cellsize 100");
        assert_eq!(lines[5], "NODATA_value -9999");
        assert_eq!(lines[6], "-9999 -9999 30.0000");
        assert_eq!(lines[7], "1.5000 -9999 -9999");
        assert_eq!(lines.len(), 8);
    }
}
