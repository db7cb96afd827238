use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::collect::global_variables::NODATA_VALUE;
use crate::error::HdError;
use crate::geometric::heat_demand::HeatDemandLayer;
use crate::geometric::mask::PolygonMask;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// GeoKey directory: version 1.1.0 with three keys
/// (projected model, pixel-is-area, projected CRS code)
fn geo_key_directory(epsg: i32) -> Result<Vec<u16>, HdError> {
    let code = u16::try_from(epsg).map_err(|_| {
        HdError::InvalidGrid(format!("EPSG:{} does not fit a GeoTIFF key", epsg))
    })?;
    Ok(vec![
        1, 1, 0, 3, //
        1024, 0, 1, 1, // GTModelTypeGeoKey = projected
        1025, 0, 1, 1, // GTRasterTypeGeoKey = pixel is area
        3072, 0, 1, code, // ProjectedCSTypeGeoKey
    ])
}

/// Single-band Float32 GeoTIFF of MWh/ha, north row first
pub fn write_geotiff(layer: &HeatDemandLayer, mask: &PolygonMask, path: &Path) -> Result<()> {
    let file = File::create(path).context(format!("Failed to create GeoTIFF: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    write_geotiff_to(layer, mask, &mut writer)
        .context(format!("Failed to write GeoTIFF: {:?}", path))?;
    writer.flush()?;
    Ok(())
}

pub fn write_geotiff_to<W: Write + Seek>(
    layer: &HeatDemandLayer,
    mask: &PolygonMask,
    writer: &mut W,
) -> Result<()> {
    if mask.is_empty() {
        return Err(HdError::InvalidGrid("cannot write a GeoTIFF of an empty mask".into()).into());
    }
    let width = u32::try_from(mask.n_cols).context("Too many columns for a TIFF")?;
    let height = u32::try_from(mask.n_rows).context("Too many rows for a TIFF")?;

    let mut data: Vec<f32> = Vec::with_capacity(mask.len());
    for row in (0..mask.n_rows).rev() {
        for col in 0..mask.n_cols {
            let value = layer
                .density_mwh_per_ha(mask.cell_id(col, row))
                .unwrap_or(NODATA_VALUE);
            data.push(value as f32);
        }
    }

    let top = mask.origin_y + mask.n_rows as f64 * mask.stepsize;
    let scale = [mask.stepsize, mask.stepsize, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, mask.origin_x, top, 0.0];
    let keys = geo_key_directory(mask.epsg())?;
    let nodata = format!("{}", NODATA_VALUE);

    let mut encoder = TiffEncoder::new(writer).context("Failed to create TIFF encoder")?;
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(width, height)
        .context("Failed to create TIFF image")?;
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])?;
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])?;
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &keys[..])?;
    image
        .encoder()
        .write_tag(Tag::Unknown(GDAL_NODATA), nodata.as_str())?;
    image
        .write_data(&data)
        .context("Failed to write TIFF pixels")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_core::BoundingBox;
    use crate::geometric::mask::create_polygon_mask;
    use std::io::Cursor;

    #[test]
    fn test_geotiff_header() {
        let mask =
            create_polygon_mask(&BoundingBox::new(0.0, 0.0, 300.0, 200.0), 100.0, 3034).unwrap();
        let mut layer = HeatDemandLayer::for_mask(None, &mask);
        layer.add(mask.cell_id(1, 0), 12.0);

        let mut cursor = Cursor::new(Vec::new());
        write_geotiff_to(&layer, &mask, &mut cursor).unwrap();
        let bytes = cursor.into_inner();
        // little-endian classic TIFF
        assert_eq!(&bytes[..4], b"II*\0");
        // 3 x 2 float pixels plus the directory
        assert!(bytes.len() > 6 * 4);
    }

    #[test]
    fn test_empty_mask_is_rejected() {
        let mask = create_polygon_mask(&BoundingBox::new(0.0, 0.0, 0.0, 0.0), 100.0, 3034).unwrap();
        let layer = HeatDemandLayer::for_mask(None, &mask);
        let mut cursor = Cursor::new(Vec::new());
        assert!(write_geotiff_to(&layer, &mask, &mut cursor).is_err());
    }

    #[test]
    fn test_geo_keys() {
        let keys = geo_key_directory(3035).unwrap();
        assert_eq!(keys.len(), 16);
        assert_eq!(keys[3], 3);
        assert_eq!(keys[15], 3035);

        assert!(matches!(geo_key_directory(70000), Err(HdError::InvalidGrid(_))));
        assert!(geo_key_directory(-1).is_err());
    }

    #[test]
    fn test_out_of_range_epsg_is_rejected() {
        let mask =
            create_polygon_mask(&BoundingBox::new(0.0, 0.0, 100.0, 100.0), 100.0, 102_100).unwrap();
        let layer = HeatDemandLayer::for_mask(None, &mask);
        let mut cursor = Cursor::new(Vec::new());
        assert!(write_geotiff_to(&layer, &mask, &mut cursor).is_err());
    }
}
