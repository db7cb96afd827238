pub mod ascii_grid;
#[cfg(feature = "csv")]
pub mod csv_table;
pub mod geojson_map;
#[cfg(feature = "geotiff")]
pub mod geotiff;
pub mod legend;
pub mod summary;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::collect::dataset::Sector;
use crate::error::HdError;
use crate::geometric::heat_demand::HeatDemandLayer;
use crate::geometric::mask::PolygonMask;
use legend::Legend;

/// The three maps produced by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMap {
    Residential,
    Tertiary,
    Combined,
}

impl OutputMap {
    pub const ALL: [OutputMap; 3] = [
        OutputMap::Residential,
        OutputMap::Tertiary,
        OutputMap::Combined,
    ];

    pub fn file_stem(&self) -> &'static str {
        match self {
            OutputMap::Residential => "residential",
            OutputMap::Tertiary => "tertiary",
            OutputMap::Combined => "combined",
        }
    }
}

impl From<Sector> for OutputMap {
    fn from(sector: Sector) -> Self {
        match sector {
            Sector::Residential => OutputMap::Residential,
            Sector::Tertiary => OutputMap::Tertiary,
        }
    }
}

impl fmt::Display for OutputMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// Map file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MapFormat {
    GeoJson,
    /// ESRI ASCII grid
    Asc,
    Csv,
    /// Float32 GeoTIFF
    Tiff,
}

impl MapFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            MapFormat::GeoJson => "geojson",
            MapFormat::Asc => "asc",
            MapFormat::Csv => "csv",
            MapFormat::Tiff => "tif",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MapFormat::GeoJson => "geojson",
            MapFormat::Asc => "asc",
            MapFormat::Csv => "csv",
            MapFormat::Tiff => "tiff",
        }
    }
}

impl FromStr for MapFormat {
    type Err = HdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "geojson" | "json" => Ok(MapFormat::GeoJson),
            "asc" | "ascii" => Ok(MapFormat::Asc),
            "csv" => Ok(MapFormat::Csv),
            "tiff" | "tif" | "geotiff" => Ok(MapFormat::Tiff),
            _ => Err(HdError::UnknownValue {
                kind: "map format",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for MapFormat {
    type Error = HdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MapFormat> for String {
    fn from(format: MapFormat) -> Self {
        format.as_str().to_string()
    }
}

/// Ensure the format can be written by this build
pub fn check_format_available(format: MapFormat) -> Result<()> {
    let available = match format {
        MapFormat::GeoJson | MapFormat::Asc => true,
        MapFormat::Csv => cfg!(feature = "csv"),
        MapFormat::Tiff => cfg!(feature = "geotiff"),
    };
    if available {
        Ok(())
    } else {
        Err(HdError::config(
            "project.formats",
            format!("`{}` output is not enabled in this build", format.as_str()),
        )
        .into())
    }
}

/// Write one map in one format under `output_dir`, returning the file path
pub fn render_map(
    map: OutputMap,
    layer: &HeatDemandLayer,
    mask: &PolygonMask,
    legend: &Legend,
    format: MapFormat,
    output_dir: &Path,
) -> Result<PathBuf> {
    check_format_available(format)?;
    std::fs::create_dir_all(output_dir)
        .context(format!("Failed to create output directory: {:?}", output_dir))?;

    let path = output_dir.join(format!("{}.{}", map.file_stem(), format.extension()));
    match format {
        MapFormat::GeoJson => geojson_map::write_geojson(map, layer, mask, legend, &path)?,
        MapFormat::Asc => ascii_grid::write_ascii_grid(layer, mask, &path)?,
        #[cfg(feature = "csv")]
        MapFormat::Csv => csv_table::write_csv(layer, mask, &path)?,
        #[cfg(feature = "geotiff")]
        MapFormat::Tiff => geotiff::write_geotiff(layer, mask, &path)?,
        #[allow(unreachable_patterns)]
        _ => unreachable!("format availability checked above"),
    }

    info!(map = %map, "Map saved to: {:?}", path);
    Ok(path)
}
