use anyhow::{Context, Result};
use geo::{Area, BoundingRect, CoordsIter, Geometry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::commons::basic_functions::{
    feature_geometry, geojson_features, numeric_property, parse_geojson,
};
use crate::commons::units::{EnergyUnit, ValueKind};
use crate::error::HdError;
use crate::geo_core::{BoundingBox, GeoCore};

/// Building sector a dataset describes. Industry is not modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Residential,
    Tertiary,
}

impl Sector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sector::Residential => "residential",
            Sector::Tertiary => "tertiary",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sector {
    type Err = HdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "residential" => Ok(Sector::Residential),
            "tertiary" => Ok(Sector::Tertiary),
            _ => Err(HdError::UnknownValue {
                kind: "sector",
                value: s.to_string(),
            }),
        }
    }
}

/// Description of a source dataset: where its values live and what they mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub name: String,
    pub country: Option<String>,
    pub sector: Sector,
    /// EPSG code of the source geometries
    pub epsg: i32,
    pub unit: EnergyUnit,
    pub value_kind: ValueKind,
    pub value_field: String,
    /// Used by the `priority` overlap policy, higher wins
    pub priority: i32,
}

impl DatasetMeta {
    pub fn new(name: &str, sector: Sector, value_field: &str) -> Self {
        DatasetMeta {
            name: name.to_string(),
            country: None,
            sector,
            epsg: crate::collect::global_variables::DEFAULT_EPSG,
            unit: EnergyUnit::KWh,
            value_kind: ValueKind::Absolute,
            value_field: value_field.to_string(),
            priority: 0,
        }
    }

    pub fn with_unit(mut self, unit: EnergyUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_value_kind(mut self, value_kind: ValueKind) -> Self {
        self.value_kind = value_kind;
        self
    }

    pub fn with_epsg(mut self, epsg: i32) -> Self {
        self.epsg = epsg;
        self
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// One input feature with its raw value (in the dataset unit)
#[derive(Debug, Clone, PartialEq)]
pub struct HeatDemandFeature {
    pub geometry: Geometry<f64>,
    pub value: f64,
}

/// Counts collected while reading a dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub read: usize,
    pub skipped: usize,
}

/// A per-country or per-region heat-demand input
#[derive(Debug, Clone)]
pub struct HeatDemandDataset {
    pub meta: DatasetMeta,
    /// GeoCore tracking the CRS the geometries are currently in
    pub geo_core: GeoCore,
    pub features: Vec<HeatDemandFeature>,
    pub report: LoadReport,
}

impl HeatDemandDataset {
    pub fn new(meta: DatasetMeta) -> Self {
        let geo_core = GeoCore::new(meta.epsg);
        HeatDemandDataset {
            meta,
            geo_core,
            features: Vec::new(),
            report: LoadReport::default(),
        }
    }

    /// Load from GeoJSON bytes (Feature or FeatureCollection)
    pub fn from_geojson(geojson_data: &[u8], meta: DatasetMeta) -> Result<Self> {
        let geojson_str =
            std::str::from_utf8(geojson_data).context("GeoJSON data is not valid UTF-8")?;
        let geojson = parse_geojson(geojson_str)
            .with_context(|| format!("Failed to read dataset `{}`", meta.name))?;

        let mut dataset = Self::new(meta);
        for feature in geojson_features(geojson)? {
            dataset.report.read += 1;

            let geometry = match feature_geometry(&feature) {
                Ok(Some(geometry)) => geometry,
                Ok(None) => {
                    dataset.skip("feature has no geometry");
                    continue;
                }
                Err(e) => {
                    dataset.skip(&format!("{:#}", e));
                    continue;
                }
            };

            let value = feature
                .properties
                .as_ref()
                .and_then(|props| numeric_property(props, &dataset.meta.value_field));
            let Some(value) = value else {
                let reason = format!("missing or non-numeric `{}`", dataset.meta.value_field);
                dataset.skip(&reason);
                continue;
            };

            dataset.push(geometry, value);
        }

        dataset.log_loaded();
        Ok(dataset)
    }

    pub fn from_geojson_file<P: AsRef<Path>>(path: P, meta: DatasetMeta) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).context(format!("Failed to read GeoJSON file: {:?}", path))?;
        Self::from_geojson(&bytes, meta)
    }

    /// Load a CSV point table (one row per point, coordinates in `x_field`/`y_field`)
    #[cfg(feature = "csv")]
    pub fn from_csv_reader<R: std::io::Read>(
        reader: R,
        meta: DatasetMeta,
        x_field: &str,
        y_field: &str,
    ) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .context("Failed to read CSV headers")?
            .clone();
        let column = |name: &str| -> Result<usize> {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                HdError::dataset(&meta.name, format!("CSV has no column `{}`", name)).into()
            })
        };
        let (x_idx, y_idx, value_idx) = (
            column(x_field)?,
            column(y_field)?,
            column(&meta.value_field)?,
        );

        let mut dataset = Self::new(meta);
        for record in csv_reader.records() {
            dataset.report.read += 1;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    dataset.skip(&format!("unreadable CSV row: {}", e));
                    continue;
                }
            };
            let parse = |idx: usize| record.get(idx).and_then(|s| s.parse::<f64>().ok());
            match (parse(x_idx), parse(y_idx), parse(value_idx)) {
                (Some(x), Some(y), Some(value)) => {
                    dataset.push(Geometry::Point(geo::Point::new(x, y)), value)
                }
                _ => dataset.skip("non-numeric coordinate or value"),
            }
        }

        dataset.log_loaded();
        Ok(dataset)
    }

    #[cfg(feature = "csv")]
    pub fn from_csv_file<P: AsRef<Path>>(
        path: P,
        meta: DatasetMeta,
        x_field: &str,
        y_field: &str,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file =
            std::fs::File::open(path).context(format!("Failed to open CSV file: {:?}", path))?;
        Self::from_csv_reader(file, meta, x_field, y_field)
    }

    /// Validate and keep a feature, or count it as skipped
    fn push(&mut self, geometry: Geometry<f64>, value: f64) {
        if !value.is_finite() || value < 0.0 {
            self.skip(&format!("invalid value {}", value));
            return;
        }
        let is_point = match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => true,
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => false,
            _ => {
                self.skip("unsupported geometry type");
                return;
            }
        };
        if !geometry
            .coords_iter()
            .all(|c| c.x.is_finite() && c.y.is_finite())
        {
            self.skip("non-finite coordinate");
            return;
        }
        if is_point && self.meta.value_kind.is_density() {
            self.skip("density value on a point geometry");
            return;
        }
        self.features.push(HeatDemandFeature { geometry, value });
    }

    fn skip(&mut self, reason: &str) {
        self.report.skipped += 1;
        warn!(
            dataset = %self.meta.name,
            feature = self.report.read,
            "Skipping feature: {}",
            reason
        );
    }

    fn log_loaded(&self) {
        if self.report.skipped > 0 {
            warn!(
                dataset = %self.meta.name,
                "{} of {} features skipped",
                self.report.skipped,
                self.report.read
            );
        }
        info!(
            dataset = %self.meta.name,
            sector = %self.meta.sector,
            "Loaded {} features",
            self.features.len()
        );
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn sector(&self) -> Sector {
        self.meta.sector
    }

    /// EPSG code the geometries are currently in
    pub fn epsg(&self) -> i32 {
        self.geo_core.get_epsg()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Reproject every geometry into `to_epsg`
    pub fn reproject(&mut self, to_epsg: i32) -> Result<()> {
        let from_epsg = self.epsg();
        if from_epsg == to_epsg {
            return Ok(());
        }
        for feature in &mut self.features {
            feature.geometry = GeoCore::reproject_geometry(from_epsg, to_epsg, &feature.geometry)
                .with_context(|| format!("Failed to reproject dataset `{}`", self.meta.name))?;
        }
        self.geo_core.set_epsg(to_epsg);
        info!(
            dataset = %self.meta.name,
            "Reprojected from EPSG:{} to EPSG:{}",
            from_epsg,
            to_epsg
        );
        Ok(())
    }

    /// Energy of a feature in MWh; density values use the area in the current CRS
    pub fn feature_mwh(&self, feature: &HeatDemandFeature) -> f64 {
        let area = if self.meta.value_kind.is_density() {
            feature.geometry.unsigned_area()
        } else {
            0.0
        };
        self.meta
            .value_kind
            .feature_mwh(self.meta.unit, feature.value, area)
    }

    pub fn total_mwh(&self) -> f64 {
        self.features.iter().map(|f| self.feature_mwh(f)).sum()
    }

    /// Total bounds of all features (the `total_bounds` of the dataset)
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.bounding_rect())
            .map(BoundingBox::from_rect)
            .reduce(|acc, b| acc.union(&b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    {
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"HD": 2000.0, "name": "block A"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0], [0.0, 0.0]]]
                }
            },
            {
                "type": "Feature",
                "properties": {"HD": "500"},
                "geometry": {"type": "Point", "coordinates": [150.0, 50.0]}
            },
            {
                "type": "Feature",
                "properties": {"HD": -3.0},
                "geometry": {"type": "Point", "coordinates": [10.0, 10.0]}
            },
            {
                "type": "Feature",
                "properties": {"other": 1.0},
                "geometry": {"type": "Point", "coordinates": [10.0, 10.0]}
            },
            {
                "type": "Feature",
                "properties": {"HD": 4.0},
                "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]}
            },
            {
                "type": "Feature",
                "properties": {"HD": 4.0},
                "geometry": null
            }
        ]
    }
    "#;

    #[test]
    fn test_load_geojson_skips_bad_features() {
        let meta = DatasetMeta::new("sample", Sector::Residential, "HD");
        let dataset = HeatDemandDataset::from_geojson(SAMPLE.as_bytes(), meta).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.report.read, 6);
        assert_eq!(dataset.report.skipped, 4);
        // 2500 kWh
        assert!((dataset.total_mwh() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_bounds_cover_all_features() {
        let meta = DatasetMeta::new("sample", Sector::Tertiary, "HD");
        let dataset = HeatDemandDataset::from_geojson(SAMPLE.as_bytes(), meta).unwrap();
        let bounds = dataset.bounds().unwrap();
        assert_eq!(bounds, BoundingBox::new(0.0, 0.0, 150.0, 100.0));
    }

    #[test]
    fn test_density_values_use_area() {
        let meta = DatasetMeta::new("density", Sector::Residential, "HD")
            .with_unit(EnergyUnit::MWh)
            .with_value_kind("per_ha".parse().unwrap());
        let dataset = HeatDemandDataset::from_geojson(SAMPLE.as_bytes(), meta).unwrap();
        // the point is rejected for a density dataset, the 1 ha square keeps 2000 MWh/ha
        assert_eq!(dataset.len(), 1);
        assert!((dataset.total_mwh() - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_geometry_document_is_an_error() {
        let meta = DatasetMeta::new("bad", Sector::Residential, "HD");
        let geometry_only = r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#;
        assert!(HeatDemandDataset::from_geojson(geometry_only.as_bytes(), meta.clone()).is_err());
        assert!(HeatDemandDataset::from_geojson(b"not json", meta).is_err());
    }

    #[test]
    fn test_reproject_same_crs_is_noop() {
        let meta = DatasetMeta::new("sample", Sector::Residential, "HD");
        let mut dataset = HeatDemandDataset::from_geojson(SAMPLE.as_bytes(), meta).unwrap();
        let before = dataset.features.clone();
        dataset.reproject(3034).unwrap();
        assert_eq!(dataset.features, before);
    }

    #[cfg(not(feature = "proj"))]
    #[test]
    fn test_reproject_without_proj_fails() {
        let meta = DatasetMeta::new("wgs84", Sector::Residential, "HD").with_epsg(4326);
        let mut dataset = HeatDemandDataset::from_geojson(SAMPLE.as_bytes(), meta).unwrap();
        assert!(dataset.reproject(3034).is_err());
        assert_eq!(dataset.epsg(), 4326);
    }

    #[test]
    fn test_sector_parsing() {
        assert_eq!("Residential".parse::<Sector>().unwrap(), Sector::Residential);
        assert_eq!("tertiary".parse::<Sector>().unwrap(), Sector::Tertiary);
        assert!("industry".parse::<Sector>().is_err());
    }

    #[cfg(feature = "csv")]
    #[test]
    fn test_load_csv_points() {
        let data = "x,y,hd\n10,10,1000\n250, 40 ,3000\nfoo,1,2\n5,5,\n";
        let meta = DatasetMeta::new("points", Sector::Tertiary, "hd");
        let dataset = HeatDemandDataset::from_csv_reader(data.as_bytes(), meta, "x", "y").unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.report.skipped, 2);
        assert!((dataset.total_mwh() - 4.0).abs() < 1e-12);
    }

    #[cfg(feature = "csv")]
    #[test]
    fn test_csv_non_finite_coordinates_are_skipped() {
        let data = "x,y,hd\n150,50,2500\ninf,10,1000\n20,NaN,1000\n-inf,5,1000\n";
        let meta = DatasetMeta::new("points", Sector::Tertiary, "hd");
        let dataset = HeatDemandDataset::from_csv_reader(data.as_bytes(), meta, "x", "y").unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.report.read, 4);
        assert_eq!(dataset.report.skipped, 3);
        assert_eq!(dataset.bounds(), Some(BoundingBox::new(150.0, 50.0, 150.0, 50.0)));
    }

    #[cfg(feature = "csv")]
    #[test]
    fn test_csv_missing_column() {
        let data = "x,y,value\n1,2,3\n";
        let meta = DatasetMeta::new("points", Sector::Tertiary, "hd");
        assert!(HeatDemandDataset::from_csv_reader(data.as_bytes(), meta, "x", "y").is_err());
    }
}
