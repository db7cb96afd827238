use anyhow::Result;
use geo::{Area, BoundingRect, Centroid, Geometry, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::collect::dataset::{HeatDemandDataset, HeatDemandFeature, Sector};
use crate::collect::global_variables::SQUARE_METRES_PER_HECTARE;
use crate::commons::basic_functions::polygon_rect_area;
use crate::error::HdError;
use crate::geometric::mask::PolygonMask;

/// How a polygon's demand is spread over the cells it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    /// Split by the share of the polygon area falling in each cell
    #[default]
    AreaWeighted,
    /// Whole value to the cell holding the centroid
    Centroid,
}

impl FromStr for AllocationMethod {
    type Err = HdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "area_weighted" => Ok(AllocationMethod::AreaWeighted),
            "centroid" => Ok(AllocationMethod::Centroid),
            _ => Err(HdError::UnknownValue {
                kind: "allocation method",
                value: s.to_string(),
            }),
        }
    }
}

/// Heat demand of one sector on the mask, in MWh per cell.
/// Only cells with a non-zero demand are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatDemandLayer {
    pub sector: Option<Sector>,
    cell_area_m2: f64,
    values: BTreeMap<usize, f64>,
}

impl HeatDemandLayer {
    pub fn new(sector: Option<Sector>, cell_area_m2: f64) -> Self {
        HeatDemandLayer {
            sector,
            cell_area_m2,
            values: BTreeMap::new(),
        }
    }

    pub fn for_mask(sector: Option<Sector>, mask: &PolygonMask) -> Self {
        Self::new(sector, mask.cell_area_m2())
    }

    pub fn add(&mut self, cell: usize, mwh: f64) {
        *self.values.entry(cell).or_insert(0.0) += mwh;
    }

    pub fn set(&mut self, cell: usize, mwh: f64) {
        self.values.insert(cell, mwh);
    }

    pub fn value(&self, cell: usize) -> Option<f64> {
        self.values.get(&cell).copied()
    }

    /// MWh/ha of a cell
    pub fn density_mwh_per_ha(&self, cell: usize) -> Option<f64> {
        self.value(cell)
            .map(|mwh| mwh / (self.cell_area_m2 / SQUARE_METRES_PER_HECTARE))
    }

    pub fn cell_area_m2(&self) -> f64 {
        self.cell_area_m2
    }

    /// Cells in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values.iter().map(|(id, v)| (*id, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.values.values().sum()
    }

    /// Remove cells without heat demand
    pub fn remove_zero_cells(&mut self) {
        self.values.retain(|_, v| *v != 0.0);
    }
}

/// What happened to the demand of one dataset during allocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AllocationStats {
    pub features: usize,
    pub input_mwh: f64,
    pub allocated_mwh: f64,
    pub outside_grid_mwh: f64,
    pub outside_boundary_mwh: f64,
}

/// Shares of one feature, before boundary filtering
#[derive(Debug, Default)]
struct Contribution {
    cells: Vec<(usize, f64)>,
    outside_grid: f64,
}

impl Contribution {
    fn outside(mwh: f64) -> Self {
        Contribution {
            cells: Vec::new(),
            outside_grid: mwh,
        }
    }
}

/// Assign the heat demand of every feature of a dataset to the mask cells
/// and sum it per cell. Cells left at zero are removed.
pub fn data_intersect(
    dataset: &HeatDemandDataset,
    mask: &PolygonMask,
    method: AllocationMethod,
) -> Result<(HeatDemandLayer, AllocationStats)> {
    if dataset.epsg() != mask.epsg() {
        return Err(HdError::CrsMismatch {
            name: dataset.name().to_string(),
            found: dataset.epsg(),
            expected: mask.epsg(),
        }
        .into());
    }

    let allocate = |feature: &HeatDemandFeature| {
        let mwh = dataset.feature_mwh(feature);
        allocate_feature(&feature.geometry, mwh, mask, method)
    };

    #[cfg(feature = "rayon")]
    let contributions: Vec<Contribution> = dataset.features.par_iter().map(allocate).collect();

    #[cfg(not(feature = "rayon"))]
    let contributions: Vec<Contribution> = dataset.features.iter().map(allocate).collect();

    let mut layer = HeatDemandLayer::for_mask(Some(dataset.sector()), mask);
    let mut stats = AllocationStats {
        features: dataset.len(),
        input_mwh: dataset.total_mwh(),
        ..AllocationStats::default()
    };

    // Summed in feature order so totals do not depend on thread scheduling
    for contribution in contributions {
        stats.outside_grid_mwh += contribution.outside_grid;
        for (cell, mwh) in contribution.cells {
            if mask.is_active(cell) {
                layer.add(cell, mwh);
                stats.allocated_mwh += mwh;
            } else {
                stats.outside_boundary_mwh += mwh;
            }
        }
    }
    layer.remove_zero_cells();

    info!(
        dataset = %dataset.name(),
        "Allocated {:.3} MWh to {} cells ({:.3} MWh outside grid, {:.3} MWh outside boundary)",
        stats.allocated_mwh,
        layer.len(),
        stats.outside_grid_mwh,
        stats.outside_boundary_mwh
    );

    Ok((layer, stats))
}

fn allocate_feature(
    geometry: &Geometry<f64>,
    mwh: f64,
    mask: &PolygonMask,
    method: AllocationMethod,
) -> Contribution {
    if mwh == 0.0 {
        return Contribution::default();
    }
    match geometry {
        Geometry::Point(p) => allocate_point(p, mwh, mask),
        Geometry::MultiPoint(mp) => {
            // equal share per point
            let share = mwh / mp.0.len().max(1) as f64;
            let mut contribution = Contribution::default();
            for p in &mp.0 {
                merge(&mut contribution, allocate_point(p, share, mask));
            }
            contribution
        }
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => match method {
            AllocationMethod::Centroid => allocate_centroid(geometry, mwh, mask),
            AllocationMethod::AreaWeighted => {
                let polygons: Vec<&Polygon<f64>> = match geometry {
                    Geometry::Polygon(p) => vec![p],
                    Geometry::MultiPolygon(mp) => mp.0.iter().collect(),
                    _ => Vec::new(),
                };
                allocate_area_weighted(&polygons, geometry, mwh, mask)
            }
        },
        other => {
            debug!("Unsupported geometry in allocation: {:?}", other);
            Contribution::outside(mwh)
        }
    }
}

fn merge(into: &mut Contribution, other: Contribution) {
    into.cells.extend(other.cells);
    into.outside_grid += other.outside_grid;
}

fn allocate_point(point: &Point<f64>, mwh: f64, mask: &PolygonMask) -> Contribution {
    match mask.locate(point.x(), point.y()) {
        Some(cell) => Contribution {
            cells: vec![(cell, mwh)],
            outside_grid: 0.0,
        },
        None => Contribution::outside(mwh),
    }
}

fn allocate_centroid(geometry: &Geometry<f64>, mwh: f64, mask: &PolygonMask) -> Contribution {
    match geometry.centroid() {
        Some(centroid) => allocate_point(&centroid, mwh, mask),
        None => Contribution::outside(mwh),
    }
}

fn allocate_area_weighted(
    polygons: &[&Polygon<f64>],
    geometry: &Geometry<f64>,
    mwh: f64,
    mask: &PolygonMask,
) -> Contribution {
    let total_area: f64 = polygons.iter().map(|p| p.unsigned_area()).sum();
    if total_area <= 0.0 || !total_area.is_finite() {
        return allocate_centroid(geometry, mwh, mask);
    }

    let mut contribution = Contribution::default();
    let mut allocated = 0.0;

    for polygon in polygons {
        let Some(rect) = polygon.bounding_rect() else {
            continue;
        };
        let Some((cols, rows)) = mask.cell_range(&rect) else {
            continue;
        };
        for col in cols {
            for row in rows.clone() {
                let area = polygon_rect_area(polygon, &mask.cell_rect(col, row));
                if area > 0.0 {
                    let share = mwh * area / total_area;
                    contribution.cells.push((mask.cell_id(col, row), share));
                    allocated += share;
                }
            }
        }
    }

    contribution.outside_grid = (mwh - allocated).max(0.0);
    contribution
}

impl fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationMethod::AreaWeighted => f.write_str("area_weighted"),
            AllocationMethod::Centroid => f.write_str("centroid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::dataset::DatasetMeta;
    use crate::commons::units::EnergyUnit;
    use crate::geo_core::BoundingBox;
    use crate::geometric::mask::create_polygon_mask;
    use geo::{polygon, MultiPoint};

    fn grid() -> PolygonMask {
        create_polygon_mask(&BoundingBox::new(0.0, 0.0, 300.0, 300.0), 100.0, 3034).unwrap()
    }

    fn dataset(features: Vec<(Geometry<f64>, f64)>) -> HeatDemandDataset {
        let meta = DatasetMeta::new("test", Sector::Residential, "HD").with_unit(EnergyUnit::MWh);
        let mut dataset = HeatDemandDataset::new(meta);
        dataset.features = features
            .into_iter()
            .map(|(geometry, value)| HeatDemandFeature { geometry, value })
            .collect();
        dataset
    }

    fn square(x: f64, y: f64, size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ])
    }

    #[test]
    fn test_area_weighted_split_conserves_total() {
        let mask = grid();
        // 100 x 100 square centred on the corner shared by four cells
        let ds = dataset(vec![(square(50.0, 50.0, 100.0), 400.0)]);
        let (layer, stats) = data_intersect(&ds, &mask, AllocationMethod::AreaWeighted).unwrap();

        assert_eq!(layer.len(), 4);
        for (col, row) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            let v = layer.value(mask.cell_id(col, row)).unwrap();
            assert!((v - 100.0).abs() < 1e-9);
        }
        assert!((layer.total() - 400.0).abs() < 1e-9);
        assert!((stats.allocated_mwh - 400.0).abs() < 1e-9);
        assert!(stats.outside_grid_mwh.abs() < 1e-9);
    }

    #[test]
    fn test_centroid_method_assigns_whole_value() {
        let mask = grid();
        let ds = dataset(vec![(square(120.0, 110.0, 60.0), 80.0)]);
        let (layer, _) = data_intersect(&ds, &mask, AllocationMethod::Centroid).unwrap();
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.value(mask.cell_id(1, 1)), Some(80.0));
    }

    #[test]
    fn test_points_on_shared_edge_land_in_one_cell() {
        let mask = grid();
        let ds = dataset(vec![
            (Geometry::Point(Point::new(100.0, 100.0)), 5.0),
            (Geometry::Point(Point::new(150.0, 150.0)), 7.0),
            (Geometry::Point(Point::new(10.0, 10.0)), 1.0),
        ]);
        let (layer, _) = data_intersect(&ds, &mask, AllocationMethod::AreaWeighted).unwrap();
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.value(mask.cell_id(1, 1)), Some(12.0));
        assert_eq!(layer.value(0), Some(1.0));
    }

    #[test]
    fn test_outside_grid_is_counted() {
        let mask = grid();
        let ds = dataset(vec![
            (Geometry::Point(Point::new(-10.0, 10.0)), 3.0),
            // half of it sticks out on the right
            (square(250.0, 0.0, 100.0), 10.0),
        ]);
        let (layer, stats) = data_intersect(&ds, &mask, AllocationMethod::AreaWeighted).unwrap();
        assert!((layer.total() - 5.0).abs() < 1e-9);
        assert!((stats.outside_grid_mwh - 8.0).abs() < 1e-9);
        assert!((stats.input_mwh - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_cells_are_removed() {
        let mask = grid();
        let ds = dataset(vec![
            (square(0.0, 0.0, 100.0), 0.0),
            (Geometry::Point(Point::new(250.0, 250.0)), 2.0),
        ]);
        let (layer, _) = data_intersect(&ds, &mask, AllocationMethod::AreaWeighted).unwrap();
        assert_eq!(layer.len(), 1);
        assert!(layer.value(0).is_none());
    }

    #[test]
    fn test_multipoint_shares_equally() {
        let mask = grid();
        let mp = MultiPoint::from(vec![(10.0, 10.0), (210.0, 10.0)]);
        let ds = dataset(vec![(Geometry::MultiPoint(mp), 6.0)]);
        let (layer, _) = data_intersect(&ds, &mask, AllocationMethod::AreaWeighted).unwrap();
        assert_eq!(layer.value(mask.cell_id(0, 0)), Some(3.0));
        assert_eq!(layer.value(mask.cell_id(2, 0)), Some(3.0));
    }

    #[test]
    fn test_boundary_drops_values() {
        let mut mask = grid();
        mask.restrict_to_boundary(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 100.0, y: 0.0),
            (x: 100.0, y: 100.0),
            (x: 0.0, y: 100.0),
            (x: 0.0, y: 0.0),
        ]]);
        let ds = dataset(vec![
            (Geometry::Point(Point::new(50.0, 50.0)), 4.0),
            (Geometry::Point(Point::new(150.0, 50.0)), 6.0),
        ]);
        let (layer, stats) = data_intersect(&ds, &mask, AllocationMethod::AreaWeighted).unwrap();
        assert_eq!(layer.total(), 4.0);
        assert_eq!(stats.outside_boundary_mwh, 6.0);
    }

    #[test]
    fn test_crs_mismatch_is_rejected() {
        let mask = grid();
        let meta = DatasetMeta::new("wgs84", Sector::Tertiary, "HD").with_epsg(4326);
        let ds = HeatDemandDataset::new(meta);
        let err = data_intersect(&ds, &mask, AllocationMethod::AreaWeighted).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HdError>(),
            Some(HdError::CrsMismatch { .. })
        ));
    }

    #[test]
    fn test_density_per_hectare() {
        let mut layer = HeatDemandLayer::new(None, 250.0 * 250.0);
        layer.add(3, 12.5);
        // 6.25 ha cells
        assert_eq!(layer.density_mwh_per_ha(3), Some(2.0));
        assert_eq!(layer.density_mwh_per_ha(4), None);
    }
}
