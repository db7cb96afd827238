use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::info;

use crate::collect::dataset::Sector;
use crate::error::HdError;
use crate::geometric::heat_demand::HeatDemandLayer;

/// How layers of the same sector coming from different datasets are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Values add up
    #[default]
    Sum,
    /// Per cell, the largest value wins
    Max,
    /// Per cell, the value of the highest-priority dataset wins;
    /// on equal priority the first declared dataset wins
    Priority,
}

impl FromStr for OverlapPolicy {
    type Err = HdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(OverlapPolicy::Sum),
            "max" => Ok(OverlapPolicy::Max),
            "priority" => Ok(OverlapPolicy::Priority),
            _ => Err(HdError::UnknownValue {
                kind: "overlap policy",
                value: s.to_string(),
            }),
        }
    }
}

/// A layer together with the priority of the dataset it came from
#[derive(Debug, Clone)]
pub struct RankedLayer {
    pub layer: HeatDemandLayer,
    pub priority: i32,
}

/// Merge the layers of one sector into a single layer
pub fn merge_sector_layers(
    sector: Sector,
    cell_area_m2: f64,
    layers: &[RankedLayer],
    policy: OverlapPolicy,
) -> HeatDemandLayer {
    let mut merged = HeatDemandLayer::new(Some(sector), cell_area_m2);

    match policy {
        OverlapPolicy::Sum => {
            for ranked in layers {
                for (cell, mwh) in ranked.layer.iter() {
                    merged.add(cell, mwh);
                }
            }
        }
        OverlapPolicy::Max => {
            for ranked in layers {
                for (cell, mwh) in ranked.layer.iter() {
                    if merged.value(cell).map_or(true, |current| mwh > current) {
                        merged.set(cell, mwh);
                    }
                }
            }
        }
        OverlapPolicy::Priority => {
            let mut winners: BTreeMap<usize, i32> = BTreeMap::new();
            for ranked in layers {
                for (cell, mwh) in ranked.layer.iter() {
                    let better = winners
                        .get(&cell)
                        .map_or(true, |best| ranked.priority > *best);
                    if better {
                        winners.insert(cell, ranked.priority);
                        merged.set(cell, mwh);
                    }
                }
            }
        }
    }
    merged.remove_zero_cells();

    info!(
        "Merged {} {} layers ({:?}): {} cells, {:.3} MWh",
        layers.len(),
        sector,
        policy,
        merged.len(),
        merged.total()
    );
    merged
}

/// Combined heat demand: residential plus tertiary, cell by cell
pub fn combine(residential: &HeatDemandLayer, tertiary: &HeatDemandLayer) -> HeatDemandLayer {
    let mut combined = HeatDemandLayer::new(None, residential.cell_area_m2());
    for (cell, mwh) in residential.iter().chain(tertiary.iter()) {
        combined.add(cell, mwh);
    }
    combined.remove_zero_cells();
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(values: &[(usize, f64)]) -> HeatDemandLayer {
        let mut layer = HeatDemandLayer::new(Some(Sector::Residential), 10_000.0);
        for (cell, mwh) in values {
            layer.add(*cell, *mwh);
        }
        layer
    }

    fn ranked(values: &[(usize, f64)], priority: i32) -> RankedLayer {
        RankedLayer {
            layer: layer(values),
            priority,
        }
    }

    #[test]
    fn test_sum_policy() {
        let layers = [ranked(&[(1, 2.0), (2, 3.0)], 0), ranked(&[(2, 4.0), (5, 1.0)], 0)];
        let merged = merge_sector_layers(Sector::Residential, 10_000.0, &layers, OverlapPolicy::Sum);
        assert_eq!(merged.value(1), Some(2.0));
        assert_eq!(merged.value(2), Some(7.0));
        assert_eq!(merged.value(5), Some(1.0));
        assert_eq!(merged.total(), 10.0);
    }

    #[test]
    fn test_max_policy() {
        let layers = [ranked(&[(1, 2.0), (2, 9.0)], 0), ranked(&[(1, 4.0), (2, 3.0)], 0)];
        let merged = merge_sector_layers(Sector::Tertiary, 10_000.0, &layers, OverlapPolicy::Max);
        assert_eq!(merged.value(1), Some(4.0));
        assert_eq!(merged.value(2), Some(9.0));
        assert_eq!(merged.sector, Some(Sector::Tertiary));
    }

    #[test]
    fn test_priority_policy() {
        let layers = [
            ranked(&[(1, 2.0), (2, 9.0)], 1),
            ranked(&[(1, 4.0), (3, 3.0)], 5),
            ranked(&[(1, 8.0), (2, 1.0), (3, 6.0)], 5),
        ];
        let merged =
            merge_sector_layers(Sector::Residential, 10_000.0, &layers, OverlapPolicy::Priority);
        // highest priority wins, first declared on ties
        assert_eq!(merged.value(1), Some(4.0));
        assert_eq!(merged.value(2), Some(1.0));
        assert_eq!(merged.value(3), Some(3.0));
    }

    #[test]
    fn test_combined_is_sum_of_sectors() {
        let residential = layer(&[(0, 1.5), (4, 2.0)]);
        let tertiary = layer(&[(4, 3.0), (7, 0.5)]);
        let combined = combine(&residential, &tertiary);
        assert_eq!(combined.len(), 3);
        assert_eq!(combined.value(4), Some(5.0));
        assert_eq!(combined.sector, None);
        assert!((combined.total() - (residential.total() + tertiary.total())).abs() < 1e-12);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Priority".parse::<OverlapPolicy>().unwrap(), OverlapPolicy::Priority);
        assert!("mean".parse::<OverlapPolicy>().is_err());
    }
}
