use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::collect::dataset::{HeatDemandDataset, LoadReport, Sector};
use crate::geometric::heat_demand::{AllocationStats, HeatDemandLayer};
use crate::geometric::mask::PolygonMask;
use crate::render::OutputMap;

pub const SUMMARY_FILE: &str = "summary.json";

/// Statistics of one output map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapStats {
    pub map: OutputMap,
    pub cells: usize,
    pub total_mwh: f64,
    pub max_mwh_per_ha: f64,
    pub mean_mwh_per_ha: f64,
}

impl MapStats {
    pub fn from_layer(map: OutputMap, layer: &HeatDemandLayer) -> Self {
        let densities: Vec<f64> = layer
            .iter()
            .filter_map(|(id, _)| layer.density_mwh_per_ha(id))
            .collect();
        let max_mwh_per_ha = densities.iter().copied().fold(0.0, f64::max);
        let mean_mwh_per_ha = if densities.is_empty() {
            0.0
        } else {
            densities.iter().sum::<f64>() / densities.len() as f64
        };

        MapStats {
            map,
            cells: layer.len(),
            total_mwh: layer.total(),
            max_mwh_per_ha,
            mean_mwh_per_ha,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub name: String,
    pub country: Option<String>,
    pub sector: Sector,
    pub load: LoadReport,
    pub allocation: AllocationStats,
}

impl DatasetSummary {
    pub fn new(dataset: &HeatDemandDataset, allocation: AllocationStats) -> Self {
        DatasetSummary {
            name: dataset.name().to_string(),
            country: dataset.meta.country.clone(),
            sector: dataset.sector(),
            load: dataset.report,
            allocation,
        }
    }
}

/// Everything worth knowing about a finished run, written next to the maps
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub project: String,
    pub generated_at: DateTime<Utc>,
    pub epsg: i32,
    pub stepsize: f64,
    pub n_cols: usize,
    pub n_rows: usize,
    pub datasets: Vec<DatasetSummary>,
    pub maps: Vec<MapStats>,
    pub files: Vec<PathBuf>,
}

impl RunSummary {
    pub fn new(project: &str, mask: &PolygonMask) -> Self {
        RunSummary {
            project: project.to_string(),
            generated_at: Utc::now(),
            epsg: mask.epsg(),
            stepsize: mask.stepsize,
            n_cols: mask.n_cols,
            n_rows: mask.n_rows,
            datasets: Vec::new(),
            maps: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn map(&self, map: OutputMap) -> Option<&MapStats> {
        self.maps.iter().find(|stats| stats.map == map)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize run summary")
    }

    /// Write `summary.json` under `output_dir`
    pub fn save(&self, output_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(output_dir)
            .context(format!("Failed to create output directory: {:?}", output_dir))?;
        let path = output_dir.join(SUMMARY_FILE);
        std::fs::write(&path, self.to_json()?)
            .context(format!("Failed to write summary: {:?}", path))?;
        info!("Summary saved to: {:?}", path);
        Ok(path)
    }
}
