use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::collect::dataset::{DatasetMeta, Sector};
use crate::collect::global_variables::{DEFAULT_EPSG, DEFAULT_OUTPUT_PATH, DEFAULT_STEPSIZE};
use crate::commons::units::{EnergyUnit, ValueKind};
use crate::error::HdError;
use crate::geo_core::BoundingBox;
use crate::geometric::combine::OverlapPolicy;
use crate::geometric::heat_demand::AllocationMethod;
use crate::render::legend::{Legend, DEFAULT_CLASS_BOUNDS, DEFAULT_COLORS};
use crate::render::{check_format_available, MapFormat};

/// A harmonization project as read from a TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectSection,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub harmonize: HarmonizeConfig,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
    #[serde(default)]
    pub render: RenderConfig,
    /// Directory relative paths resolve against (the config file's directory)
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    pub name: String,
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default = "default_formats")]
    pub formats: Vec<MapFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_epsg")]
    pub epsg: i32,
    #[serde(default = "default_stepsize")]
    pub stepsize: f64,
    /// `[min_x, min_y, max_x, max_y]` in the grid CRS
    pub bounds: Option<Vec<f64>>,
    #[serde(default)]
    pub align: bool,
    /// Study-area polygons (GeoJSON, grid CRS)
    pub boundary: Option<String>,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            epsg: DEFAULT_EPSG,
            stepsize: DEFAULT_STEPSIZE,
            bounds: None,
            align: false,
            boundary: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarmonizeConfig {
    #[serde(default)]
    pub method: AllocationMethod,
    #[serde(default)]
    pub overlap: OverlapPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    #[default]
    GeoJson,
    Csv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub country: Option<String>,
    pub sector: Sector,
    pub path: String,
    #[serde(default)]
    pub format: DatasetFormat,
    #[serde(default = "default_epsg")]
    pub epsg: i32,
    #[serde(default = "default_unit")]
    pub unit: EnergyUnit,
    pub value_field: String,
    #[serde(default)]
    pub value_kind: ValueKind,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_x_field")]
    pub x_field: String,
    #[serde(default = "default_y_field")]
    pub y_field: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderConfig {
    pub classes: Option<Vec<f64>>,
    pub colors: Option<Vec<String>>,
}

fn default_output_path() -> String {
    DEFAULT_OUTPUT_PATH.to_string()
}

fn default_formats() -> Vec<MapFormat> {
    vec![MapFormat::GeoJson]
}

fn default_epsg() -> i32 {
    DEFAULT_EPSG
}

fn default_stepsize() -> f64 {
    DEFAULT_STEPSIZE
}

fn default_unit() -> EnergyUnit {
    EnergyUnit::KWh
}

fn default_x_field() -> String {
    "x".to_string()
}

fn default_y_field() -> String {
    "y".to_string()
}

impl ProjectConfig {
    /// Load a project file; relative paths inside it resolve against its directory
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;
        let mut config =
            Self::from_toml_str(&content).context(format!("Invalid config file: {:?}", path))?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ProjectConfig = toml::from_str(content)
            .map_err(|e| HdError::config("toml", format!("TOML parsing error: {}", e)))?;
        Ok(config)
    }

    /// Check the settings that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            return Err(HdError::config("datasets", "at least one dataset is required").into());
        }
        if !self.grid.stepsize.is_finite() || self.grid.stepsize <= 0.0 {
            return Err(HdError::config(
                "grid.stepsize",
                format!("must be a positive number, got {}", self.grid.stepsize),
            )
            .into());
        }
        if self.project.formats.is_empty() {
            return Err(HdError::config("project.formats", "at least one format is required").into());
        }
        for format in &self.project.formats {
            check_format_available(*format)?;
        }
        if let Some(bounds) = self.bounds()? {
            bounds.validate()?;
        }
        for dataset in &self.datasets {
            if dataset.value_field.trim().is_empty() {
                return Err(HdError::config(
                    "datasets.value_field",
                    format!("dataset `{}` has an empty value field", dataset.name),
                )
                .into());
            }
            if dataset.format == DatasetFormat::Csv && !cfg!(feature = "csv") {
                return Err(HdError::config(
                    "datasets.format",
                    format!("dataset `{}` is CSV but CSV input is not enabled", dataset.name),
                )
                .into());
            }
        }
        self.legend()?;
        Ok(())
    }

    pub fn bounds(&self) -> Result<Option<BoundingBox>> {
        self.grid
            .bounds
            .as_deref()
            .map(BoundingBox::from_slice)
            .transpose()
    }

    pub fn legend(&self) -> Result<Legend> {
        match (&self.render.classes, &self.render.colors) {
            (None, None) => Ok(Legend::default()),
            (classes, colors) => Legend::new(
                classes
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CLASS_BOUNDS.to_vec()),
                colors.clone().unwrap_or_else(|| {
                    DEFAULT_COLORS.iter().map(|c| c.to_string()).collect()
                }),
            ),
        }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.project.output_path)
    }

    pub fn boundary_path(&self) -> Option<PathBuf> {
        self.grid.boundary.as_deref().map(|p| self.resolve(p))
    }
}

impl DatasetConfig {
    pub fn meta(&self) -> DatasetMeta {
        let mut meta = DatasetMeta::new(&self.name, self.sector, &self.value_field)
            .with_unit(self.unit)
            .with_value_kind(self.value_kind)
            .with_epsg(self.epsg)
            .with_priority(self.priority);
        meta.country = self.country.clone();
        meta
    }
}
