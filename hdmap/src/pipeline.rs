use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[cfg(feature = "indicatif")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::collect::dataset::{HeatDemandDataset, Sector};
use crate::commons::basic_functions::{parse_geojson, polygons_from_geojson};
use crate::config::{DatasetConfig, DatasetFormat, ProjectConfig};
use crate::error::HdError;
use crate::geo_core::BoundingBox;
use crate::geometric::combine::{combine, merge_sector_layers, RankedLayer};
use crate::geometric::heat_demand::{data_intersect, HeatDemandLayer};
use crate::geometric::mask::{create_polygon_mask, PolygonMask};
use crate::render::legend::Legend;
use crate::render::summary::{DatasetSummary, MapStats, RunSummary};
use crate::render::{render_map, OutputMap};

#[cfg(feature = "indicatif")]
fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}/{len:3} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Load one configured dataset, resolving its path against the project directory
pub fn load_dataset(config: &ProjectConfig, dataset: &DatasetConfig) -> Result<HeatDemandDataset> {
    let path = config.resolve(&dataset.path);
    let loaded = match dataset.format {
        DatasetFormat::GeoJson => HeatDemandDataset::from_geojson_file(&path, dataset.meta()),
        #[cfg(feature = "csv")]
        DatasetFormat::Csv => HeatDemandDataset::from_csv_file(
            &path,
            dataset.meta(),
            &dataset.x_field,
            &dataset.y_field,
        ),
        #[cfg(not(feature = "csv"))]
        DatasetFormat::Csv => Err(HdError::dataset(
            &dataset.name,
            "CSV input is not enabled in this build",
        )
        .into()),
    };
    loaded.with_context(|| format!("Failed to load dataset `{}` from {:?}", dataset.name, path))
}

/// Bounds derived from data, grown so that features on the upper edges
/// still fall inside a half-open cell
pub fn covering_bounds(bounds: &BoundingBox, stepsize: f64) -> BoundingBox {
    let cover = |min: f64, max: f64| min + (((max - min) / stepsize).floor() + 1.0) * stepsize;
    BoundingBox::new(
        bounds.min_x,
        bounds.min_y,
        cover(bounds.min_x, bounds.max_x),
        cover(bounds.min_y, bounds.max_y),
    )
}

/// Result of a full run
#[derive(Debug)]
pub struct PipelineOutput {
    pub mask: PolygonMask,
    pub residential: HeatDemandLayer,
    pub tertiary: HeatDemandLayer,
    pub combined: HeatDemandLayer,
    pub summary: RunSummary,
    pub output_dir: PathBuf,
}

impl PipelineOutput {
    pub fn layer(&self, map: OutputMap) -> &HeatDemandLayer {
        match map {
            OutputMap::Residential => &self.residential,
            OutputMap::Tertiary => &self.tertiary,
            OutputMap::Combined => &self.combined,
        }
    }
}

/// Load, harmonize, combine and render the datasets of a project
#[derive(Debug, Clone)]
pub struct HeatDemandPipeline {
    config: ProjectConfig,
    legend: Legend,
    output_dir: PathBuf,
}

impl HeatDemandPipeline {
    pub fn new(config: ProjectConfig) -> Result<Self> {
        config.validate()?;
        let legend = config.legend()?;
        let output_dir = config.output_dir();
        Ok(HeatDemandPipeline {
            config,
            legend,
            output_dir,
        })
    }

    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(ProjectConfig::from_file(path)?)
    }

    /// Override the output directory of the project file
    pub fn with_output_dir<P: AsRef<Path>>(mut self, output_dir: P) -> Self {
        self.output_dir = output_dir.as_ref().to_path_buf();
        self
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Read every dataset and bring it into the grid CRS
    pub fn load_datasets(&self) -> Result<Vec<HeatDemandDataset>> {
        let epsg = self.config.grid.epsg;

        #[cfg(feature = "indicatif")]
        let pb = {
            let pb = ProgressBar::new(self.config.datasets.len() as u64);
            pb.set_style(progress_style());
            pb.set_message("Loading datasets");
            pb
        };

        let mut datasets = Vec::with_capacity(self.config.datasets.len());
        for dataset_config in &self.config.datasets {
            #[cfg(feature = "indicatif")]
            pb.set_message(dataset_config.name.clone());

            let mut dataset = load_dataset(&self.config, dataset_config)?;
            if dataset.is_empty() {
                warn!(dataset = %dataset.name(), "Dataset has no usable features");
            }
            dataset.reproject(epsg)?;
            datasets.push(dataset);

            #[cfg(feature = "indicatif")]
            pb.inc(1);
        }

        #[cfg(feature = "indicatif")]
        pb.finish_with_message("Datasets loaded");

        Ok(datasets)
    }

    /// Grid over the configured bounds, or over the union of the dataset bounds
    pub fn build_mask(&self, datasets: &[HeatDemandDataset]) -> Result<PolygonMask> {
        let grid = &self.config.grid;
        let bounds = match self.config.bounds()? {
            Some(bounds) => bounds,
            None => {
                let data_bounds = datasets
                    .iter()
                    .filter_map(|d| d.bounds())
                    .reduce(|acc, b| acc.union(&b))
                    .ok_or_else(|| {
                        HdError::InvalidGrid(
                            "no grid bounds configured and no dataset has features".to_string(),
                        )
                    })?;
                covering_bounds(&data_bounds, grid.stepsize)
            }
        };
        let bounds = if grid.align {
            bounds.aligned_to(grid.stepsize)
        } else {
            bounds
        };

        let mut mask = create_polygon_mask(&bounds, grid.stepsize, grid.epsg)?;
        if mask.is_empty() {
            return Err(HdError::InvalidGrid(format!(
                "bounds {:?} produce an empty grid",
                bounds
            ))
            .into());
        }

        if let Some(path) = self.config.boundary_path() {
            let content = std::fs::read_to_string(&path)
                .context(format!("Failed to read boundary file: {:?}", path))?;
            let polygons = polygons_from_geojson(parse_geojson(&content)?)
                .context(format!("Failed to read boundary polygons: {:?}", path))?;
            if polygons.is_empty() {
                return Err(HdError::config("grid.boundary", "boundary file has no polygons").into());
            }
            mask.restrict_to_boundary(polygons);
        }
        Ok(mask)
    }

    pub fn run(&self) -> Result<PipelineOutput> {
        info!("Running heat demand project `{}`", self.config.project.name);

        let datasets = self.load_datasets()?;
        let mask = self.build_mask(&datasets)?;
        let mut summary = RunSummary::new(&self.config.project.name, &mask);

        let mut residential_layers = Vec::new();
        let mut tertiary_layers = Vec::new();
        for dataset in &datasets {
            let (layer, stats) = data_intersect(dataset, &mask, self.config.harmonize.method)?;
            summary.datasets.push(DatasetSummary::new(dataset, stats));
            let ranked = RankedLayer {
                layer,
                priority: dataset.meta.priority,
            };
            match dataset.sector() {
                Sector::Residential => residential_layers.push(ranked),
                Sector::Tertiary => tertiary_layers.push(ranked),
            }
        }

        let overlap = self.config.harmonize.overlap;
        let cell_area = mask.cell_area_m2();
        let residential =
            merge_sector_layers(Sector::Residential, cell_area, &residential_layers, overlap);
        let tertiary = merge_sector_layers(Sector::Tertiary, cell_area, &tertiary_layers, overlap);
        let combined = combine(&residential, &tertiary);

        let mut output = PipelineOutput {
            mask,
            residential,
            tertiary,
            combined,
            summary,
            output_dir: self.output_dir.clone(),
        };

        for map in OutputMap::ALL {
            let layer = output.layer(map);
            let stats = MapStats::from_layer(map, layer);
            let mut files = Vec::new();
            for format in &self.config.project.formats {
                files.push(render_map(
                    map,
                    layer,
                    &output.mask,
                    &self.legend,
                    *format,
                    &self.output_dir,
                )?);
            }
            output.summary.maps.push(stats);
            output.summary.files.extend(files);
        }
        output.summary.save(&self.output_dir)?;

        info!(
            "Finished: residential {:.3} MWh, tertiary {:.3} MWh, combined {:.3} MWh",
            output.residential.total(),
            output.tertiary.total(),
            output.combined.total()
        );
        Ok(output)
    }
}
