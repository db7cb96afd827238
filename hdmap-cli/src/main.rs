mod logger;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use hdmap::collect::dataset::{DatasetMeta, HeatDemandDataset, Sector};
use hdmap::collect::global_variables::{DEFAULT_EPSG, DEFAULT_STEPSIZE};
use hdmap::commons::units::{EnergyUnit, ValueKind};
use hdmap::geo_core::BoundingBox;
use hdmap::geometric::mask::create_polygon_mask;
use hdmap::pipeline::HeatDemandPipeline;
use hdmap::render::OutputMap;

#[derive(Debug, Parser)]
#[command(name = "hdmap")]
#[command(about = "Harmonized residential, tertiary and combined heat-demand maps")]
#[command(version)]
struct Args {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a harmonization project
    Run {
        /// Path to the TOML project file
        #[arg(short, long)]
        config: PathBuf,

        /// Override the output directory of the project file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write a polygon mask as GeoJSON
    Mask {
        /// min_x,min_y,max_x,max_y in the mask CRS (`--bounds=-10,...` for negative values)
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        bounds: Vec<f64>,

        #[arg(long, default_value_t = DEFAULT_STEPSIZE)]
        stepsize: f64,

        #[arg(long, default_value_t = DEFAULT_EPSG)]
        epsg: i32,

        /// CRS the bounds are given in, when it differs from the mask CRS
        #[arg(long)]
        bounds_epsg: Option<i32>,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Load one dataset and print what was read
    Inspect {
        /// GeoJSON file or CSV point table
        dataset: PathBuf,

        #[arg(long)]
        value_field: String,

        #[arg(long, default_value = "kWh")]
        unit: EnergyUnit,

        #[arg(long, default_value = "absolute")]
        value_kind: ValueKind,

        #[arg(long, default_value = "residential")]
        sector: Sector,

        #[arg(long, default_value_t = DEFAULT_EPSG)]
        epsg: i32,

        #[arg(long, value_enum, default_value_t = InputFormat::Geojson)]
        format: InputFormat,

        #[arg(long, default_value = "x")]
        x_field: String,

        #[arg(long, default_value = "y")]
        y_field: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InputFormat {
    Geojson,
    Csv,
}

fn run_project(config: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let mut pipeline = HeatDemandPipeline::from_config_file(&config)?;
    if let Some(output) = output {
        pipeline = pipeline.with_output_dir(output);
    }
    let result = pipeline.run()?;

    for map in OutputMap::ALL {
        let layer = result.layer(map);
        println!(
            "{:<12} {:>8} cells {:>16.3} MWh",
            map.to_string(),
            layer.len(),
            layer.total()
        );
    }
    println!("Output saved to: {}", result.output_dir.display());
    Ok(())
}

fn write_mask(
    bounds: Vec<f64>,
    stepsize: f64,
    epsg: i32,
    bounds_epsg: Option<i32>,
    output: PathBuf,
) -> Result<()> {
    let mut bounds = BoundingBox::from_slice(&bounds)?;
    if let Some(from_epsg) = bounds_epsg {
        bounds = bounds.transform(from_epsg, epsg)?;
    }
    let mask = create_polygon_mask(&bounds, stepsize, epsg)?;
    mask.to_geojson_file(&output)?;
    println!(
        "{} x {} cells written to {}",
        mask.n_cols,
        mask.n_rows,
        output.display()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn inspect_dataset(
    path: PathBuf,
    value_field: String,
    unit: EnergyUnit,
    value_kind: ValueKind,
    sector: Sector,
    epsg: i32,
    format: InputFormat,
    x_field: String,
    y_field: String,
) -> Result<()> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string());
    let meta = DatasetMeta::new(&name, sector, &value_field)
        .with_unit(unit)
        .with_value_kind(value_kind)
        .with_epsg(epsg);

    let dataset = match format {
        InputFormat::Geojson => HeatDemandDataset::from_geojson_file(&path, meta)?,
        InputFormat::Csv => HeatDemandDataset::from_csv_file(&path, meta, &x_field, &y_field)?,
    };

    println!("Dataset:  {}", dataset.name());
    println!("Sector:   {}", dataset.sector());
    println!("CRS:      EPSG:{}", dataset.epsg());
    println!("Read:     {}", dataset.report.read);
    println!("Skipped:  {}", dataset.report.skipped);
    println!("Features: {}", dataset.len());
    println!("Total:    {:.3} MWh", dataset.total_mwh());
    match dataset.bounds() {
        Some(b) => println!(
            "Bounds:   [{}, {}, {}, {}]",
            b.min_x, b.min_y, b.max_x, b.max_y
        ),
        None => println!("Bounds:   none"),
    }
    Ok(())
}

fn execute(command: Command) -> Result<()> {
    match command {
        Command::Run { config, output } => {
            run_project(config.clone(), output).context(format!("Project {:?} failed", config))
        }
        Command::Mask {
            bounds,
            stepsize,
            epsg,
            bounds_epsg,
            output,
        } => write_mask(bounds, stepsize, epsg, bounds_epsg, output),
        Command::Inspect {
            dataset,
            value_field,
            unit,
            value_kind,
            sector,
            epsg,
            format,
            x_field,
            y_field,
        } => inspect_dataset(
            dataset,
            value_field,
            unit,
            value_kind,
            sector,
            epsg,
            format,
            x_field,
            y_field,
        ),
    }
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version print to stdout and succeed
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    logger::init_cli_logger(args.verbose);
    tracing::debug!("{:?}", args.command);

    if let Err(e) = execute(args.command) {
        eprintln!("Error: {}", e);
        for cause in e.chain().skip(1) {
            eprintln!("  caused by: {}", cause);
        }
        std::process::exit(1);
    }
}
