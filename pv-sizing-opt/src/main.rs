use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pv_model::series::Resample;
use pv_sizing_opt::general::series_store::{FileSeriesStore, SeriesSource, TimeSeriesStore};
use pv_sizing_opt::sizing::plot::render_report;
use pv_sizing_opt::{SizingConfig, SizingError, SizingReport, size_installation};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pv-sizing")]
#[command(author, version, about = "Sizes a PV installation by maximising its net present value")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the panel catalog for the configuration with the highest NPV
    #[command(
        long_about = "Search the panel catalog for the configuration with the highest NPV.\n\
        \nInputs are two files with `timestamp,value` rows (CSV) or the same two columns on a\n\
        spreadsheet sheet (xlsx, xls, ods). Sub-hourly readings are folded into hours.\n\
        \nExamples:\n  \
        pv-sizing optimize --consumption load.csv --irradiance sun.csv\n  \
        pv-sizing optimize --consumption load.csv --consumption-scale 0.001 \\\n    \
        --irradiance sun.xlsx --config house.toml --report-json report.json --plots-dir plots"
    )]
    Optimize(OptimizeArgs),

    /// Print the default configuration as TOML
    ShowDefaultConfig,
}

#[derive(Args)]
struct OptimizeArgs {
    /// Consumption history in kWh (after scaling)
    #[arg(long)]
    consumption: PathBuf,

    /// Factor applied to consumption values, e.g. 0.001 for Wh
    #[arg(long, default_value_t = 1.0)]
    consumption_scale: f64,

    /// Plane-of-array irradiance in kW/m² (after scaling)
    #[arg(long)]
    irradiance: PathBuf,

    /// Factor applied to irradiance values, e.g. 0.001 for W/m²
    #[arg(long, default_value_t = 1.0)]
    irradiance_scale: f64,

    /// How sub-hourly irradiance readings are folded
    #[arg(long, value_enum, default_value_t = IrradianceResample::Mean)]
    irradiance_resample: IrradianceResample,

    /// Sheet to read from spreadsheet inputs, the first one when omitted
    #[arg(long)]
    sheet: Option<String>,

    /// TOML configuration, the defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the full report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Write PNG charts into this directory
    #[arg(long)]
    plots_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum IrradianceResample {
    /// Average readings (power values)
    Mean,
    /// Sum readings (energy values)
    Sum,
}

impl From<IrradianceResample> for Resample {
    fn from(value: IrradianceResample) -> Self {
        match value {
            IrradianceResample::Mean => Resample::Mean,
            IrradianceResample::Sum => Resample::Sum,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Optimize(args) => optimize_command(args),
        Commands::ShowDefaultConfig => {
            print!("{}", SizingConfig::default_file_contents()?);
            Ok(())
        }
    }
}

fn optimize_command(args: OptimizeArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => SizingConfig::load(path)?,
        None => {
            info!("No configuration given, using defaults");
            SizingConfig::default()
        }
    };

    let mut consumption = SeriesSource::new(&args.consumption, Resample::Sum)
        .with_unit_scale(args.consumption_scale);
    let mut irradiance = SeriesSource::new(&args.irradiance, args.irradiance_resample.into())
        .with_unit_scale(args.irradiance_scale);
    if let Some(sheet) = &args.sheet {
        consumption = consumption.with_sheet(sheet);
        irradiance = irradiance.with_sheet(sheet);
    }
    let store = FileSeriesStore::new(consumption, irradiance);
    let consumption = store
        .consumption()
        .with_context(|| format!("Failed to load {}", args.consumption.display()))?;
    let irradiance = store
        .irradiance()
        .with_context(|| format!("Failed to load {}", args.irradiance.display()))?;

    let outcome = match size_installation(&consumption, &irradiance, &config) {
        Ok(outcome) => outcome,
        Err(SizingError::Infeasible(report)) => {
            println!("\n=== NO FEASIBLE CONFIGURATION ===");
            println!("Reason: {}", report.reason.label());
            println!("Evaluated: {}", report.evaluated);
            println!("Over the area limit: {}", report.violating_area);
            println!(
                "Below the self-sufficiency minimum: {}",
                report.violating_self_sufficiency
            );
            println!("Failed evaluations: {}", report.failed);
            if report.budget_exhausted {
                println!("The evaluation budget stopped the search early");
            }
            return Err(SizingError::Infeasible(report).into());
        }
        Err(e) => return Err(e).context("Sizing failed"),
    };

    let report = SizingReport::build(&outcome, &consumption)?;

    println!("\n=== SIZING RESULT ===");
    for line in report.summary_lines() {
        println!("{}", line);
    }
    println!("=====================\n");

    if let Some(path) = &args.report_json {
        report.write_json(path)?;
    }
    if let Some(dir) = &args.plots_dir {
        let files = render_report(&report, dir)?;
        info!("Wrote {} charts to {}", files.len(), dir.display());
    }

    Ok(())
}
