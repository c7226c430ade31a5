use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use arbo_climate::app::{AnalysisOutcome, AnalysisRequest, AnalysisService};
use arbo_climate::config::Config;
use arbo_climate::domain::{ClimateVariable, Disease};
use arbo_climate::gateway::DatasetKind;
use arbo_climate::logging;
use arbo_climate::observability;
use arbo_climate::pipeline::processing::cases::CaseQualityReport;
use arbo_climate::pipeline::processing::climate::diagnose;

#[derive(Parser)]
#[command(name = "arbo_climate")]
#[command(about = "Arbovirus notifications against regional climate in Brazil")]
#[command(version = "0.1.0")]
struct Cli {
    /// Print the Prometheus metrics exposition after the command
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean one disease's notifications and group them per region and month
    Cases {
        /// dengue, chikungunya or zika
        #[arg(long)]
        disease: Disease,
        #[arg(long)]
        year: i32,
        /// Recompute even if a cached artifact exists
        #[arg(long)]
        no_cache: bool,
    },
    /// Build the treated region × month climate grid
    Climate {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        no_cache: bool,
    },
    /// Correlate cases with a climate variable observed `lag` months earlier
    Correlate {
        #[arg(long)]
        disease: Disease,
        #[arg(long)]
        year: i32,
        /// precipitation_mm, temperature_c or humidity_pct
        #[arg(long)]
        variable: ClimateVariable,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        lag: i64,
        #[arg(long)]
        no_cache: bool,
    },
    /// Remove cached artifacts
    ClearCache {
        /// cases, climate or correlation; everything when omitted
        #[arg(long)]
        kind: Option<DatasetKind>,
    },
}

fn print_cases(service: &AnalysisService, disease: Disease, year: i32, use_cache: bool) -> Result<()> {
    let (records, from_cache) = service.cleaned_cases(disease, year, use_cache)?;
    let monthly = arbo_climate::pipeline::processing::cases::group_monthly(&records, year);

    println!("\n📊 {} {} ({} records{})", disease, year, records.len(), cache_note(from_cache));
    println!("{:<14} {:<8} {:>8}", "region", "month", "cases");
    for row in &monthly {
        println!("{:<14} {:<8} {:>8}", row.region, row.label, row.cases);
    }

    let report = CaseQualityReport::from_records(&records);
    println!("\n🔍 Quality report");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_climate(service: &AnalysisService, year: i32, use_cache: bool) -> Result<()> {
    let (grid, from_cache) = service.climate_grid(year, use_cache)?;

    println!("\n🌦️  Climate grid {} ({} rows{})", year, grid.rows.len(), cache_note(from_cache));
    println!(
        "{:<14} {:<8} {:>10} {:>10} {:>10}",
        "region", "month", "precip_mm", "temp_c", "humid_pct"
    );
    for row in &grid.rows {
        println!(
            "{:<14} {:<8} {:>10.1} {:>10.1} {:>10.1}",
            row.region,
            row.month.short_label(),
            row.values.precipitation_mm,
            row.values.temperature_c,
            row.values.humidity_pct
        );
    }

    let diagnostics = diagnose(&grid);
    println!("\n🔍 Diagnostics");
    println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    Ok(())
}

fn cache_note(from_cache: bool) -> &'static str {
    if from_cache {
        ", cached"
    } else {
        ""
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    let _guard = logging::init_logging(&config.logging.dir);

    if cli.print_metrics {
        if let Err(e) = observability::init() {
            warn!("Metrics unavailable: {}", e);
        }
    }

    let service = AnalysisService::from_config(config);

    match cli.command {
        Commands::Cases {
            disease,
            year,
            no_cache,
        } => print_cases(&service, disease, year, !no_cache)?,
        Commands::Climate { year, no_cache } => print_climate(&service, year, !no_cache)?,
        Commands::Correlate {
            disease,
            year,
            variable,
            lag,
            no_cache,
        } => {
            let request = AnalysisRequest {
                disease,
                year,
                variable,
                lag,
                use_cache: !no_cache,
            };
            let (report, from_cache) = service.analyze(request)?;
            if let AnalysisOutcome::InsufficientData { message } = &report.outcome {
                warn!("{}", message);
            }
            info!("Analysis ready{}", cache_note(from_cache));
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::ClearCache { kind } => {
            let removed = service.clear_cache(kind)?;
            println!("🧹 Removed {} cached artifacts", removed);
        }
    }

    if cli.print_metrics {
        match observability::render() {
            Some(text) => println!("\n{}", text),
            None => warn!("No metrics recorder installed"),
        }
    }
    Ok(())
}
